//! Shared fixtures for oss-update integration tests.
//!
//! [`ReleaseFixture`] lays out a throwaway release server on disk (served over
//! `file://`), an application directory and a configuration file, and runs the
//! real binary against them.

// Not every test file uses every helper
#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use oss_update::test_utils::sha256_hex;
use reqwest::Url;
use serde_json::json;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory layout for one integration scenario.
pub struct ReleaseFixture {
    _temp: TempDir,
    /// Directory published as `base_url`
    pub releases: PathBuf,
    /// Application directory for unpack-relaunch deployments
    pub app_dir: PathBuf,
    /// Download directory configured for the run
    pub downloads: PathBuf,
    /// Configuration file passed with `--config`
    pub config_path: PathBuf,
}

impl ReleaseFixture {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let releases = temp.path().join("releases");
        let app_dir = temp.path().join("app");
        let downloads = temp.path().join("downloads");
        fs::create_dir_all(&releases)?;
        fs::create_dir_all(&app_dir)?;

        Ok(Self {
            config_path: temp.path().join("config.toml"),
            _temp: temp,
            releases,
            app_dir,
            downloads,
        })
    }

    /// `file://` URL of the releases directory.
    pub fn base_url(&self) -> String {
        file_url(&self.releases)
    }

    /// Store an artifact in the releases directory and return its manifest entry.
    pub fn publish(
        &self,
        version: &str,
        file_name: &str,
        contents: &[u8],
        pub_time: &str,
    ) -> Result<serde_json::Value> {
        let path = self.releases.join(file_name);
        fs::write(&path, contents)?;
        Ok(json!({
            "version": version,
            "url": file_url(&path),
            "hash": sha256_hex(contents),
            "pubTime": pub_time,
        }))
    }

    pub fn write_manifest(&self, entries: &[serde_json::Value]) -> Result<()> {
        fs::write(self.releases.join("versions.json"), serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }

    /// Write a configuration deploying with unpack-relaunch into [`Self::app_dir`].
    pub fn write_config(&self, current_version: &str, executable: &str, exit_code: i32) -> Result<()> {
        let config = format!(
            r#"base_url = "{base_url}"
artifact_file_name = "update.zip"
current_version = "{current_version}"
download_dir = "{downloads}"

[deploy]
kind = "unpack-relaunch"
target_dir = "{app_dir}"
executable = "{executable}"
exit_code = {exit_code}
"#,
            base_url = self.base_url(),
            downloads = toml_path(&self.downloads),
            app_dir = toml_path(&self.app_dir),
        );
        fs::write(&self.config_path, config)?;
        Ok(())
    }

    /// The binary, pointed at this fixture's configuration with progress bars off.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("oss-update").expect("oss-update binary");
        cmd.arg("--config")
            .arg(&self.config_path)
            .env("OSS_UPDATE_NO_PROGRESS", "1")
            .env_remove("OSS_UPDATE_BASE_URL")
            .env_remove("OSS_UPDATE_CURRENT_VERSION")
            .env_remove("RUST_LOG");
        cmd
    }
}

pub fn file_url(path: &Path) -> String {
    Url::from_file_path(path).expect("absolute path").to_string()
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// A zip archive whose entries carry the given Unix permission bits.
pub fn zip_with_modes(files: &[(&str, &[u8], u32)]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents, mode) in files {
        let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
        writer.start_file(*name, options)?;
        writer.write_all(contents)?;
    }
    Ok(writer.finish()?.into_inner())
}
