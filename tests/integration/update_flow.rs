use anyhow::Result;
use predicates::prelude::*;
use std::fs;
use std::time::{Duration, Instant};

use crate::common::{ReleaseFixture, zip_with_modes};

const RELAUNCH_SCRIPT: &[u8] = b"#!/bin/sh\necho relaunched > relaunched.txt\n";

fn wait_for(path: &std::path::Path) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

#[cfg(unix)]
#[test]
fn test_update_extracts_and_relaunches() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let archive =
        zip_with_modes(&[("run.sh", RELAUNCH_SCRIPT, 0o755), ("data/app.txt", b"v2", 0o644)])?;
    let entry = fixture.publish("2.0.0", "2.0.0.zip", &archive, "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[entry])?;
    fixture.write_config("1.0.0", "run.sh", 3)?;
    fs::create_dir_all(fixture.app_dir.join("data"))?;
    fs::write(fixture.app_dir.join("data/app.txt"), "v1")?;

    fixture
        .command()
        .arg("update")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Updated to 2.0.0"));

    assert_eq!(fs::read_to_string(fixture.app_dir.join("data/app.txt"))?, "v2");
    assert!(fixture.downloads.join("update.zip").exists());
    assert!(
        wait_for(&fixture.app_dir.join("relaunched.txt")),
        "relaunched executable should run in the application directory"
    );
    Ok(())
}

#[test]
fn test_update_checksum_mismatch_never_deploys() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let archive = zip_with_modes(&[("data/app.txt", b"tampered", 0o644)])?;
    let mut entry = fixture.publish("2.0.0", "2.0.0.zip", &archive, "2024-03-01T00:00:00Z")?;
    entry["hash"] = serde_json::Value::String("00".repeat(32));
    fixture.write_manifest(&[entry])?;
    fixture.write_config("1.0.0", "run.sh", 0)?;

    fixture
        .command()
        .arg("update")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Checksum mismatch"));

    assert!(!fixture.app_dir.join("data").exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_update_no_verify_skips_checksum() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let archive = zip_with_modes(&[("run.sh", RELAUNCH_SCRIPT, 0o755)])?;
    let mut entry = fixture.publish("2.0.0", "2.0.0.zip", &archive, "2024-03-01T00:00:00Z")?;
    entry["hash"] = serde_json::Value::String("not-a-digest".to_string());
    fixture.write_manifest(&[entry])?;
    fixture.write_config("1.0.0", "run.sh", 0)?;

    fixture.command().args(["update", "--no-verify"]).assert().success();
    assert!(fixture.app_dir.join("run.sh").exists());
    Ok(())
}

#[test]
fn test_update_up_to_date_downloads_nothing() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let entry = fixture.publish("1.0.0", "1.0.0.zip", b"irrelevant", "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[entry])?;
    fixture.write_config("1.0.0", "run.sh", 0)?;

    fixture
        .command()
        .arg("update")
        .assert()
        .success()
        .stdout(predicate::str::contains("is up to date"));

    assert!(fixture.downloads.join("versions.json").exists());
    assert!(!fixture.downloads.join("update.zip").exists());
    Ok(())
}

#[test]
fn test_update_missing_artifact_fails() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let entry = fixture.publish("2.0.0", "2.0.0.zip", b"gone", "2024-03-01T00:00:00Z")?;
    fs::remove_file(fixture.releases.join("2.0.0.zip"))?;
    fixture.write_manifest(&[entry])?;
    fixture.write_config("1.0.0", "run.sh", 0)?;

    fixture
        .command()
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to download"));
    Ok(())
}

#[test]
fn test_update_download_dir_flag() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let entry = fixture.publish("1.0.0", "1.0.0.zip", b"irrelevant", "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[entry])?;
    fixture.write_config("1.0.0", "run.sh", 0)?;
    let elsewhere = fixture.app_dir.join("cache");

    fixture.command().arg("update").arg("--download-dir").arg(&elsewhere).assert().success();
    assert!(elsewhere.join("versions.json").exists());
    Ok(())
}

#[test]
fn test_update_without_configuration_is_invalid() -> Result<()> {
    let fixture = ReleaseFixture::new()?;

    fixture
        .command()
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid update parameters"))
        .stderr(predicate::str::contains("base_url is empty"));
    Ok(())
}

#[test]
fn test_update_package_install_without_installer_fails() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let entry = fixture.publish("2.0.0", "app.apk", b"package", "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[entry])?;
    let config = format!(
        r#"base_url = "{}"
artifact_file_name = "update.apk"
current_version = "1.0.0"
download_dir = "{}"

[deploy]
kind = "package-install"
authority = "com.example.app.fileprovider"
"#,
        fixture.base_url(),
        fixture.downloads.display().to_string().replace('\\', "/"),
    );
    fs::write(&fixture.config_path, config)?;

    // No `am` binary outside Android, so the hand-off itself fails
    fixture
        .command()
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to dispatch install request"));
    assert!(fixture.downloads.join("update.apk").exists());
    Ok(())
}
