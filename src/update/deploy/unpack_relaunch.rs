//! Unpack-and-relaunch deployment.
//!
//! Each verified artifact is a zip archive extracted over the application
//! directory. Every archive is opened and its entry names checked before the
//! first byte is written, so a corrupt or hostile archive fails the stage
//! without touching the installation. Only after all archives are extracted
//! is the refreshed executable started.
//!
//! Existing files are unlinked before being rewritten, which lets a running
//! executable be replaced on Unix without `ETXTBSY`.

use super::{DeployAction, DeploymentStrategy, VerifiedArtifact};
use crate::config::{DeployTarget, UpdateParameters};
use crate::core::{Result, UpdateError};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;
use zip::result::ZipError;

/// Failures while extracting one archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The archive could not be read.
    #[error("Failed to read archive {}", .path.display())]
    Open {
        /// Archive path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The archive is not a valid zip file or an entry is corrupt.
    #[error("Invalid zip archive")]
    Archive(#[from] ZipError),

    /// An entry would be written outside the target directory.
    #[error("Archive entry '{name}' escapes the target directory")]
    UnsafeEntry {
        /// Entry name as stored in the archive
        name: String,
    },

    /// A file or directory could not be written.
    #[error("Failed to write {}", .path.display())]
    Write {
        /// Output path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Starts the refreshed application.
pub trait ProcessLauncher: Send + Sync {
    /// Start `executable` with `working_dir` as its current directory and
    /// return without waiting for it.
    ///
    /// # Errors
    ///
    /// Any spawn failure.
    fn launch(&self, executable: &Path, working_dir: &Path) -> io::Result<()>;
}

/// Launches through [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, executable: &Path, working_dir: &Path) -> io::Result<()> {
        let child = Command::new(executable).current_dir(working_dir).spawn()?;
        debug!("Started {} (pid {})", executable.display(), child.id());
        Ok(())
    }
}

/// Extracts archives over the application directory and relaunches it.
#[derive(Debug)]
pub struct UnpackRelaunchStrategy<L> {
    launcher: L,
}

impl<L: ProcessLauncher> UnpackRelaunchStrategy<L> {
    /// Create the strategy around `launcher`.
    pub const fn new(launcher: L) -> Self {
        Self {
            launcher,
        }
    }
}

impl<L: ProcessLauncher> DeploymentStrategy for UnpackRelaunchStrategy<L> {
    fn name(&self) -> &'static str {
        "unpack-relaunch"
    }

    fn deploy(
        &self,
        artifacts: &[VerifiedArtifact],
        params: &UpdateParameters,
    ) -> Result<DeployAction> {
        let DeployTarget::UnpackRelaunch {
            target_dir,
            executable,
            exit_code,
            ..
        } = &params.deploy
        else {
            return Err(UpdateError::invalid_parameters(format!(
                "unpack-relaunch deployment configured with deploy.kind = '{}'",
                params.deploy.kind()
            )));
        };
        if artifacts.is_empty() {
            return Err(UpdateError::invalid_parameters("no verified archives to extract"));
        }

        let mut archives = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let archive = open_archive(&artifact.path).map_err(|source| {
                UpdateError::DeploymentExtract {
                    archive: artifact.path.clone(),
                    source,
                }
            })?;
            archives.push((artifact, archive));
        }

        for (artifact, mut archive) in archives {
            let written = extract_archive(&mut archive, target_dir).map_err(|source| {
                UpdateError::DeploymentExtract {
                    archive: artifact.path.clone(),
                    source,
                }
            })?;
            info!(
                "Extracted {} ({} files) into {}",
                artifact.entry.version,
                written,
                target_dir.display()
            );
        }

        let program = target_dir.join(executable);
        self.launcher.launch(&program, target_dir).map_err(|source| {
            UpdateError::DeploymentLaunch {
                executable: program.clone(),
                source,
            }
        })?;

        info!("Relaunched {}, requesting exit with code {}", program.display(), exit_code);
        Ok(DeployAction::ExitProcess {
            code: *exit_code,
        })
    }
}

/// Open `path` and check that every entry stays inside the target directory.
fn open_archive(path: &Path) -> std::result::Result<ZipArchive<File>, ExtractError> {
    let file = File::open(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file)?;
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        if entry.enclosed_name().is_none() {
            return Err(ExtractError::UnsafeEntry {
                name: entry.name().to_string(),
            });
        }
    }
    Ok(archive)
}

/// Extract every entry of `archive` under `target_dir`, returning the number of files written.
fn extract_archive(
    archive: &mut ZipArchive<File>,
    target_dir: &Path,
) -> std::result::Result<usize, ExtractError> {
    let write_error = |path: &Path, source| ExtractError::Write {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(target_dir).map_err(|e| write_error(target_dir, e))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry.enclosed_name().ok_or_else(|| ExtractError::UnsafeEntry {
            name: entry.name().to_string(),
        })?;
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| write_error(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
        }
        match fs::remove_file(&out_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(write_error(&out_path, e)),
        }

        let mut out = File::create(&out_path).map_err(|e| write_error(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| write_error(&out_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| write_error(&out_path, e))?;
        }

        written += 1;
    }

    Ok(written)
}
