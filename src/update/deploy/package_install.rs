//! Package-install deployment.
//!
//! The verified package is described by an [`InstallIntent`] and handed to an
//! [`InstallDispatcher`]. Installation is asynchronous and owned by the OS;
//! the strategy succeeds as soon as the request has been dispatched.

use super::{DeployAction, DeploymentStrategy, VerifiedArtifact};
use crate::config::{DeployTarget, UpdateParameters};
use crate::core::{Result, UpdateError};
use reqwest::Url;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Intent action that opens the package installer.
pub const ACTION_VIEW: &str = "android.intent.action.VIEW";

/// `FLAG_ACTIVITY_NEW_TASK`, required when starting an activity from outside one.
const FLAG_ACTIVITY_NEW_TASK: &str = "0x10000000";

/// A request for the OS package installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallIntent {
    /// Intent action
    pub action: String,
    /// URI of the package
    pub data_uri: String,
    /// MIME type of the package
    pub mime_type: String,
    /// Grant the installer temporary read access to `data_uri`
    pub grant_read_permission: bool,
    /// Start the installer in a new task
    pub new_task: bool,
}

impl InstallIntent {
    /// Describe the install of `package`.
    ///
    /// With scoped file access the package is addressed as
    /// `content://{authority}/{file name}` and read access is granted;
    /// otherwise a `file://` URI of the absolute path is used.
    ///
    /// # Errors
    ///
    /// [`UpdateError::DeploymentDispatch`] if no URI can be formed for the path.
    pub fn for_package(
        package: &Path,
        authority: &str,
        scoped_file_access: bool,
        mime_type: &str,
    ) -> Result<Self> {
        let data_uri = if scoped_file_access {
            let file_name = package.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
                UpdateError::DeploymentDispatch {
                    reason: format!("{} has no usable file name", package.display()),
                    source: None,
                }
            })?;
            format!("content://{authority}/{file_name}")
        } else {
            let absolute = std::path::absolute(package).map_err(|source| {
                UpdateError::DeploymentDispatch {
                    reason: format!("cannot resolve {}", package.display()),
                    source: Some(source),
                }
            })?;
            Url::from_file_path(&absolute)
                .map_err(|()| UpdateError::DeploymentDispatch {
                    reason: format!("cannot build a file URI for {}", absolute.display()),
                    source: None,
                })?
                .to_string()
        };

        Ok(Self {
            action: ACTION_VIEW.to_string(),
            data_uri,
            mime_type: mime_type.to_string(),
            grant_read_permission: scoped_file_access,
            new_task: true,
        })
    }
}

/// Hands an [`InstallIntent`] to the OS.
pub trait InstallDispatcher: Send + Sync {
    /// Issue the request. Returning `Ok` means the request was accepted, not
    /// that installation succeeded.
    ///
    /// # Errors
    ///
    /// Any failure to issue the request, e.g. no installer available.
    fn dispatch(&self, intent: &InstallIntent) -> io::Result<()>;
}

/// Dispatches through the activity manager command (`am start`).
#[derive(Debug, Clone)]
pub struct ActivityManagerDispatcher {
    program: PathBuf,
}

impl ActivityManagerDispatcher {
    /// Use a specific activity manager binary.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments passed to the activity manager for `intent`.
    #[must_use]
    pub fn arguments(intent: &InstallIntent) -> Vec<String> {
        let mut args = vec![
            "start".to_string(),
            "-a".to_string(),
            intent.action.clone(),
            "-d".to_string(),
            intent.data_uri.clone(),
            "-t".to_string(),
            intent.mime_type.clone(),
        ];
        if intent.grant_read_permission {
            args.push("--grant-read-uri-permission".to_string());
        }
        if intent.new_task {
            args.push("-f".to_string());
            args.push(FLAG_ACTIVITY_NEW_TASK.to_string());
        }
        args
    }
}

impl Default for ActivityManagerDispatcher {
    fn default() -> Self {
        Self::with_program("am")
    }
}

impl InstallDispatcher for ActivityManagerDispatcher {
    fn dispatch(&self, intent: &InstallIntent) -> io::Result<()> {
        let output = Command::new(&self.program).args(Self::arguments(intent)).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Deploys by dispatching the latest verified package to the OS installer.
#[derive(Debug)]
pub struct PackageInstallStrategy<D> {
    dispatcher: D,
}

impl<D: InstallDispatcher> PackageInstallStrategy<D> {
    /// Create the strategy around `dispatcher`.
    pub const fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
        }
    }
}

impl<D: InstallDispatcher> DeploymentStrategy for PackageInstallStrategy<D> {
    fn name(&self) -> &'static str {
        "package-install"
    }

    fn deploy(
        &self,
        artifacts: &[VerifiedArtifact],
        params: &UpdateParameters,
    ) -> Result<DeployAction> {
        let DeployTarget::PackageInstall {
            authority,
            scoped_file_access,
            mime_type,
        } = &params.deploy
        else {
            return Err(UpdateError::invalid_parameters(format!(
                "package-install deployment configured with deploy.kind = '{}'",
                params.deploy.kind()
            )));
        };

        let package = artifacts.last().ok_or_else(|| UpdateError::DeploymentDispatch {
            reason: "no verified package to install".to_string(),
            source: None,
        })?;

        let intent =
            InstallIntent::for_package(&package.path, authority, *scoped_file_access, mime_type)?;
        self.dispatcher.dispatch(&intent).map_err(|source| UpdateError::DeploymentDispatch {
            reason: format!("installer request for {} was not accepted", intent.data_uri),
            source: Some(source),
        })?;

        info!("Dispatched install of {} ({})", package.entry.version, intent.data_uri);
        Ok(DeployAction::Dispatched)
    }
}
