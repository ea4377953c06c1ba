//! Deployment of verified artifacts.
//!
//! Deployment is the irreversible last stage of a run. Each platform variant
//! implements [`DeploymentStrategy`]; the orchestrator only sees the trait.
//!
//! - [`PackageInstallStrategy`] hands the package to the OS installer and
//!   returns [`DeployAction::Dispatched`]; installation then proceeds
//!   outside this process.
//! - [`UnpackRelaunchStrategy`] extracts archives over the application
//!   directory, starts the refreshed executable and returns
//!   [`DeployAction::ExitProcess`] so the caller can terminate.
//!
//! [`strategy_for`] picks the implementation configured in
//! [`UpdateParameters::deploy`].

pub mod package_install;
pub mod unpack_relaunch;

pub use package_install::{
    ActivityManagerDispatcher, InstallDispatcher, InstallIntent, PackageInstallStrategy,
};
pub use unpack_relaunch::{CommandLauncher, ExtractError, ProcessLauncher, UnpackRelaunchStrategy};

use crate::config::{DeployTarget, UpdateParameters};
use crate::core::Result;
use crate::manifest::ReleaseManifestEntry;
use std::path::PathBuf;
use std::sync::Arc;

/// An artifact whose digest has been checked (or whose check was disabled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    /// Manifest entry the artifact was downloaded for
    pub entry: ReleaseManifestEntry,
    /// Local file
    pub path: PathBuf,
}

/// What the caller has to do once deployment returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployAction {
    /// The install request was handed to the OS; nothing left to do.
    Dispatched,
    /// The refreshed application is running; exit this process with `code`.
    ExitProcess {
        /// Requested exit code
        code: i32,
    },
}

/// A platform deployment variant.
///
/// `deploy` receives the verified artifacts oldest first; variants that only
/// install a single package use the last one. Implementations block, so the
/// orchestrator calls them from a blocking task.
pub trait DeploymentStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Activate the artifacts.
    ///
    /// # Errors
    ///
    /// One of the deployment variants of [`crate::core::UpdateError`].
    fn deploy(&self, artifacts: &[VerifiedArtifact], params: &UpdateParameters)
    -> Result<DeployAction>;
}

/// The production strategy for the configured deploy target.
#[must_use]
pub fn strategy_for(params: &UpdateParameters) -> Arc<dyn DeploymentStrategy> {
    match params.deploy {
        DeployTarget::PackageInstall { .. } => {
            Arc::new(PackageInstallStrategy::new(ActivityManagerDispatcher::default()))
        }
        DeployTarget::UnpackRelaunch { .. } => Arc::new(UnpackRelaunchStrategy::new(CommandLauncher)),
    }
}
