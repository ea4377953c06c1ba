//! Pipeline stages of one orchestration run.

use serde::Serialize;
use std::fmt;

/// A stage of the update pipeline.
///
/// The legal transitions form the run's state machine:
///
/// ```text
/// Idle -> CheckingVersion -> UpToDate
///                         -> Downloading -> Verifying -> Deploying -> Completed
/// (any non-terminal stage) -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStage {
    /// Nothing has happened yet.
    Idle,
    /// Fetching and resolving the release manifest.
    CheckingVersion,
    /// Streaming artifacts to local storage.
    Downloading,
    /// Hashing downloaded artifacts.
    Verifying,
    /// Handing verified artifacts to the deployment strategy.
    Deploying,
    /// Terminal: the running version is the latest.
    UpToDate,
    /// Terminal: deployment finished or was dispatched.
    Completed,
    /// Terminal: some stage failed.
    Failed,
}

impl UpdateStage {
    /// Whether the run ends in this stage.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::UpToDate | Self::Completed | Self::Failed)
    }

    /// Whether a run may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use UpdateStage::{
            CheckingVersion, Completed, Deploying, Downloading, Failed, Idle, UpToDate, Verifying,
        };
        match (self, next) {
            (Idle, CheckingVersion)
            | (CheckingVersion, UpToDate | Downloading)
            | (Downloading, Verifying)
            | (Verifying, Deploying)
            | (Deploying, Completed) => true,
            (Idle | CheckingVersion | Downloading | Verifying | Deploying, Failed) => true,
            _ => false,
        }
    }

    /// Whether cooperative cancellation is honoured in this stage.
    ///
    /// Deployment replaces application files and cannot be interrupted.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::CheckingVersion | Self::Downloading | Self::Verifying)
    }
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CheckingVersion => "checking version",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Deploying => "deploying",
            Self::UpToDate => "up to date",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
