//! Notifications emitted during a run.
//!
//! The orchestrator reports stage transitions, download progress and
//! failures to an [`UpdateObserver`] passed in at construction. Observers are
//! called synchronously from the task doing the work, including the download
//! loop, so they must return quickly and never block.

use crate::core::UpdateStage;
use crate::update::download::DownloadProgress;
use crate::version::ReleaseVersion;
use tracing::{debug, info, warn};

/// What a progress event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressTarget {
    /// The release manifest.
    Manifest,
    /// One release artifact.
    Artifact {
        /// Release the artifact belongs to
        version: ReleaseVersion,
        /// Zero-based position among the artifacts of this run
        index: usize,
        /// Number of artifacts in this run
        count: usize,
    },
}

/// A notification from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// The run moved to another stage.
    StageChanged {
        /// Stage left
        from: UpdateStage,
        /// Stage entered
        to: UpdateStage,
    },

    /// Bytes were received.
    Progress {
        /// What is being downloaded
        target: ProgressTarget,
        /// Bytes so far and total
        progress: DownloadProgress,
    },

    /// A stage failed; the run is about to end in [`UpdateStage::Failed`].
    Failed {
        /// Stage that failed
        stage: UpdateStage,
        /// Failure kind, see [`crate::core::UpdateError::kind`]
        kind: &'static str,
        /// Rendered error including its causes
        message: String,
    },

    /// The run ended.
    Finished {
        /// Terminal stage
        stage: UpdateStage,
    },
}

/// Receives [`UpdateEvent`]s.
pub trait UpdateObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &UpdateEvent);
}

impl<F> UpdateObserver for F
where
    F: Fn(&UpdateEvent) + Send + Sync,
{
    fn on_event(&self, event: &UpdateEvent) {
        self(event);
    }
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl UpdateObserver for NoopObserver {
    fn on_event(&self, _event: &UpdateEvent) {}
}

/// Logs events through `tracing`.
///
/// Progress is logged at `debug`, stage changes at `info`, failures at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl UpdateObserver for TracingObserver {
    fn on_event(&self, event: &UpdateEvent) {
        match event {
            UpdateEvent::StageChanged {
                from,
                to,
            } => info!("Update stage: {} -> {}", from, to),
            UpdateEvent::Progress {
                target,
                progress,
            } => {
                let what = match target {
                    ProgressTarget::Manifest => "manifest".to_string(),
                    ProgressTarget::Artifact {
                        version,
                        index,
                        count,
                    } => format!("artifact {} ({}/{})", version, index + 1, count),
                };
                match progress.total_bytes {
                    Some(total) => debug!("Downloading {}: {}/{} bytes", what, progress.bytes_read, total),
                    None => debug!("Downloading {}: {} bytes", what, progress.bytes_read),
                }
            }
            UpdateEvent::Failed {
                stage,
                kind,
                message,
            } => warn!("Update failed while {} ({}): {}", stage, kind, message),
            UpdateEvent::Finished {
                stage,
            } => info!("Update finished: {}", stage),
        }
    }
}
