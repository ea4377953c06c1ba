//! The self-update pipeline.
//!
//! One run resolves the release manifest, downloads the chosen artifacts,
//! verifies their digests and deploys them:
//!
//! | Stage           | Module                          |
//! |-----------------|---------------------------------|
//! | CheckingVersion | [`resolver`]                    |
//! | Downloading     | [`download`]                    |
//! | Verifying       | [`verification`]                |
//! | Deploying       | [`deploy`]                      |
//! | (driver)        | [`orchestrator`] and [`events`] |
//!
//! Most callers only need [`UpdateOrchestrator`], [`strategy_for`] and an
//! [`UpdateObserver`].

pub mod deploy;
pub mod download;
pub mod events;
pub mod orchestrator;
pub mod resolver;
pub mod verification;

pub use deploy::{DeployAction, DeploymentStrategy, VerifiedArtifact, strategy_for};
pub use download::{ArtifactDownloader, DownloadError, DownloadProgress};
pub use events::{NoopObserver, ProgressTarget, TracingObserver, UpdateEvent, UpdateObserver};
pub use orchestrator::{UpdateOrchestrator, UpdateOutcome};
pub use resolver::{Resolution, VersionResolver};
pub use verification::IntegrityVerifier;
