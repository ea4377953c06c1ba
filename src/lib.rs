//! oss-update - client-side self-update orchestration
//!
//! oss-update keeps an installed application current. It resolves the latest
//! release from a published manifest, streams the artifact to disk, verifies
//! its SHA-256 digest and deploys it in the way the platform expects.
//!
//! # Architecture Overview
//!
//! A run is a small state machine driven by [`update::UpdateOrchestrator`]:
//!
//! ```text
//! Idle -> CheckingVersion -> UpToDate
//!                         -> Downloading -> Verifying -> Deploying -> Completed
//! (any non-terminal stage) -> Failed
//! ```
//!
//! Every transition, every progress update and the final outcome are reported
//! to an [`update::UpdateObserver`]. A run can be cancelled through a
//! [`tokio_util::sync::CancellationToken`] until deployment starts.
//!
//! ## Deployment variants
//!
//! - **package-install** - hand the verified package to the OS installer
//!   (Android `ACTION_VIEW` intent with a file-provider URI)
//! - **unpack-relaunch** - extract zip archives over the application
//!   directory, start the refreshed executable and ask the caller to exit
//!
//! # Core Modules
//!
//! - [`manifest`] - release manifest parsing (`versions.json`)
//! - [`version`] - dotted release version ordering
//! - [`transport`] - byte streams over `http(s)://` and `file://`
//! - [`update`] - the pipeline stages, the orchestrator and its events
//! - [`config`] - [`config::UpdateParameters`] and `config.toml`
//! - [`core`] - run stages and [`core::UpdateError`]
//! - [`cli`] - the `oss-update` command line
//! - [`utils`] - terminal progress rendering
//!
//! # Manifest Format (versions.json)
//!
//! A single object or an array of objects:
//!
//! ```json
//! [
//!   { "version": "1.4.0", "url": "https://releases.example.com/app/1.4.0.zip",
//!     "hash": "9f86d08188...", "pubTime": "2024-05-02T10:00:00Z" },
//!   { "version": "1.3.2", "url": "https://releases.example.com/app/1.3.2.zip",
//!     "hash": "60303ae22b...", "pubTime": "2024-03-18T08:30:00Z" }
//! ]
//! ```
//!
//! The entry with the newest `pubTime` is the latest release. The update is
//! skipped only when its version is exactly the running one, so `1.0` and
//! `1.0.0` count as different releases.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use oss_update::config::{DeployTarget, UpdateParameters};
//! use oss_update::transport::HttpTransport;
//! use oss_update::update::{UpdateOrchestrator, strategy_for};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let params = UpdateParameters::new(
//!     "https://releases.example.com/app",
//!     "update.zip",
//!     "1.3.2",
//!     DeployTarget::unpack_relaunch("/opt/app", "app"),
//! );
//! let transport = HttpTransport::new(&params.http)?;
//! let strategy = strategy_for(&params);
//! let outcome = UpdateOrchestrator::new(params, transport, strategy)
//!     .run(&CancellationToken::new())
//!     .await;
//! if let Some(code) = outcome.exit_code() {
//!     std::process::exit(code);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod manifest;
pub mod transport;
pub mod update;
pub mod utils;
pub mod version;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
