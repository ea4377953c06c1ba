//! The update state machine.
//!
//! [`UpdateOrchestrator::run`] drives one attempt through
//!
//! ```text
//! Idle -> CheckingVersion -> UpToDate
//!                         -> Downloading -> Verifying -> Deploying -> Completed
//! ```
//!
//! and ends in [`UpdateStage::Failed`] as soon as any stage fails. Nothing is
//! retried; the returned [`UpdateOutcome`] tells the caller what happened
//! and [`UpdateError::is_retryable`] whether trying again makes sense.
//!
//! Runs must not overlap on the same download or application directory.

use crate::config::{ExtractionMode, UpdateParameters};
use crate::core::{Result, UpdateError, UpdateStage};
use crate::manifest::ReleaseManifestEntry;
use crate::transport::Transport;
use crate::update::deploy::{DeployAction, DeploymentStrategy, VerifiedArtifact};
use crate::update::download::{ArtifactDownloader, DownloadError};
use crate::update::events::{NoopObserver, ProgressTarget, UpdateEvent, UpdateObserver};
use crate::update::resolver::{Resolution, VersionResolver};
use crate::update::verification::IntegrityVerifier;
use crate::version::ReleaseVersion;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Terminal result of one run.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The running version is the latest; nothing was downloaded.
    UpToDate {
        /// The running (and latest) version
        version: ReleaseVersion,
    },

    /// The latest release was deployed.
    Completed {
        /// Version deployed
        version: ReleaseVersion,
        /// What the caller has to do next
        action: DeployAction,
    },

    /// The run failed.
    Failed(UpdateError),
}

impl UpdateOutcome {
    /// Terminal stage this outcome corresponds to.
    #[must_use]
    pub const fn stage(&self) -> UpdateStage {
        match self {
            Self::UpToDate { .. } => UpdateStage::UpToDate,
            Self::Completed { .. } => UpdateStage::Completed,
            Self::Failed(_) => UpdateStage::Failed,
        }
    }

    /// The failure, if the run failed.
    #[must_use]
    pub const fn error(&self) -> Option<&UpdateError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// The exit code requested by the deployment, if any.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Completed {
                action: DeployAction::ExitProcess {
                    code,
                },
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

/// Emits a [`UpdateEvent::StageChanged`] for every transition.
struct StageTracker<'a> {
    current: UpdateStage,
    observer: &'a dyn UpdateObserver,
}

impl<'a> StageTracker<'a> {
    const fn new(observer: &'a dyn UpdateObserver) -> Self {
        Self {
            current: UpdateStage::Idle,
            observer,
        }
    }

    fn advance(&mut self, next: UpdateStage) {
        debug_assert!(
            self.current.can_transition_to(next),
            "illegal transition {} -> {}",
            self.current,
            next
        );
        let from = std::mem::replace(&mut self.current, next);
        debug!("Stage {} -> {}", from, next);
        self.observer.on_event(&UpdateEvent::StageChanged {
            from,
            to: next,
        });
    }

    fn ensure_not_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled {
                stage: self.current,
            });
        }
        Ok(())
    }
}

/// Runs update attempts for one set of parameters.
///
/// # Examples
///
/// ```rust,no_run
/// use oss_update::config::UpdateParameters;
/// use oss_update::transport::HttpTransport;
/// use oss_update::update::{TracingObserver, UpdateOrchestrator, UpdateOutcome, strategy_for};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let params = UpdateParameters::load().await?;
/// let transport = HttpTransport::new(&params.http)?;
/// let strategy = strategy_for(&params);
/// let orchestrator =
///     UpdateOrchestrator::new(params, transport, strategy).with_observer(Arc::new(TracingObserver));
///
/// match orchestrator.run(&CancellationToken::new()).await {
///     UpdateOutcome::UpToDate { version } => println!("{version} is current"),
///     UpdateOutcome::Completed { action, .. } => println!("deployed: {action:?}"),
///     UpdateOutcome::Failed(error) => eprintln!("update failed: {error}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct UpdateOrchestrator<T> {
    params: Arc<UpdateParameters>,
    transport: T,
    strategy: Arc<dyn DeploymentStrategy>,
    observer: Arc<dyn UpdateObserver>,
}

impl<T: Transport> UpdateOrchestrator<T> {
    /// Create an orchestrator that reports to no one.
    pub fn new(
        params: UpdateParameters,
        transport: T,
        strategy: Arc<dyn DeploymentStrategy>,
    ) -> Self {
        Self {
            params: Arc::new(params),
            transport,
            strategy,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Report events of every run to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn UpdateObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The parameters runs use.
    #[must_use]
    pub fn params(&self) -> &UpdateParameters {
        &self.params
    }

    /// Resolve the manifest without downloading or deploying anything.
    ///
    /// Manifest download progress is reported to the observer and a failure
    /// is reported as [`UpdateEvent::Failed`]; no stage events are emitted.
    ///
    /// # Errors
    ///
    /// Parameter validation and version-check failures.
    pub async fn check(&self, cancel: &CancellationToken) -> Result<Resolution> {
        let result = match self.params.validate() {
            Ok(()) => self.resolve(cancel).await,
            Err(error) => Err(error),
        };
        if let Err(error) = &result {
            warn!("Update check failed: {}", error);
            self.observer.on_event(&UpdateEvent::Failed {
                stage: error.stage(),
                kind: error.kind(),
                message: render_chain(error),
            });
        }
        result
    }

    async fn resolve(&self, cancel: &CancellationToken) -> Result<Resolution> {
        let observer = self.observer.as_ref();
        VersionResolver::new(&self.transport, &self.params)
            .resolve(cancel, |progress| {
                observer.on_event(&UpdateEvent::Progress {
                    target: ProgressTarget::Manifest,
                    progress,
                });
            })
            .await
    }

    /// Perform one update attempt.
    ///
    /// Never panics on failure and never returns early: every run ends with
    /// a [`UpdateEvent::Finished`] event and exactly one [`UpdateOutcome`].
    /// Cancellation is honoured while checking, downloading and verifying;
    /// once deployment has started it runs to completion.
    pub async fn run(&self, cancel: &CancellationToken) -> UpdateOutcome {
        let observer = self.observer.as_ref();
        let mut tracker = StageTracker::new(observer);

        let outcome = match self.execute(&mut tracker, cancel).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let stage = tracker.current;
                warn!("Update failed while {}: {}", stage, error);
                observer.on_event(&UpdateEvent::Failed {
                    stage,
                    kind: error.kind(),
                    message: render_chain(&error),
                });
                tracker.advance(UpdateStage::Failed);
                UpdateOutcome::Failed(error)
            }
        };

        observer.on_event(&UpdateEvent::Finished {
            stage: outcome.stage(),
        });
        outcome
    }

    async fn execute(
        &self,
        tracker: &mut StageTracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome> {
        self.params.validate()?;

        tracker.advance(UpdateStage::CheckingVersion);
        let resolution = self.resolve(cancel).await?;

        let (latest, pending) = match resolution {
            Resolution::UpToDate {
                latest,
            } => {
                tracker.advance(UpdateStage::UpToDate);
                return Ok(UpdateOutcome::UpToDate {
                    version: latest.version,
                });
            }
            Resolution::UpdateAvailable {
                latest,
                pending,
                ..
            } => (latest, pending),
        };

        let targets = match self.params.deploy.extraction() {
            ExtractionMode::LatestOnly => vec![latest.clone()],
            ExtractionMode::AllPending => pending,
        };
        if self.params.verify_checksum {
            self.require_digests(&targets)?;
        }
        tracker.ensure_not_cancelled(cancel)?;

        tracker.advance(UpdateStage::Downloading);
        let artifacts = self.download_all(targets, cancel).await?;

        tracker.advance(UpdateStage::Verifying);
        self.verify_all(&artifacts, cancel).await?;
        tracker.ensure_not_cancelled(cancel)?;

        tracker.advance(UpdateStage::Deploying);
        let action = self.deploy(artifacts).await?;

        tracker.advance(UpdateStage::Completed);
        info!("Update to {} completed", latest.version);
        Ok(UpdateOutcome::Completed {
            version: latest.version,
            action,
        })
    }

    fn require_digests(&self, targets: &[ReleaseManifestEntry]) -> Result<()> {
        match targets.iter().find(|entry| entry.hash.is_none()) {
            Some(entry) => Err(UpdateError::ManifestParse {
                path: self.params.manifest_path(),
                reason: format!(
                    "release {} has no hash and checksum verification is enabled",
                    entry.version
                ),
            }),
            None => Ok(()),
        }
    }

    async fn download_all(
        &self,
        targets: Vec<ReleaseManifestEntry>,
        cancel: &CancellationToken,
    ) -> Result<Vec<VerifiedArtifact>> {
        let download_dir = self.params.download_dir();
        let downloader = ArtifactDownloader::new(&self.transport);
        let observer = self.observer.as_ref();
        let count = targets.len();
        let mut artifacts = Vec::with_capacity(count);
        let mut used_names = HashSet::from([self.params.manifest_file_name.clone()]);

        for (index, entry) in targets.into_iter().enumerate() {
            let file_name = if count == 1 {
                self.params.artifact_file_name.clone()
            } else {
                chain_file_name(&entry, &self.params.artifact_file_name, &mut used_names)
            };
            let path = download_dir.join(file_name);
            let target = ProgressTarget::Artifact {
                version: entry.version.clone(),
                index,
                count,
            };

            info!("Downloading {} from {}", entry.version, entry.url);
            downloader
                .download(&entry.url, &path, cancel, |progress| {
                    observer.on_event(&UpdateEvent::Progress {
                        target: target.clone(),
                        progress,
                    });
                })
                .await
                .map_err(|source| match source {
                    DownloadError::Cancelled => UpdateError::Cancelled {
                        stage: UpdateStage::Downloading,
                    },
                    source => UpdateError::Download {
                        url: entry.url.clone(),
                        source,
                    },
                })?;

            artifacts.push(VerifiedArtifact {
                entry,
                path,
            });
        }

        Ok(artifacts)
    }

    async fn verify_all(
        &self,
        artifacts: &[VerifiedArtifact],
        cancel: &CancellationToken,
    ) -> Result<()> {
        for artifact in artifacts {
            let name = artifact
                .path
                .file_name()
                .map_or_else(|| artifact.entry.url.clone(), |n| n.to_string_lossy().into_owned());

            match (&artifact.entry.hash, self.params.verify_checksum) {
                (Some(expected), true) => {
                    IntegrityVerifier::verify(&artifact.path, &name, expected, cancel).await?;
                }
                _ => warn!("Checksum verification disabled, not verifying {}", name),
            }
        }
        Ok(())
    }

    async fn deploy(&self, artifacts: Vec<VerifiedArtifact>) -> Result<DeployAction> {
        let strategy = Arc::clone(&self.strategy);
        let params = Arc::clone(&self.params);
        info!("Deploying {} artifact(s) with {}", artifacts.len(), strategy.name());

        tokio::task::spawn_blocking(move || strategy.deploy(&artifacts, &params))
            .await
            .map_err(|join_error| UpdateError::DeploymentDispatch {
                reason: "deployment task did not complete".to_string(),
                source: Some(io::Error::other(join_error)),
            })?
    }
}

/// Download name for one release of a multi-artifact chain.
///
/// Prefers the entry's own name (its `name`, else the URL's last segment)
/// and falls back to `{version}-{artifact_file_name}` when that is missing
/// or already taken in this run.
fn chain_file_name(
    entry: &ReleaseManifestEntry,
    artifact_file_name: &str,
    used: &mut HashSet<String>,
) -> String {
    let name = entry
        .file_name()
        .filter(|name| !used.contains(name))
        .unwrap_or_else(|| format!("{}-{}", entry.version, artifact_file_name));
    used.insert(name.clone());
    name
}

/// The error followed by each of its causes, separated by `: `.
fn render_chain(error: &UpdateError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployTarget;
    use crate::test_utils::{
        MockTransport, RecordingDispatcher, RecordingLauncher, RecordingObserver, sha256_hex,
        zip_archive_bytes,
    };
    use crate::transport::TransportError;
    use crate::update::deploy::{PackageInstallStrategy, UnpackRelaunchStrategy};
    use std::time::Duration;
    use tempfile::TempDir;

    const MANIFEST_URL: &str = "https://x/app/versions.json";
    const ARTIFACT: &[u8] = b"pretend this is an android package";

    fn android_params(temp: &TempDir, current: &str) -> UpdateParameters {
        UpdateParameters::new(
            "https://x/app",
            "app.pkg",
            current,
            DeployTarget::package_install("com.example.app.fileprovider"),
        )
        .with_download_dir(temp.path())
    }

    fn single_release(hash: &str) -> Vec<u8> {
        format!(
            r#"[{{"version":"2.0.0","url":"https://x/app.pkg","hash":"{hash}","pubTime":"2024-06-01T00:00:00Z"}}]"#
        )
        .into_bytes()
    }

    fn orchestrator(
        params: UpdateParameters,
        transport: &MockTransport,
        dispatcher: &RecordingDispatcher,
        observer: &RecordingObserver,
    ) -> UpdateOrchestrator<MockTransport> {
        UpdateOrchestrator::new(
            params,
            transport.clone(),
            Arc::new(PackageInstallStrategy::new(dispatcher.clone())),
        )
        .with_observer(Arc::new(observer.clone()))
    }

    #[tokio::test]
    async fn test_equal_version_is_up_to_date_without_download() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_response(
            MANIFEST_URL,
            br#"[{"version":"1.0.0","url":"https://x/app.pkg","hash":"aa","pubTime":"2024-01-01T00:00:00Z"}]"#.to_vec(),
        );
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let outcome = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        assert!(matches!(outcome, UpdateOutcome::UpToDate { .. }));
        assert_eq!(transport.requests(), [MANIFEST_URL]);
        assert!(dispatcher.intents().is_empty());
        assert_eq!(
            observer.stages(),
            [UpdateStage::CheckingVersion, UpdateStage::UpToDate]
        );
        assert_eq!(
            observer.events().last(),
            Some(&UpdateEvent::Finished {
                stage: UpdateStage::UpToDate
            })
        );
    }

    #[tokio::test]
    async fn test_matching_digest_completes_via_dispatch() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, single_release(&sha256_hex(ARTIFACT)));
        transport.add_response("https://x/app.pkg", ARTIFACT.to_vec());
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let outcome = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        match outcome {
            UpdateOutcome::Completed {
                version,
                action,
            } => {
                assert_eq!(version.to_string(), "2.0.0");
                assert_eq!(action, DeployAction::Dispatched);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(std::fs::read(temp.path().join("app.pkg")).unwrap(), ARTIFACT);
        assert_eq!(dispatcher.intents().len(), 1);
        assert_eq!(
            dispatcher.intents()[0].data_uri,
            "content://com.example.app.fileprovider/app.pkg"
        );
        assert_eq!(
            observer.stages(),
            [
                UpdateStage::CheckingVersion,
                UpdateStage::Downloading,
                UpdateStage::Verifying,
                UpdateStage::Deploying,
                UpdateStage::Completed,
            ]
        );
        assert!(observer.artifact_progress().last().is_some_and(|p| p.bytes_read == ARTIFACT.len() as u64));
    }

    #[tokio::test]
    async fn test_digest_mismatch_never_deploys() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        let mut tampered = ARTIFACT.to_vec();
        tampered[0] ^= 0x01;
        transport.add_response(MANIFEST_URL, single_release(&sha256_hex(ARTIFACT)));
        transport.add_response("https://x/app.pkg", tampered);
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let outcome = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        let error = outcome.error().expect("run should fail");
        assert!(matches!(error, UpdateError::ChecksumMismatch { .. }));
        assert!(dispatcher.intents().is_empty());
        assert_eq!(observer.stages().last(), Some(&UpdateStage::Failed));
        assert!(!observer.stages().contains(&UpdateStage::Deploying));
        assert!(observer.events().iter().any(|e| matches!(
            e,
            UpdateEvent::Failed {
                stage: UpdateStage::Verifying,
                kind: "ChecksumMismatch",
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_manifest_404_fails_without_artifact_request() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_status(MANIFEST_URL, 404);
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let outcome = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::ManifestFetch { .. })));
        assert_eq!(transport.requests(), [MANIFEST_URL]);
        assert_eq!(
            observer.stages(),
            [UpdateStage::CheckingVersion, UpdateStage::Failed]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_download_fails_promptly() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, single_release(&sha256_hex(ARTIFACT)));
        transport.add_stalling("https://x/app.pkg", vec![0u8; 4096], 10_000_000);
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();
        let cancel = CancellationToken::new();

        let run = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer);
        let trigger = cancel.clone();
        let watcher = observer.clone();
        let canceller = tokio::spawn(async move {
            while watcher.artifact_progress().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), run.run(&cancel))
            .await
            .expect("cancelled run should finish promptly");
        canceller.await.unwrap();

        assert!(matches!(
            outcome,
            UpdateOutcome::Failed(UpdateError::Cancelled {
                stage: UpdateStage::Downloading
            })
        ));
        assert!(dispatcher.intents().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_verification_still_enters_verifying() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, single_release("not-the-real-digest"));
        transport.add_response("https://x/app.pkg", ARTIFACT.to_vec());
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let params = android_params(&temp, "1.0.0").with_verify_checksum(false);
        let outcome = orchestrator(params, &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        assert!(matches!(outcome, UpdateOutcome::Completed { .. }));
        assert!(observer.stages().contains(&UpdateStage::Verifying));
    }

    #[tokio::test]
    async fn test_missing_hash_with_verification_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_response(
            MANIFEST_URL,
            br#"{"version":"2.0.0","url":"https://x/app.pkg"}"#.to_vec(),
        );
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let outcome = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::ManifestParse { .. })));
        assert_eq!(transport.requests(), [MANIFEST_URL]);
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_before_any_request() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let params = android_params(&temp, "not a version");
        let outcome = orchestrator(params, &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::InvalidParameters { .. })));
        assert!(transport.requests().is_empty());
        assert_eq!(observer.stages(), [UpdateStage::Failed]);
    }

    #[tokio::test]
    async fn test_all_pending_chain_is_extracted_in_publish_order() {
        let downloads = TempDir::new().unwrap();
        let app = TempDir::new().unwrap();
        let first = zip_archive_bytes(&[("app", b"1.1"), ("notes/1.1.txt", b"first")]);
        let second = zip_archive_bytes(&[("app", b"1.2")]);

        let manifest = format!(
            r#"[
                {{"version":"1.2.0","url":"https://x/1.2.0.zip","hash":"{}","pubTime":"2024-03-01T00:00:00Z"}},
                {{"version":"1.0.0","url":"https://x/1.0.0.zip","hash":"00","pubTime":"2024-01-01T00:00:00Z"}},
                {{"version":"1.1.0","url":"https://x/1.1.0.zip","hash":"{}","pubTime":"2024-02-01T00:00:00Z"}}
            ]"#,
            sha256_hex(&second),
            sha256_hex(&first),
        );
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, manifest.into_bytes());
        transport.add_response("https://x/1.1.0.zip", first);
        transport.add_response("https://x/1.2.0.zip", second);

        let params = UpdateParameters::new(
            "https://x/app",
            "app.zip",
            "1.0.0",
            DeployTarget::UnpackRelaunch {
                target_dir: app.path().to_path_buf(),
                executable: "app".into(),
                extraction: ExtractionMode::AllPending,
                exit_code: 0,
            },
        )
        .with_download_dir(downloads.path());

        let launcher = RecordingLauncher::new();
        let outcome = UpdateOrchestrator::new(
            params,
            transport.clone(),
            Arc::new(UnpackRelaunchStrategy::new(launcher.clone())),
        )
        .run(&CancellationToken::new())
        .await;

        assert_eq!(outcome.exit_code(), Some(0));
        assert_eq!(
            transport.requests(),
            [MANIFEST_URL, "https://x/1.1.0.zip", "https://x/1.2.0.zip"]
        );
        assert!(downloads.path().join("1.1.0.zip").exists());
        assert!(downloads.path().join("1.2.0.zip").exists());
        assert_eq!(std::fs::read(app.path().join("app")).unwrap(), b"1.2");
        assert!(app.path().join("notes/1.1.txt").exists());
        assert_eq!(launcher.launches().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_only_downloads_single_artifact() {
        let downloads = TempDir::new().unwrap();
        let app = TempDir::new().unwrap();
        let latest = zip_archive_bytes(&[("app", b"1.2")]);
        let manifest = format!(
            r#"[
                {{"version":"1.1.0","url":"https://x/1.1.0.zip","hash":"11","pubTime":"2024-02-01T00:00:00Z"}},
                {{"version":"1.2.0","url":"https://x/1.2.0.zip","hash":"{}","pubTime":"2024-03-01T00:00:00Z"}}
            ]"#,
            sha256_hex(&latest),
        );
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, manifest.into_bytes());
        transport.add_response("https://x/1.2.0.zip", latest);

        let params = UpdateParameters::new(
            "https://x/app",
            "app.zip",
            "1.0.0",
            DeployTarget::unpack_relaunch(app.path(), "app"),
        )
        .with_download_dir(downloads.path());

        let outcome = UpdateOrchestrator::new(
            params,
            transport.clone(),
            Arc::new(UnpackRelaunchStrategy::new(RecordingLauncher::new())),
        )
        .run(&CancellationToken::new())
        .await;

        assert!(matches!(outcome, UpdateOutcome::Completed { .. }));
        assert_eq!(transport.requests(), [MANIFEST_URL, "https://x/1.2.0.zip"]);
        assert!(downloads.path().join("app.zip").exists());
    }

    fn all_pending_params(downloads: &TempDir, app: &TempDir) -> UpdateParameters {
        UpdateParameters::new(
            "https://x/app",
            "app.zip",
            "1.0.0",
            DeployTarget::UnpackRelaunch {
                target_dir: app.path().to_path_buf(),
                executable: "app".into(),
                extraction: ExtractionMode::AllPending,
                exit_code: 0,
            },
        )
        .with_download_dir(downloads.path())
    }

    #[tokio::test]
    async fn test_all_pending_never_fetches_releases_newer_than_latest() {
        let downloads = TempDir::new().unwrap();
        let app = TempDir::new().unwrap();
        let middle = zip_archive_bytes(&[("app", b"1.5")]);
        let latest = zip_archive_bytes(&[("app", b"2.0")]);
        let manifest = format!(
            r#"[
                {{"version":"3.0.0","url":"https://x/3.0.0.zip","hash":"{}","pubTime":"2024-01-01T00:00:00Z"}},
                {{"version":"1.5.0","url":"https://x/1.5.0.zip","hash":"{}","pubTime":"2024-02-01T00:00:00Z"}},
                {{"version":"2.0.0","url":"https://x/2.0.0.zip","hash":"{}","pubTime":"2024-09-01T00:00:00Z"}}
            ]"#,
            sha256_hex(b"unused"),
            sha256_hex(&middle),
            sha256_hex(&latest),
        );
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, manifest.into_bytes());
        transport.add_response("https://x/3.0.0.zip", zip_archive_bytes(&[("only-in-3.txt", b"3")]));
        transport.add_response("https://x/1.5.0.zip", middle);
        transport.add_response("https://x/2.0.0.zip", latest);

        let outcome = UpdateOrchestrator::new(
            all_pending_params(&downloads, &app),
            transport.clone(),
            Arc::new(UnpackRelaunchStrategy::new(RecordingLauncher::new())),
        )
        .run(&CancellationToken::new())
        .await;

        match outcome {
            UpdateOutcome::Completed {
                version,
                ..
            } => assert_eq!(version.to_string(), "2.0.0"),
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(
            transport.requests(),
            [MANIFEST_URL, "https://x/1.5.0.zip", "https://x/2.0.0.zip"]
        );
        assert!(!app.path().join("only-in-3.txt").exists());
        assert_eq!(std::fs::read(app.path().join("app")).unwrap(), b"2.0");
    }

    #[tokio::test]
    async fn test_chain_downloads_use_manifest_names() {
        let downloads = TempDir::new().unwrap();
        let app = TempDir::new().unwrap();
        let first = zip_archive_bytes(&[("app", b"1.1")]);
        let second = zip_archive_bytes(&[("app", b"1.2")]);
        let third = zip_archive_bytes(&[("app", b"1.3")]);
        // 1.2.0 reuses 1.1.0's name, 1.3.0 names the manifest file itself
        let manifest = format!(
            r#"[
                {{"version":"1.1.0","url":"https://x/dl?id=1","name":"patch.zip","hash":"{}","pubTime":"2024-02-01T00:00:00Z"}},
                {{"version":"1.2.0","url":"https://x/dl?id=2","name":"patch.zip","hash":"{}","pubTime":"2024-03-01T00:00:00Z"}},
                {{"version":"1.3.0","url":"https://x/dl/versions.json","hash":"{}","pubTime":"2024-04-01T00:00:00Z"}}
            ]"#,
            sha256_hex(&first),
            sha256_hex(&second),
            sha256_hex(&third),
        );
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, manifest.into_bytes());
        transport.add_response("https://x/dl?id=1", first.clone());
        transport.add_response("https://x/dl?id=2", second);
        transport.add_response("https://x/dl/versions.json", third);

        let outcome = UpdateOrchestrator::new(
            all_pending_params(&downloads, &app),
            transport,
            Arc::new(UnpackRelaunchStrategy::new(RecordingLauncher::new())),
        )
        .run(&CancellationToken::new())
        .await;

        assert_eq!(outcome.exit_code(), Some(0));
        assert_eq!(std::fs::read(downloads.path().join("patch.zip")).unwrap(), first);
        assert!(downloads.path().join("1.2.0-app.zip").exists());
        assert!(downloads.path().join("1.3.0-app.zip").exists());
        assert_eq!(std::fs::read(app.path().join("app")).unwrap(), b"1.3");
    }

    #[tokio::test]
    async fn test_connection_reset_during_download_never_deploys() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, single_release(&sha256_hex(ARTIFACT)));
        transport.add_failing("https://x/app.pkg", vec![ARTIFACT[..8].to_vec()], "connection reset");
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let outcome = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .run(&CancellationToken::new())
            .await;

        match outcome.error() {
            Some(UpdateError::Download {
                url,
                source: DownloadError::Transport(TransportError::Interrupted { .. }),
            }) => assert_eq!(url, "https://x/app.pkg"),
            other => panic!("expected an interrupted download, got {other:?}"),
        }
        assert!(outcome.error().is_some_and(UpdateError::is_retryable));
        assert!(dispatcher.intents().is_empty());
        assert!(observer.artifact_progress().iter().any(|p| p.bytes_read == 8));
        assert_eq!(
            observer.stages(),
            [UpdateStage::CheckingVersion, UpdateStage::Downloading, UpdateStage::Failed]
        );
        assert!(observer.events().iter().any(|e| matches!(
            e,
            UpdateEvent::Failed {
                stage: UpdateStage::Downloading,
                kind: "DownloadError",
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_check_failure_is_reported_to_observer() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_status(MANIFEST_URL, 503);
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let err = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .check(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::ManifestFetch { .. }));
        let failures: Vec<UpdateEvent> = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, UpdateEvent::Failed { .. }))
            .collect();
        match failures.as_slice() {
            [UpdateEvent::Failed {
                stage,
                kind,
                message,
            }] => {
                assert_eq!(*stage, UpdateStage::CheckingVersion);
                assert_eq!(*kind, "ManifestFetchError");
                assert!(message.contains("503"));
            }
            other => panic!("expected one failure event, got {other:?}"),
        }
        assert!(observer.stages().is_empty());
    }

    #[tokio::test]
    async fn test_check_does_not_download_artifacts() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::new();
        transport.add_response(MANIFEST_URL, single_release("aa"));
        let dispatcher = RecordingDispatcher::new();
        let observer = RecordingObserver::new();

        let resolution = orchestrator(android_params(&temp, "1.0.0"), &transport, &dispatcher, &observer)
            .check(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolution.latest().version.to_string(), "2.0.0");
        assert_eq!(transport.requests(), [MANIFEST_URL]);
        assert!(observer.stages().is_empty());
    }
}
