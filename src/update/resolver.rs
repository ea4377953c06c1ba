//! Version resolution against the release manifest.
//!
//! The resolver downloads `{base_url}/{manifest_file_name}` into the download
//! directory, parses it and decides whether an update is needed:
//!
//! 1. Entries are ordered by publish time, then version. The last entry is
//!    the authoritative latest release, whatever the declaration order.
//! 2. If its version is exactly the running version (same components, same
//!    pre-release) the result is [`Resolution::UpToDate`]. `1.0` and `1.0.0`
//!    are different releases here.
//! 3. Otherwise the update goes to that entry, even when it is older than
//!    the running version; the manifest is authoritative.
//!
//! Alongside the latest entry the resolver reports the pending chain: every
//! release newer than the running one and older than the latest, in
//! publication order, always ending with the latest. Releases newer than the
//! latest are never part of it. Deployments applying incremental packages walk this chain.

use crate::config::UpdateParameters;
use crate::core::{Result, UpdateError, UpdateStage};
use crate::manifest::{ManifestDocument, ReleaseManifestEntry};
use crate::transport::Transport;
use crate::update::download::{ArtifactDownloader, DownloadError, DownloadProgress};
use crate::version::ReleaseVersion;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of comparing the manifest with the running version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The latest release is the running one.
    UpToDate {
        /// The latest manifest entry
        latest: ReleaseManifestEntry,
    },

    /// Another release should be installed.
    UpdateAvailable {
        /// The running version
        current: ReleaseVersion,
        /// The authoritative latest entry
        latest: ReleaseManifestEntry,
        /// Releases to apply in order, ending with `latest`
        pending: Vec<ReleaseManifestEntry>,
    },
}

impl Resolution {
    /// The latest manifest entry.
    #[must_use]
    pub const fn latest(&self) -> &ReleaseManifestEntry {
        match self {
            Self::UpToDate {
                latest,
            }
            | Self::UpdateAvailable {
                latest,
                ..
            } => latest,
        }
    }

    /// Whether the running version is the latest.
    #[must_use]
    pub const fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate { .. })
    }
}

/// Fetches the manifest and resolves the latest release.
pub struct VersionResolver<'a, T: ?Sized> {
    transport: &'a T,
    params: &'a UpdateParameters,
}

impl<'a, T: Transport + ?Sized> VersionResolver<'a, T> {
    /// Create a resolver for one run.
    #[must_use]
    pub const fn new(transport: &'a T, params: &'a UpdateParameters) -> Self {
        Self {
            transport,
            params,
        }
    }

    /// Download, parse and resolve the manifest.
    ///
    /// The manifest is stored as `{download_dir}/{manifest_file_name}` and
    /// `on_progress` receives its download progress.
    ///
    /// # Returns
    ///
    /// [`Resolution::UpToDate`] when the latest release is exactly the
    /// running version, otherwise [`Resolution::UpdateAvailable`] with the
    /// pending chain.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use oss_update::config::{DeployTarget, UpdateParameters};
    /// use oss_update::transport::HttpTransport;
    /// use oss_update::update::{Resolution, VersionResolver};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let params = UpdateParameters::new(
    ///     "https://releases.example.com/app",
    ///     "update.zip",
    ///     "1.3.2",
    ///     DeployTarget::unpack_relaunch("/opt/app", "app"),
    /// );
    /// let transport = HttpTransport::new(&params.http)?;
    /// let resolution = VersionResolver::new(&transport, &params)
    ///     .resolve(&CancellationToken::new(), |_| {})
    ///     .await?;
    /// if let Resolution::UpdateAvailable { latest, pending, .. } = resolution {
    ///     println!("{} available, {} release(s) to apply", latest.version, pending.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// - [`UpdateError::InvalidParameters`] if `current_version` does not parse
    /// - [`UpdateError::ManifestFetch`] if the manifest cannot be downloaded or
    ///   read back from disk
    /// - [`UpdateError::ManifestParse`] if it is not a usable release list
    /// - [`UpdateError::Cancelled`] if `cancel` fires during the download
    pub async fn resolve<F>(&self, cancel: &CancellationToken, on_progress: F) -> Result<Resolution>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let current = self.params.current_release()?;
        let url = self.params.manifest_url();
        let path = self.params.manifest_path();

        ArtifactDownloader::new(self.transport)
            .download(&url, &path, cancel, on_progress)
            .await
            .map_err(|source| match source {
                DownloadError::Cancelled => UpdateError::Cancelled {
                    stage: UpdateStage::CheckingVersion,
                },
                source => UpdateError::ManifestFetch {
                    url: url.clone(),
                    source,
                },
            })?;

        let bytes = tokio::fs::read(&path).await.map_err(|source| UpdateError::ManifestFetch {
            url: url.clone(),
            source: DownloadError::Io {
                path: path.clone(),
                source,
            },
        })?;

        let document =
            ManifestDocument::from_slice(&bytes).map_err(|err| UpdateError::ManifestParse {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        debug!("Manifest {} lists {} release(s)", url, document.entries().len());

        let resolution = resolve_entries(document.into_sorted_entries(), &current).ok_or_else(|| {
            UpdateError::ManifestParse {
                path: path.clone(),
                reason: "manifest lists no releases".to_string(),
            }
        })?;

        match &resolution {
            Resolution::UpToDate {
                latest,
            } => info!("Version {} is up to date", latest.version),
            Resolution::UpdateAvailable {
                current,
                latest,
                pending,
            } => info!(
                "Update available: {} -> {} ({} pending release(s))",
                current,
                latest.version,
                pending.len()
            ),
        }
        Ok(resolution)
    }
}

/// Resolve sorted manifest entries against the running version.
///
/// `sorted` must be ordered oldest to newest; its last entry is taken as the
/// latest release. Returns `None` for an empty list.
#[must_use]
pub fn resolve_entries(
    sorted: Vec<ReleaseManifestEntry>,
    current: &ReleaseVersion,
) -> Option<Resolution> {
    let latest = sorted.last()?.clone();
    if latest.version.is_same_release(current) {
        return Some(Resolution::UpToDate {
            latest,
        });
    }

    let mut pending: Vec<ReleaseManifestEntry> = Vec::new();
    for entry in sorted {
        if entry.version <= *current || entry.version >= latest.version {
            continue;
        }
        pending.retain(|existing| existing.version != entry.version);
        pending.push(entry);
    }
    pending.push(latest.clone());

    Some(Resolution::UpdateAvailable {
        current: current.clone(),
        latest,
        pending,
    })
}
