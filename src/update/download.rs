//! Streaming download of manifests and artifacts to local files.
//!
//! [`ArtifactDownloader`] opens a URL through a [`Transport`], writes each
//! chunk to the destination as it arrives and reports a
//! [`DownloadProgress`] per chunk. The destination is always truncated
//! first; leftovers of an earlier failed attempt are never appended to.

use crate::transport::{Transport, TransportError};
use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Failures of a single download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The transport failed to open or stream the URL.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The destination could not be created or written.
    #[error("Failed to write {}", .path.display())]
    Io {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The destination does not exist after the stream finished.
    #[error("{} is missing after download", .path.display())]
    Missing {
        /// Destination path
        path: PathBuf,
    },

    /// The stream finished without delivering any bytes.
    #[error("{} is empty after download", .path.display())]
    Empty {
        /// Destination path
        path: PathBuf,
    },

    /// Cancellation was requested while the download was in flight.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether trying the same download again could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_transient(),
            Self::Cancelled => true,
            Self::Io { .. } | Self::Missing { .. } | Self::Empty { .. } => false,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Bytes transferred so far for one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written to the destination so far
    pub bytes_read: u64,
    /// Declared total, `None` when the source did not say
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Completed fraction in `0.0..=1.0`, when the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_read as f64 / total as f64).min(1.0))
    }
}

/// Streams URLs to files through a [`Transport`].
#[derive(Debug)]
pub struct ArtifactDownloader<'a, T: ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> ArtifactDownloader<'a, T> {
    /// Create a downloader over `transport`.
    #[must_use]
    pub const fn new(transport: &'a T) -> Self {
        Self {
            transport,
        }
    }

    /// Download `url` into `destination`, overwriting it.
    ///
    /// When `cancel` fires the download stops at the next chunk boundary and
    /// returns [`DownloadError::Cancelled`]; the partial file is left in
    /// place for the caller to discard or overwrite.
    ///
    /// # Arguments
    ///
    /// * `url` - `http(s)://` or `file://` URL to fetch
    /// * `destination` - file to write; parent directories are created
    /// * `cancel` - token checked before opening and between chunks
    /// * `on_progress` - called once per received chunk, from the task doing
    ///   the I/O, so it must return quickly
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use oss_update::config::HttpSettings;
    /// use oss_update::transport::HttpTransport;
    /// use oss_update::update::ArtifactDownloader;
    /// use std::path::Path;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let transport = HttpTransport::new(&HttpSettings::default())?;
    /// let written = ArtifactDownloader::new(&transport)
    ///     .download(
    ///         "https://releases.example.com/app/update.zip",
    ///         Path::new("/tmp/app-update/update.zip"),
    ///         &CancellationToken::new(),
    ///         |progress| {
    ///             if let Some(fraction) = progress.fraction() {
    ///                 println!("{:.0}%", fraction * 100.0);
    ///             }
    ///         },
    ///     )
    ///     .await?;
    /// println!("downloaded {written} bytes");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Transport failures, local write failures, and a missing or empty
    /// destination after the stream ends are all reported as [`DownloadError`].
    /// A connection dropped mid-body surfaces as
    /// [`TransportError::Interrupted`].
    pub async fn download<F>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        debug!("Downloading {} to {}", url, destination.display());

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            opened = self.transport.open(url) => opened?,
        };
        let total_bytes = opened.content_length.filter(|len| *len > 0);
        let mut body = opened.body;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(|e| DownloadError::io(parent, e))?;
        }
        let mut file =
            fs::File::create(destination).await.map_err(|e| DownloadError::io(destination, e))?;

        let mut bytes_read = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Download of {} cancelled after {} bytes", url, bytes_read);
                    return Err(DownloadError::Cancelled);
                }
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| DownloadError::io(destination, e))?;
            bytes_read += chunk.len() as u64;
            on_progress(DownloadProgress {
                bytes_read,
                total_bytes,
            });
        }

        file.flush().await.map_err(|e| DownloadError::io(destination, e))?;
        file.sync_all().await.map_err(|e| DownloadError::io(destination, e))?;
        drop(file);

        match fs::metadata(destination).await {
            Ok(meta) if meta.len() == 0 => Err(DownloadError::Empty {
                path: destination.to_path_buf(),
            }),
            Ok(meta) => {
                debug!("Downloaded {} bytes from {}", meta.len(), url);
                Ok(bytes_read)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(DownloadError::Missing {
                path: destination.to_path_buf(),
            }),
            Err(e) => Err(DownloadError::io(destination, e)),
        }
    }
}
