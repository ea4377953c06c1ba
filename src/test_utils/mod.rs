//! Test utilities for oss-update
//!
//! In-memory stand-ins for every external collaborator of the pipeline, so
//! orchestration can be tested without a network, an OS installer or a
//! process to relaunch:
//!
//! - [`MockTransport`] serves canned bodies, status failures, chunked,
//!   stalling and broken streams, and records every requested URL
//! - [`RecordingObserver`] keeps every [`UpdateEvent`]
//! - [`RecordingDispatcher`] and [`RecordingLauncher`] record deployment
//!   side effects, optionally failing
//! - [`zip_archive_bytes`] builds small archives for extraction tests
//!
//! # Example
//!
//! ```rust,no_run
//! use oss_update::test_utils::MockTransport;
//!
//! let transport = MockTransport::new();
//! transport.add_response("https://x/app/versions.json", br#"{"version":"1.0.0","url":"u"}"#.to_vec());
//! transport.add_status("https://x/app.zip", 503);
//! ```

use crate::core::UpdateStage;
use crate::transport::{ByteStream, Transport, TransportError};
use crate::update::deploy::{InstallDispatcher, InstallIntent, ProcessLauncher};
use crate::update::{DownloadProgress, ProgressTarget, UpdateEvent, UpdateObserver};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging once per process.
///
/// With `Some(level)` that level is used; otherwise `RUST_LOG` is honoured
/// when set and logging stays off when it is not.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Lowercase hex SHA-256 of `data`, as published in manifests.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Build an in-memory zip archive from `(name, contents)` pairs.
///
/// # Panics
///
/// Panics if the archive cannot be written, which only happens for names the
/// zip format cannot represent.
#[must_use]
pub fn zip_archive_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(contents).expect("write zip entry");
    }
    writer.finish().expect("finish zip archive").into_inner()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
enum MockResponse {
    Body {
        chunks: Vec<Vec<u8>>,
    },
    Status(u16),
    Stall {
        first: Vec<u8>,
        content_length: u64,
    },
    Broken {
        chunks: Vec<Vec<u8>>,
        content_length: u64,
        message: String,
    },
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<String, MockResponse>,
    requests: Vec<String>,
}

/// In-memory [`Transport`].
///
/// Unknown URLs answer with HTTP 404. Clones share routes and the request log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// An empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` in one chunk with its length declared.
    pub fn add_response(&self, url: &str, body: Vec<u8>) {
        let chunks = if body.is_empty() {
            Vec::new()
        } else {
            vec![body]
        };
        self.add_chunked(url, chunks);
    }

    /// Serve `chunks` one by one with the total length declared.
    pub fn add_chunked(&self, url: &str, chunks: Vec<Vec<u8>>) {
        lock(&self.state).routes.insert(
            url.to_string(),
            MockResponse::Body {
                chunks,
            },
        );
    }

    /// Fail `url` with an HTTP status.
    pub fn add_status(&self, url: &str, status: u16) {
        lock(&self.state).routes.insert(url.to_string(), MockResponse::Status(status));
    }

    /// Serve `first`, then never produce another chunk.
    pub fn add_stalling(&self, url: &str, first: Vec<u8>, content_length: u64) {
        lock(&self.state).routes.insert(
            url.to_string(),
            MockResponse::Stall {
                first,
                content_length,
            },
        );
    }

    /// Serve `chunks`, then fail the stream with a connection reset.
    ///
    /// The declared length is twice what is actually sent, like a server
    /// dropping the connection halfway through.
    pub fn add_failing(&self, url: &str, chunks: Vec<Vec<u8>>, message: &str) {
        let sent = chunks.iter().map(|c| c.len() as u64).sum::<u64>();
        lock(&self.state).routes.insert(
            url.to_string(),
            MockResponse::Broken {
                chunks,
                content_length: sent.saturating_mul(2).max(1),
                message: message.to_string(),
            },
        );
    }

    /// Every URL opened so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &str) -> Result<ByteStream, TransportError> {
        let response = {
            let mut state = lock(&self.state);
            state.requests.push(url.to_string());
            state.routes.get(url).cloned()
        };

        match response {
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
            Some(MockResponse::Status(status)) => Err(TransportError::Status {
                url: url.to_string(),
                status,
            }),
            Some(MockResponse::Body {
                chunks,
            }) => {
                let total = chunks.iter().map(|c| c.len() as u64).sum::<u64>();
                let body = stream::iter(chunks.into_iter().map(|c| Ok::<_, TransportError>(Bytes::from(c))))
                    .boxed();
                Ok(ByteStream::new(Some(total), body))
            }
            Some(MockResponse::Stall {
                first,
                content_length,
            }) => {
                let body = stream::once(async move { Ok::<_, TransportError>(Bytes::from(first)) })
                    .chain(stream::pending())
                    .boxed();
                Ok(ByteStream::new(Some(content_length), body))
            }
            Some(MockResponse::Broken {
                chunks,
                content_length,
                message,
            }) => {
                let reset = TransportError::Interrupted {
                    url: url.to_string(),
                    source: io::Error::new(io::ErrorKind::ConnectionReset, message),
                };
                let body = stream::iter(chunks.into_iter().map(|c| Ok::<_, TransportError>(Bytes::from(c))))
                    .chain(stream::once(async move { Err(reset) }))
                    .boxed();
                Ok(ByteStream::new(Some(content_length), body))
            }
        }
    }
}

/// Observer that keeps every event.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<UpdateEvent>>>,
}

impl RecordingObserver {
    /// An observer with no events yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    #[must_use]
    pub fn events(&self) -> Vec<UpdateEvent> {
        lock(&self.events).clone()
    }

    /// Stages entered, in order.
    #[must_use]
    pub fn stages(&self) -> Vec<UpdateStage> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                UpdateEvent::StageChanged {
                    to,
                    ..
                } => Some(*to),
                _ => None,
            })
            .collect()
    }

    /// Progress reported for artifacts, in order.
    #[must_use]
    pub fn artifact_progress(&self) -> Vec<DownloadProgress> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                UpdateEvent::Progress {
                    target: ProgressTarget::Artifact { .. },
                    progress,
                } => Some(*progress),
                _ => None,
            })
            .collect()
    }
}

impl UpdateObserver for RecordingObserver {
    fn on_event(&self, event: &UpdateEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Install dispatcher that records intents instead of starting an installer.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    intents: Arc<Mutex<Vec<InstallIntent>>>,
    failure: Option<String>,
}

impl RecordingDispatcher {
    /// A dispatcher that accepts every intent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher that rejects every intent with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            intents: Arc::default(),
            failure: Some(message.to_string()),
        }
    }

    /// Intents accepted so far.
    #[must_use]
    pub fn intents(&self) -> Vec<InstallIntent> {
        lock(&self.intents).clone()
    }
}

impl InstallDispatcher for RecordingDispatcher {
    fn dispatch(&self, intent: &InstallIntent) -> io::Result<()> {
        if let Some(message) = &self.failure {
            return Err(io::Error::new(io::ErrorKind::NotFound, message.clone()));
        }
        lock(&self.intents).push(intent.clone());
        Ok(())
    }
}

/// Process launcher that records launches instead of spawning.
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launches: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    failure: Option<String>,
}

impl RecordingLauncher {
    /// A launcher that accepts every launch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher that fails every launch with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            launches: Arc::default(),
            failure: Some(message.to_string()),
        }
    }

    /// `(executable, working directory)` of every launch so far.
    #[must_use]
    pub fn launches(&self) -> Vec<(PathBuf, PathBuf)> {
        lock(&self.launches).clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, executable: &Path, working_dir: &Path) -> io::Result<()> {
        if let Some(message) = &self.failure {
            return Err(io::Error::other(message.clone()));
        }
        lock(&self.launches).push((executable.to_path_buf(), working_dir.to_path_buf()));
        Ok(())
    }
}
