//! Byte transport used to fetch manifests and artifacts.
//!
//! The pipeline never talks to HTTP directly. It asks a [`Transport`] to open
//! a URL and receives a [`ByteStream`]: an optional content length plus a
//! stream of chunks. This keeps TLS, proxies and retries out of the
//! orchestrator and lets tests substitute an in-memory transport.
//!
//! [`HttpTransport`] is the production implementation. Besides `http(s)://`
//! it serves `file://` URLs straight from disk, which is handy for staging
//! a release directory locally.
//!
//! # Examples
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use oss_update::config::HttpSettings;
//! use oss_update::transport::{HttpTransport, Transport};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = HttpTransport::new(&HttpSettings::default())?;
//! let mut stream = transport.open("https://releases.example.com/app/versions.json").await?;
//! while let Some(chunk) = stream.body.next().await {
//!     println!("{} bytes", chunk?.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::HttpSettings;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Url};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Chunked response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Failures raised by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The request failed below the HTTP layer (DNS, TLS, refused, timeout).
    #[error("Request to {url} failed")]
    Request {
        /// Requested URL
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// A `file://` URL could not be read.
    #[error("Failed to read {}", .path.display())]
    File {
        /// Local path behind the URL
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The stream broke off mid-transfer.
    #[error("Connection to {url} interrupted")]
    Interrupted {
        /// Requested URL
        url: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    /// Whether retrying the same request later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Request { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_body()
            }
            Self::Interrupted { .. } => true,
            Self::File { .. } | Self::InvalidUrl { .. } | Self::Client(_) => false,
        }
    }
}

/// An opened response: optional total length plus the chunk stream.
pub struct ByteStream {
    /// Total number of bytes, when the source declares it
    pub content_length: Option<u64>,
    /// The body, chunk by chunk
    pub body: BodyStream,
}

impl ByteStream {
    /// Wrap an existing chunk stream.
    #[must_use]
    pub fn new(content_length: Option<u64>, body: BodyStream) -> Self {
        Self {
            content_length,
            body,
        }
    }

    /// A stream that yields `data` as a single chunk with a known length.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self::new(Some(len), stream::once(async move { Ok(data) }).boxed())
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream").field("content_length", &self.content_length).finish()
    }
}

/// Something that can open a URL as a byte stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open `url` for reading.
    ///
    /// A non-success response must be reported as an error here rather than
    /// as an empty or error-page body.
    async fn open(&self, url: &str) -> Result<ByteStream, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn open(&self, url: &str) -> Result<ByteStream, TransportError> {
        (**self).open(url).await
    }
}

/// reqwest-backed transport for `http(s)://` and `file://` URLs.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport from the `[http]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the TLS backend cannot be initialised.
    pub fn new(settings: &HttpSettings) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
        if settings.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.timeout_secs));
        }
        let client = builder.build().map_err(TransportError::Client)?;
        Ok(Self {
            client,
        })
    }

    /// Use a preconfigured reqwest client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self {
            client,
        }
    }

    async fn open_http(&self, url: Url) -> Result<ByteStream, TransportError> {
        let url_string = url.to_string();
        let response = self.client.get(url).send().await.map_err(|source| {
            TransportError::Request {
                url: url_string.clone(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url_string,
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        debug!("GET {} -> {} ({:?} bytes)", url_string, status, content_length);

        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|source| TransportError::Interrupted {
                    url: url_string.clone(),
                    source: io::Error::other(source),
                })
            })
            .boxed();
        Ok(ByteStream::new(content_length, body))
    }

    async fn open_file(url: &Url) -> Result<ByteStream, TransportError> {
        let path = url.to_file_path().map_err(|()| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;

        let file = tokio::fs::File::open(&path).await.map_err(|source| TransportError::File {
            path: path.clone(),
            source,
        })?;
        let content_length = file
            .metadata()
            .await
            .map_err(|source| TransportError::File {
                path: path.clone(),
                source,
            })?
            .len();
        debug!("Reading {} ({} bytes)", path.display(), content_length);

        let body = ReaderStream::new(file)
            .map(move |chunk| {
                chunk.map_err(|source| TransportError::File {
                    path: path.clone(),
                    source,
                })
            })
            .boxed();
        Ok(ByteStream::new(Some(content_length), body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<ByteStream, TransportError> {
        let parsed = Url::parse(url).map_err(|err| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => self.open_http(parsed).await,
            "file" => Self::open_file(&parsed).await,
            other => Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

/// Join a base URL and a file name with exactly one `/` between them.
#[must_use]
pub fn join_url(base: &str, file_name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file_name.trim_start_matches('/'))
}
