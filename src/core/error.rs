//! Error handling for oss-update
//!
//! This module provides the error taxonomy of an orchestration run and the
//! user-friendly error reporting used by the CLI. The error system is
//! designed around two core principles:
//! 1. **Strongly-typed errors** so callers can tell which stage failed and why
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`UpdateError`] - one variant per failure kind of the update pipeline
//! - [`ErrorContext`] - rendered message plus optional details and suggestion
//!
//! # Error Categories
//!
//! - **Version check**: [`UpdateError::ManifestFetch`], [`UpdateError::ManifestParse`]
//! - **Download**: [`UpdateError::Download`]
//! - **Verification**: [`UpdateError::ChecksumMismatch`], [`UpdateError::IntegrityComputation`]
//! - **Deployment**: [`UpdateError::DeploymentDispatch`], [`UpdateError::DeploymentExtract`],
//!   [`UpdateError::DeploymentLaunch`]
//! - **Run control**: [`UpdateError::Cancelled`], [`UpdateError::InvalidParameters`]
//!
//! None of these are retried inside the pipeline. [`UpdateError::is_retryable`]
//! tells a caller whether starting a fresh run is likely to help.
//!
//! # Examples
//!
//! ```rust,no_run
//! use oss_update::core::{UpdateError, user_friendly_error};
//!
//! let error = UpdateError::InvalidParameters {
//!     reason: "base_url is empty".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use crate::core::stage::UpdateStage;
use crate::update::deploy::unpack_relaunch::ExtractError;
use crate::update::download::DownloadError;
use colored::Colorize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for pipeline operations.
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

/// Every way an orchestration run can fail.
///
/// Each variant names the resource involved (URL or path) and keeps the
/// underlying cause reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The manifest could not be retrieved, or was missing locally after retrieval.
    #[error("Failed to fetch release manifest from {url}")]
    ManifestFetch {
        /// Manifest URL
        url: String,
        /// Transport or local I/O cause
        #[source]
        source: DownloadError,
    },

    /// The manifest was retrieved but is not a usable release list.
    #[error("Invalid release manifest {}: {reason}", .path.display())]
    ManifestParse {
        /// Local copy of the manifest
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// An artifact could not be streamed to disk.
    #[error("Failed to download {url}")]
    Download {
        /// Artifact URL
        url: String,
        /// Transport or local I/O cause
        #[source]
        source: DownloadError,
    },

    /// The artifact digest differs from the one in the manifest.
    #[error("Checksum mismatch for '{artifact}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact file name
        artifact: String,
        /// Digest declared by the manifest
        expected: String,
        /// Digest computed from the downloaded file
        actual: String,
    },

    /// The artifact could not be read while hashing it.
    #[error("Failed to compute digest of {}", .path.display())]
    IntegrityComputation {
        /// Artifact path
        path: PathBuf,
        /// Underlying read error
        #[source]
        source: io::Error,
    },

    /// The install request could not be handed to the OS installer.
    #[error("Failed to dispatch install request: {reason}")]
    DeploymentDispatch {
        /// What went wrong
        reason: String,
        /// Underlying error, when one exists
        #[source]
        source: Option<io::Error>,
    },

    /// An archive could not be extracted over the application directory.
    #[error("Failed to extract {}", .archive.display())]
    DeploymentExtract {
        /// Archive being extracted
        archive: PathBuf,
        /// Underlying extraction error
        #[source]
        source: ExtractError,
    },

    /// The refreshed application could not be started.
    #[error("Failed to launch {}", .executable.display())]
    DeploymentLaunch {
        /// Executable that was started
        executable: PathBuf,
        /// Underlying spawn error
        #[source]
        source: io::Error,
    },

    /// Cancellation was requested while a cancellable stage was running.
    #[error("Update cancelled while {stage}")]
    Cancelled {
        /// Stage that observed the cancellation
        stage: UpdateStage,
    },

    /// The run was configured with unusable parameters.
    #[error("Invalid update parameters: {reason}")]
    InvalidParameters {
        /// Validation failure
        reason: String,
    },
}

impl UpdateError {
    /// The pipeline stage this failure belongs to.
    #[must_use]
    pub const fn stage(&self) -> UpdateStage {
        match self {
            Self::ManifestFetch { .. } | Self::ManifestParse { .. } => UpdateStage::CheckingVersion,
            Self::Download { .. } => UpdateStage::Downloading,
            Self::ChecksumMismatch { .. } | Self::IntegrityComputation { .. } => {
                UpdateStage::Verifying
            }
            Self::DeploymentDispatch { .. }
            | Self::DeploymentExtract { .. }
            | Self::DeploymentLaunch { .. } => UpdateStage::Deploying,
            Self::Cancelled { stage } => *stage,
            Self::InvalidParameters { .. } => UpdateStage::Idle,
        }
    }

    /// Stable name of the failure kind, suitable for event sinks and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ManifestFetch { .. } => "ManifestFetchError",
            Self::ManifestParse { .. } => "ManifestParseError",
            Self::Download { .. } => "DownloadError",
            Self::ChecksumMismatch { .. } => "ChecksumMismatch",
            Self::IntegrityComputation { .. } => "IntegrityComputationError",
            Self::DeploymentDispatch { .. } => "DeploymentDispatchError",
            Self::DeploymentExtract { .. } => "DeploymentExtractError",
            Self::DeploymentLaunch { .. } => "DeploymentLaunchError",
            Self::Cancelled { .. } => "Cancelled",
            Self::InvalidParameters { .. } => "InvalidParameters",
        }
    }

    /// Whether a fresh run could plausibly succeed without changing anything.
    ///
    /// Transport failures and cancellation are transient. A checksum mismatch
    /// is not retryable by default; callers that suspect a corrupted transfer
    /// may still choose to download again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ManifestFetch { source, .. } | Self::Download { source, .. } => {
                source.is_transient()
            }
            Self::Cancelled { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn invalid_parameters(reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            reason: reason.into(),
        }
    }
}

/// Error message enriched with details and a suggestion for the CLI.
///
/// # Examples
///
/// ```rust,no_run
/// use oss_update::core::ErrorContext;
///
/// let context = ErrorContext::new("Failed to fetch release manifest")
///     .with_suggestion("Check base_url in your configuration")
///     .with_details("The server answered with HTTP 404");
///
/// context.display();
/// ```
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The rendered error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// [`UpdateError`]s anywhere in the chain get tailored suggestions, I/O
/// permission problems get a permissions hint, everything else is rendered
/// with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let message = render_chain(&error);

    if let Some(update_error) = error.chain().find_map(|e| e.downcast_ref::<UpdateError>()) {
        return create_error_context(update_error, message);
    }

    if let Some(io_error) = error.downcast_ref::<io::Error>() {
        match io_error.kind() {
            io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(message)
                    .with_suggestion("Check ownership and permissions of the download and target directories")
                    .with_details("oss-update needs write access to the download directory and, for in-place updates, to the application directory");
            }
            io::ErrorKind::NotFound => {
                return ErrorContext::new(message)
                    .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if error.downcast_ref::<toml::de::Error>().is_some() {
        return ErrorContext::new(message)
            .with_suggestion("Check the TOML syntax of your oss-update configuration file")
            .with_details("Run 'oss-update config init' to write an annotated example configuration");
    }

    ErrorContext::new(message)
}

fn render_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    message
}

fn create_error_context(error: &UpdateError, message: String) -> ErrorContext {
    let ctx = ErrorContext::new(message);
    match error {
        UpdateError::ManifestFetch { url, .. } => ctx
            .with_suggestion(format!(
                "Check that {url} is reachable and that base_url and manifest_file_name are correct"
            ))
            .with_details("The release manifest is fetched from {base_url}/{manifest_file_name} before anything else"),

        UpdateError::ManifestParse { .. } => ctx
            .with_suggestion("Publish the manifest as a JSON object or array with version, url and hash fields")
            .with_details("Every entry needs a dotted version number; pubTime decides which entry is the latest"),

        UpdateError::Download { .. } => ctx
            .with_suggestion("Check your network connection and run the update again")
            .with_details("Partially downloaded artifacts are overwritten on the next attempt"),

        UpdateError::ChecksumMismatch { .. } => ctx
            .with_suggestion("Re-run the update to download the artifact again; if it keeps failing, the published hash is wrong")
            .with_details("The artifact was not installed because its SHA-256 digest differs from the manifest"),

        UpdateError::IntegrityComputation { .. } => ctx
            .with_suggestion("Check that the download directory is readable and has free space"),

        UpdateError::DeploymentDispatch { .. } => ctx
            .with_suggestion("Make sure a package installer is available and the file provider authority is configured")
            .with_details("The downloaded package was verified but could not be handed to the system installer"),

        UpdateError::DeploymentExtract { .. } => ctx
            .with_suggestion("Reinstall the application manually; the application directory may be partially updated")
            .with_details("The application was not relaunched because extraction did not complete"),

        UpdateError::DeploymentLaunch { executable, .. } => ctx
            .with_suggestion(format!(
                "Start {} manually; check the deploy.executable setting",
                executable.display()
            ))
            .with_details("The update was extracted but the refreshed application could not be started"),

        UpdateError::Cancelled { .. } => ctx
            .with_details("No files of the running application were modified"),

        UpdateError::InvalidParameters { .. } => ctx
            .with_suggestion("Fix the configuration file or run 'oss-update config show' to inspect the effective settings"),
    }
}
