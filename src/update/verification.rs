//! Artifact integrity verification.
//!
//! Digests are SHA-256 rendered as lowercase hex. Expected values from a
//! manifest may carry a `sha256:` prefix and use either hex case; both sides
//! are normalised before the exact comparison.
//!
//! Files are hashed in fixed 64 KiB blocks so large artifacts never have to
//! fit in memory.

use crate::core::{Result, UpdateError, UpdateStage};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Size of the blocks read while hashing.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Prefix accepted in front of expected digests.
const SHA256_PREFIX: &str = "sha256:";

/// Computes and compares artifact digests.
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Hash `path` and return the lowercase hex SHA-256 digest.
    ///
    /// Checks `cancel` between blocks.
    ///
    /// # Errors
    ///
    /// [`UpdateError::IntegrityComputation`] if the file cannot be opened or
    /// read, [`UpdateError::Cancelled`] if cancellation is requested.
    pub async fn compute_digest(path: &Path, cancel: &CancellationToken) -> Result<String> {
        debug!("Computing SHA-256 of {}", path.display());
        let read_error = |source| UpdateError::IntegrityComputation {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).await.map_err(read_error)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BLOCK_SIZE];

        loop {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled {
                    stage: UpdateStage::Verifying,
                });
            }
            let read = file.read(&mut buffer).await.map_err(read_error)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Hash `path` and compare against `expected`.
    ///
    /// # Arguments
    ///
    /// * `path` - downloaded file to hash
    /// * `artifact` - name used for the file in the mismatch error
    /// * `expected` - digest from the manifest, optionally `sha256:`-prefixed,
    ///   in either hex case
    /// * `cancel` - checked between blocks
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use oss_update::core::UpdateError;
    /// use oss_update::update::IntegrityVerifier;
    /// use std::path::Path;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let expected = "sha256:9F86D081884C7D659A2FEAA0C55AD015A3BF4F1B2B0B822CD15D6C15B0F00A08";
    /// match IntegrityVerifier::verify(
    ///     Path::new("/tmp/app-update/update.zip"),
    ///     "update.zip",
    ///     expected,
    ///     &CancellationToken::new(),
    /// )
    /// .await
    /// {
    ///     Ok(()) => println!("digest matches"),
    ///     Err(UpdateError::ChecksumMismatch { .. }) => eprintln!("refusing to deploy"),
    ///     Err(other) => return Err(other.into()),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// [`UpdateError::ChecksumMismatch`] when the digests differ, plus the
    /// errors of [`IntegrityVerifier::compute_digest`].
    pub async fn verify(
        path: &Path,
        artifact: &str,
        expected: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let actual = Self::compute_digest(path, cancel).await?;
        let expected = normalize_digest(expected);

        if actual != expected {
            return Err(UpdateError::ChecksumMismatch {
                artifact: artifact.to_string(),
                expected,
                actual,
            });
        }

        info!("Checksum verified for {}", artifact);
        Ok(())
    }
}

/// Strip an optional `sha256:` prefix and lowercase the hex digits.
#[must_use]
pub fn normalize_digest(digest: &str) -> String {
    let digest = digest.trim();
    let hex = match digest.get(..SHA256_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SHA256_PREFIX) => {
            &digest[SHA256_PREFIX.len()..]
        }
        _ => digest,
    };
    hex.to_ascii_lowercase()
}
