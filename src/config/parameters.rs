//! Parameters of one update run.

use crate::core::{Result, UpdateError};
use crate::transport::join_url;
use crate::version::ReleaseVersion;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// MIME type used for Android package installs.
pub const DEFAULT_PACKAGE_MIME_TYPE: &str = "application/vnd.android.package-archive";

/// File name of the manifest when none is configured.
pub const DEFAULT_MANIFEST_FILE_NAME: &str = "versions.json";

/// Everything one orchestration run needs to know.
///
/// Constructed once per run and never mutated by the pipeline. Deserialises
/// from the `config.toml` layout documented in [`crate::config`].
///
/// # Examples
///
/// ```rust,no_run
/// use oss_update::config::{DeployTarget, UpdateParameters};
///
/// let params = UpdateParameters::new(
///     "https://releases.example.com/app",
///     "app.zip",
///     "1.4.2",
///     DeployTarget::unpack_relaunch("/opt/app", "bin/app"),
/// )
/// .with_manifest_file_name("stable.json");
///
/// assert_eq!(params.manifest_url(), "https://releases.example.com/app/stable.json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateParameters {
    /// URL the manifest file name is appended to
    #[serde(default)]
    pub base_url: String,

    /// Manifest file name under `base_url`, also its local file name
    #[serde(default = "default_manifest_file_name")]
    pub manifest_file_name: String,

    /// Local file name the downloaded artifact is stored under
    #[serde(default)]
    pub artifact_file_name: String,

    /// Version of the running application
    #[serde(default)]
    pub current_version: String,

    /// Where the manifest and artifacts are written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Compare artifact digests against the manifest
    #[serde(default = "default_true")]
    pub verify_checksum: bool,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpSettings,

    /// How verified artifacts are deployed
    #[serde(default = "DeployTarget::platform_default")]
    pub deploy: DeployTarget,
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Whole-request timeout in seconds, `0` disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// `User-Agent` header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// `[deploy]` section: which deployment variant to use and its settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeployTarget {
    /// Hand the artifact to the OS package installer.
    PackageInstall {
        /// File provider authority used to build `content://` URIs
        authority: String,
        /// Expose the artifact through the file provider instead of a raw path
        #[serde(default = "default_true")]
        scoped_file_access: bool,
        /// MIME type announced to the installer
        #[serde(default = "default_mime_type")]
        mime_type: String,
    },

    /// Extract archives over the application directory and relaunch it.
    UnpackRelaunch {
        /// Application directory archives are extracted into
        target_dir: PathBuf,
        /// Executable started after extraction, relative to `target_dir`
        executable: PathBuf,
        /// Which manifest entries are extracted
        #[serde(default)]
        extraction: ExtractionMode,
        /// Exit code requested for the current process after relaunch
        #[serde(default)]
        exit_code: i32,
    },
}

impl DeployTarget {
    /// Package-install settings with scoped file access and the APK MIME type.
    #[must_use]
    pub fn package_install(authority: impl Into<String>) -> Self {
        Self::PackageInstall {
            authority: authority.into(),
            scoped_file_access: true,
            mime_type: default_mime_type(),
        }
    }

    /// Unpack-and-relaunch settings extracting only the latest release.
    #[must_use]
    pub fn unpack_relaunch(target_dir: impl Into<PathBuf>, executable: impl Into<PathBuf>) -> Self {
        Self::UnpackRelaunch {
            target_dir: target_dir.into(),
            executable: executable.into(),
            extraction: ExtractionMode::LatestOnly,
            exit_code: 0,
        }
    }

    /// The variant used when `[deploy]` is absent: package install on
    /// Android, unpack-and-relaunch everywhere else.
    ///
    /// The returned settings are empty and fail validation until filled in.
    #[must_use]
    pub fn platform_default() -> Self {
        if cfg!(target_os = "android") {
            Self::package_install(String::new())
        } else {
            Self::unpack_relaunch(PathBuf::new(), PathBuf::new())
        }
    }

    /// Configuration name of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PackageInstall { .. } => "package-install",
            Self::UnpackRelaunch { .. } => "unpack-relaunch",
        }
    }

    /// Which manifest entries this target deploys.
    ///
    /// Package installs always take the single latest release.
    #[must_use]
    pub const fn extraction(&self) -> ExtractionMode {
        match self {
            Self::PackageInstall { .. } => ExtractionMode::LatestOnly,
            Self::UnpackRelaunch { extraction, .. } => *extraction,
        }
    }
}

/// Which manifest entries the unpack-and-relaunch variant applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMode {
    /// Download and extract the latest release only.
    #[default]
    LatestOnly,
    /// Download every release newer than the running one and extract them
    /// oldest first, applying a chain of incremental packages.
    AllPending,
}

impl UpdateParameters {
    /// Create parameters with default manifest name, download dir and HTTP settings.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        artifact_file_name: impl Into<String>,
        current_version: impl Into<String>,
        deploy: DeployTarget,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            manifest_file_name: default_manifest_file_name(),
            artifact_file_name: artifact_file_name.into(),
            current_version: current_version.into(),
            download_dir: None,
            verify_checksum: true,
            http: HttpSettings::default(),
            deploy,
        }
    }

    /// Use another manifest file name.
    #[must_use]
    pub fn with_manifest_file_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_file_name = name.into();
        self
    }

    /// Write downloads into `dir`.
    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Enable or disable digest comparison.
    #[must_use]
    pub const fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Replace the HTTP settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    /// URL the manifest is fetched from.
    #[must_use]
    pub fn manifest_url(&self) -> String {
        join_url(&self.base_url, &self.manifest_file_name)
    }

    /// Directory downloads are written to.
    ///
    /// Falls back to `oss-update` under the user cache directory, or under the
    /// system temp directory when no cache directory is known.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("oss-update")
        })
    }

    /// Local path of the downloaded manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.download_dir().join(&self.manifest_file_name)
    }

    /// The running version, parsed.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidParameters`] if `current_version` is not
    /// a dotted version number.
    pub fn current_release(&self) -> Result<ReleaseVersion> {
        ReleaseVersion::parse(&self.current_version).map_err(|err| {
            UpdateError::invalid_parameters(format!(
                "current_version '{}' is not a valid version: {err}",
                self.current_version
            ))
        })
    }

    /// Check the parameters before any I/O happens.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidParameters`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(UpdateError::invalid_parameters("base_url is empty"));
        }
        let url = Url::parse(base).map_err(|err| {
            UpdateError::invalid_parameters(format!("base_url '{base}' is not a valid URL: {err}"))
        })?;
        if !matches!(url.scheme(), "http" | "https" | "file") {
            return Err(UpdateError::invalid_parameters(format!(
                "base_url scheme '{}' is not supported (use http, https or file)",
                url.scheme()
            )));
        }

        validate_file_name("manifest_file_name", &self.manifest_file_name)?;
        validate_file_name("artifact_file_name", &self.artifact_file_name)?;
        self.current_release()?;

        match &self.deploy {
            DeployTarget::PackageInstall {
                authority,
                mime_type,
                ..
            } => {
                if authority.trim().is_empty() {
                    return Err(UpdateError::invalid_parameters("deploy.authority is empty"));
                }
                if mime_type.trim().is_empty() {
                    return Err(UpdateError::invalid_parameters("deploy.mime_type is empty"));
                }
            }
            DeployTarget::UnpackRelaunch {
                target_dir,
                executable,
                ..
            } => {
                if target_dir.as_os_str().is_empty() {
                    return Err(UpdateError::invalid_parameters("deploy.target_dir is empty"));
                }
                validate_executable(executable)?;
            }
        }

        Ok(())
    }
}

fn validate_file_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(UpdateError::invalid_parameters(format!("{field} is empty")));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(UpdateError::invalid_parameters(format!(
            "{field} '{name}' must be a plain file name"
        )));
    }
    Ok(())
}

fn validate_executable(executable: &Path) -> Result<()> {
    if executable.as_os_str().is_empty() {
        return Err(UpdateError::invalid_parameters("deploy.executable is empty"));
    }
    let escapes = executable
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if executable.is_absolute() || escapes {
        return Err(UpdateError::invalid_parameters(format!(
            "deploy.executable '{}' must be relative to deploy.target_dir",
            executable.display()
        )));
    }
    Ok(())
}

const fn default_true() -> bool {
    true
}

fn default_manifest_file_name() -> String {
    DEFAULT_MANIFEST_FILE_NAME.to_string()
}

fn default_mime_type() -> String {
    DEFAULT_PACKAGE_MIME_TYPE.to_string()
}

const fn default_timeout_secs() -> u64 {
    300
}

const fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("oss-update/{}", env!("CARGO_PKG_VERSION"))
}
