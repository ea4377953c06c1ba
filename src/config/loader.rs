//! Reading and writing `config.toml`.

use super::parameters::{DeployTarget, UpdateParameters};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "OSS_UPDATE_CONFIG";

/// Environment variable overriding `base_url`.
pub const BASE_URL_ENV: &str = "OSS_UPDATE_BASE_URL";

/// Environment variable overriding `current_version`.
pub const CURRENT_VERSION_ENV: &str = "OSS_UPDATE_CURRENT_VERSION";

impl UpdateParameters {
    /// Load from the default location and apply environment overrides.
    ///
    /// A missing file is not an error: the defaults are returned and
    /// [`UpdateParameters::validate`] reports whatever is still missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the default path cannot be determined, or the file
    /// exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, otherwise from the default location.
    ///
    /// # Errors
    ///
    /// Same as [`UpdateParameters::load`].
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        let mut params = if path.exists() {
            Self::load_from(&path).await?
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Self::empty()
        };
        params.apply_env_overrides();
        Ok(params)
    }

    /// Load from a specific file without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML of
    /// the expected shape.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration from {}", path.display()))
    }

    /// Write the configuration as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create configuration directory {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
        Ok(())
    }

    /// Default configuration file location.
    ///
    /// `OSS_UPDATE_CONFIG` wins when set, otherwise
    /// `<config dir>/oss-update/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no configuration directory.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine configuration directory"))?;
        Ok(dir.join("oss-update").join("config.toml"))
    }

    /// Apply `OSS_UPDATE_BASE_URL` and `OSS_UPDATE_CURRENT_VERSION`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.is_empty() {
                debug!("{} overrides base_url", BASE_URL_ENV);
                self.base_url = base_url;
            }
        }
        if let Ok(version) = std::env::var(CURRENT_VERSION_ENV) {
            if !version.is_empty() {
                debug!("{} overrides current_version", CURRENT_VERSION_ENV);
                self.current_version = version;
            }
        }
    }

    /// An annotated starting point for `oss-update config init`.
    ///
    /// The values are placeholders and must be edited before use.
    #[must_use]
    pub fn init_example() -> Self {
        let deploy = if cfg!(target_os = "android") {
            DeployTarget::package_install("com.example.app.fileprovider")
        } else {
            DeployTarget::unpack_relaunch("/opt/example-app", "example-app")
        };
        Self::new("https://releases.example.com/example-app", "update.zip", "0.1.0", deploy)
    }

    fn empty() -> Self {
        Self::new(String::new(), String::new(), String::new(), DeployTarget::platform_default())
    }
}
