//! Configuration of an update run.
//!
//! [`UpdateParameters`] carries everything the pipeline needs: where the
//! manifest lives, what the running version is, where downloads go and how
//! verified artifacts are deployed. It is usually loaded from TOML.
//!
//! # Location
//!
//! - Default: `<config dir>/oss-update/config.toml`
//!   (`~/.config` on Linux, `~/Library/Application Support` on macOS,
//!   `%APPDATA%` on Windows)
//! - Override: `OSS_UPDATE_CONFIG=/path/to/config.toml` or `--config`
//!
//! # Format
//!
//! ```toml
//! base_url = "https://releases.example.com/app"
//! manifest_file_name = "versions.json"   # default
//! artifact_file_name = "app.zip"
//! current_version = "1.4.2"
//! download_dir = "/var/cache/app-updates" # default: <cache dir>/oss-update
//! verify_checksum = true                  # default
//!
//! [http]
//! timeout_secs = 300
//! connect_timeout_secs = 30
//!
//! [deploy]
//! kind = "unpack-relaunch"
//! target_dir = "/opt/app"
//! executable = "bin/app"
//! extraction = "latest-only"              # or "all-pending"
//! exit_code = 0
//! ```
//!
//! The package-install variant instead takes:
//!
//! ```toml
//! [deploy]
//! kind = "package-install"
//! authority = "com.example.app.fileprovider"
//! scoped_file_access = true
//! mime_type = "application/vnd.android.package-archive"
//! ```
//!
//! # Environment Overrides
//!
//! `OSS_UPDATE_BASE_URL` and `OSS_UPDATE_CURRENT_VERSION` replace the
//! corresponding fields after the file is loaded.

mod loader;
mod parameters;

pub use loader::{BASE_URL_ENV, CONFIG_PATH_ENV, CURRENT_VERSION_ENV};
pub use parameters::{
    DEFAULT_MANIFEST_FILE_NAME, DEFAULT_PACKAGE_MIME_TYPE, DeployTarget, ExtractionMode,
    HttpSettings, UpdateParameters,
};
