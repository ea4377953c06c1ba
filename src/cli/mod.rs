//! Command-line interface for oss-update.
//!
//! # Commands
//!
//! - `check` - fetch the manifest and report whether an update is available
//! - `update` - run the full pipeline: check, download, verify, deploy
//! - `config` - show, initialise or locate the configuration file
//!
//! # Global Options
//!
//! - `--config <PATH>` - configuration file (default: `<config dir>/oss-update/config.toml`)
//! - `--current-version <VERSION>` - override `current_version` from the configuration
//! - `--verbose` / `--quiet` - debug or error-only logging (`RUST_LOG` wins when set)
//! - `--no-progress` - no progress bars (also `OSS_UPDATE_NO_PROGRESS`)
//!
//! # Exit Codes
//!
//! - `0` - success, including "already up to date"
//! - `1` - any failure
//! - the configured `deploy.exit_code` after a successful relaunch
//!
//! # Examples
//!
//! ```bash
//! oss-update check
//! oss-update --current-version 1.4.2 update
//! oss-update --config ./staging.toml update --no-verify
//! oss-update config init
//! ```

mod check;
mod config;
mod update;

use crate::config::UpdateParameters;
use crate::utils::progress::is_progress_disabled;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Settings derived from the global flags, shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter directive (`debug`, `info`, `error`)
    pub log_level: String,

    /// Disable progress bars
    pub no_progress: bool,

    /// Configuration file to use instead of the default location
    pub config_path: Option<PathBuf>,

    /// Running version overriding the configuration
    pub current_version: Option<String>,
}

impl CliConfig {
    /// Load the update parameters this invocation works with.
    ///
    /// Precedence, lowest first: configuration file, environment
    /// (`OSS_UPDATE_BASE_URL`, `OSS_UPDATE_CURRENT_VERSION`), `--current-version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub async fn load_parameters(&self) -> Result<UpdateParameters> {
        let mut params = UpdateParameters::load_with_optional(self.config_path.clone()).await?;
        if let Some(version) = &self.current_version {
            debug!("--current-version overrides current_version");
            params.current_version.clone_from(version);
        }
        Ok(params)
    }

    /// Whether progress bars should be drawn.
    #[must_use]
    pub fn progress_enabled(&self) -> bool {
        !self.no_progress && !is_progress_disabled()
    }
}

/// Client-side self-updater.
#[derive(Parser)]
#[command(
    name = "oss-update",
    about = "Check for, download, verify and install application updates",
    version,
    long_about = "oss-update resolves the latest release from a published manifest, streams and \
                  verifies the artifact, and deploys it by handing it to the system package \
                  installer or by extracting it over the application and relaunching it."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "OSS_UPDATE_CONFIG")]
    config: Option<PathBuf>,

    /// Version of the running application, overriding the configuration
    #[arg(long, global = true, value_name = "VERSION")]
    current_version: Option<String>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a newer release is published
    Check(check::CheckCommand),

    /// Download, verify and deploy the latest release
    Update(update::UpdateCommand),

    /// Manage the configuration file
    Config(config::ConfigCommand),
}

impl Cli {
    /// Execute the command with settings derived from the flags.
    ///
    /// Returns the process exit code requested by the command.
    ///
    /// # Errors
    ///
    /// Any failure of the command.
    pub async fn execute(self) -> Result<i32> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Derive [`CliConfig`] from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
            current_version: self.current_version.clone(),
        }
    }

    /// Execute the command with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Any failure of the command.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<i32> {
        match self.command {
            Commands::Check(cmd) => cmd.execute(&config).await.map(|()| 0),
            Commands::Update(cmd) => cmd.execute(&config).await,
            Commands::Config(cmd) => cmd.execute(&config).await.map(|()| 0),
        }
    }
}

/// Install the global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// A token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            trigger.cancel();
        }
    });
    token
}
