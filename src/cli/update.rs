//! `oss-update update`: run the whole pipeline.

use super::{CliConfig, cancel_on_ctrl_c};
use crate::transport::HttpTransport;
use crate::update::{
    DeployAction, TracingObserver, UpdateObserver, UpdateOrchestrator, UpdateOutcome, strategy_for,
};
use crate::utils::TerminalProgress;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

/// Check, download, verify and deploy the latest release.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Skip checksum verification of downloaded artifacts
    #[arg(long)]
    no_verify: bool,

    /// Directory to download the manifest and artifacts into
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,
}

impl UpdateCommand {
    /// Returns the exit code the process should end with.
    pub async fn execute(self, config: &CliConfig) -> Result<i32> {
        let mut params = config.load_parameters().await?;
        if self.no_verify {
            params.verify_checksum = false;
        }
        if let Some(dir) = self.download_dir {
            params.download_dir = Some(dir);
        }

        let transport =
            HttpTransport::new(&params.http).context("Failed to initialise HTTP transport")?;
        let strategy = strategy_for(&params);
        let observer: Arc<dyn UpdateObserver> =
            if config.progress_enabled() && std::io::stderr().is_terminal() {
                Arc::new(TerminalProgress::new(true))
            } else {
                Arc::new(TracingObserver)
            };
        let orchestrator =
            UpdateOrchestrator::new(params, transport, strategy).with_observer(observer);

        match orchestrator.run(&cancel_on_ctrl_c()).await {
            UpdateOutcome::UpToDate {
                version,
            } => {
                println!("{} {} is up to date", "✓".green(), version);
                Ok(0)
            }
            UpdateOutcome::Completed {
                version,
                action: DeployAction::Dispatched,
            } => {
                println!(
                    "{} Install of {} handed to the system installer",
                    "✓".green(),
                    version.to_string().bold()
                );
                Ok(0)
            }
            UpdateOutcome::Completed {
                version,
                action: DeployAction::ExitProcess {
                    code,
                },
            } => {
                println!(
                    "{} Updated to {}, relaunched the application",
                    "✓".green(),
                    version.to_string().bold()
                );
                Ok(code)
            }
            UpdateOutcome::Failed(error) => Err(error.into()),
        }
    }
}
