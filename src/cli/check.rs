//! `oss-update check`: report whether an update is available.

use super::{CliConfig, cancel_on_ctrl_c};
use crate::transport::HttpTransport;
use crate::update::{Resolution, TracingObserver, UpdateOrchestrator, strategy_for};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

/// Resolve the manifest without downloading anything.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// List every pending release instead of only the latest
    #[arg(long)]
    pending: bool,
}

impl CheckCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let params = config.load_parameters().await?;
        let transport =
            HttpTransport::new(&params.http).context("Failed to initialise HTTP transport")?;
        let strategy = strategy_for(&params);
        let orchestrator = UpdateOrchestrator::new(params, transport, strategy)
            .with_observer(Arc::new(TracingObserver));

        println!("{}", "Checking for updates...".cyan());
        let resolution = orchestrator.check(&cancel_on_ctrl_c()).await?;

        match resolution {
            Resolution::UpToDate {
                latest,
            } => {
                println!("{} {} is up to date", "✓".green(), latest.version);
            }
            Resolution::UpdateAvailable {
                current,
                latest,
                pending,
            } => {
                println!(
                    "{} {} -> {}",
                    "Update available:".yellow().bold(),
                    current,
                    latest.version.to_string().green()
                );
                if let Some(published) = latest.pub_time {
                    println!("  published {}", published.format("%Y-%m-%d %H:%M UTC"));
                }
                if self.pending && pending.len() > 1 {
                    println!("  pending releases:");
                    for entry in &pending {
                        println!("    {} ({})", entry.version, entry.url);
                    }
                }
                println!("Run `oss-update update` to install it");
            }
        }
        Ok(())
    }
}
