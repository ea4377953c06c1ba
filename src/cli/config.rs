//! `oss-update config`: inspect and initialise the configuration file.

use super::CliConfig;
use crate::config::UpdateParameters;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

/// Manage the configuration file.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommands {
    /// Write an example configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration and whether it is valid (default)
    Show,

    /// Print the configuration file location
    Path,
}

impl ConfigCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let path = match &config.config_path {
            Some(path) => path.clone(),
            None => UpdateParameters::default_path()?,
        };

        match self.command {
            Some(ConfigSubcommands::Init {
                force,
            }) => Self::init(path, force).await,
            Some(ConfigSubcommands::Show) | None => Self::show(config, &path).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", path.display());
                Ok(())
            }
        }
    }

    async fn init(path: PathBuf, force: bool) -> Result<()> {
        if path.exists() && !force {
            println!("{} Configuration already exists at {}", "✗".red(), path.display());
            println!("  Use --force to overwrite");
            return Ok(());
        }

        let example = UpdateParameters::init_example();
        example.save_to(&path).await?;

        println!("{} Created configuration at {}", "✓".green(), path.display());
        println!("\n{}", "Example configuration:".bold());
        println!("{}", toml::to_string_pretty(&example)?);
        println!("{}", "Next steps:".yellow());
        println!("  1. Point base_url at the directory holding your release manifest");
        println!("  2. Set artifact_file_name, current_version and the [deploy] section");
        Ok(())
    }

    async fn show(config: &CliConfig, path: &PathBuf) -> Result<()> {
        let params = config.load_parameters().await?;

        println!("{}", "Effective configuration".bold());
        if path.exists() {
            println!("Location: {}\n", path.display());
        } else {
            println!("Location: {} (not found, using defaults)\n", path.display());
        }
        println!("{}", toml::to_string_pretty(&params)?);
        println!("download_dir (resolved) = {}", params.download_dir().display());

        match params.validate() {
            Ok(()) => println!("\n{} configuration is valid", "✓".green()),
            Err(error) => {
                println!("\n{} {}", "✗".red(), error);
                println!("\n{}", "Tip:".yellow());
                println!("  Run 'oss-update config init' to create an example configuration");
            }
        }
        Ok(())
    }
}
