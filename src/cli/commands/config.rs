use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use super::load_settings;
use crate::cli::output::get_formatter;
use crate::error::ConfigError;
use crate::models::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Show resolved configuration with secrets masked")]
    Show,
    #[command(about = "Validate configuration")]
    Check {
        #[arg(
            long,
            help = "Apply production readiness checks regardless of ENVIRONMENT"
        )]
        production: bool,
    },
}

pub async fn handle_config(
    cmd: ConfigCommand,
    config_dir: &Path,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let settings = load_settings(config_dir)?;

    match cmd {
        ConfigCommand::Show => {
            print!("{}", formatter.format_settings(&settings));
        }
        ConfigCommand::Check { production } => {
            if (production || settings.environment.is_production())
                && let Err(ConfigError::ProductionValidation(problems)) =
                    settings.validate_for_production()
            {
                print!("{}", formatter.format_problems(&problems));
                anyhow::bail!("configuration is not production ready");
            }
            print!(
                "{}",
                formatter.format_message(&format!(
                    "Configuration valid for {}",
                    settings.environment
                ))
            );
        }
    }
    Ok(())
}
