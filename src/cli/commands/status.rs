use std::path::Path;

use anyhow::{Context, Result};

use super::load_settings;
use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::services::pipeline;

pub async fn handle_status(config_dir: &Path, format: OutputFormat) -> Result<()> {
    let settings = load_settings(config_dir)?;
    let status = pipeline::status(&settings)
        .await
        .context("status check failed")?;

    print!("{}", get_formatter(format).format_status(&status));

    if !status.database.database_exists || !status.database.extension_enabled {
        eprintln!();
        eprintln!("Hint: run `docingest bootstrap` to create the database and extension.");
    }
    Ok(())
}
