use std::path::Path;

use anyhow::{Context, Result};

use super::load_settings;
use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::services::pipeline;

pub async fn handle_bootstrap(config_dir: &Path, format: OutputFormat) -> Result<()> {
    let settings = load_settings(config_dir)?;
    let report = pipeline::bootstrap(&settings)
        .await
        .context("bootstrap failed")?;
    print!("{}", get_formatter(format).format_bootstrap(&report));
    Ok(())
}
