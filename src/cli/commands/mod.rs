mod bootstrap;
mod config;
mod ingest;
mod status;

pub use config::ConfigCommand;
pub use ingest::IngestArgs;

pub use bootstrap::handle_bootstrap;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use status::handle_status;

use std::path::Path;

use anyhow::{Context, Result};

use crate::models::Settings;
use crate::settings::SettingsResolver;

/// Resolve settings for a command. Failure here stops the process.
pub(crate) fn load_settings(config_dir: &Path) -> Result<Settings> {
    SettingsResolver::new(config_dir)
        .resolve()
        .with_context(|| format!("failed to resolve settings from {}", config_dir.display()))
}
