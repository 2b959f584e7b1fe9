mod config;
mod document;

pub use config::{
    AuthConfig, ConnectionParams, DEFAULT_ADMIN_DATABASE, DEFAULT_APP_NAME, DEFAULT_DB_HOST,
    DEFAULT_DB_PORT, DEFAULT_EMBEDDING_BASE_URL, DEFAULT_LOCAL_BIND_PORT, DEFAULT_SSH_PORT,
    DEFAULT_SSH_USERNAME, DEFAULT_VECTOR_EXTENSION, DEFAULT_VERSION, DatabaseConfig, Environment,
    MIN_PASSWORD_LEN, MIN_SECRET_KEY_LEN, ModelConfig, Settings, TunnelConfig,
    WEAK_DEFAULT_PASSWORD,
};
pub use document::{Document, DocumentChunk};

#[cfg(test)]
pub(crate) use config::tests::sample_settings;

use serde::{Deserialize, Serialize};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
