pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod settings;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{
    BootstrapError, ConfigError, EmbeddingError, LoaderError, PipelineError, StoreError,
    TunnelError,
};
pub use models::{ConnectionParams, Environment, OutputFormat, Settings};
pub use settings::SettingsResolver;
