//! Environment-driven settings resolution.
//!
//! Resolution order:
//! 1. `ENVIRONMENT` picks `.env.development`, `.env.testing` or
//!    `.env.production` from the config directory. Anything else picks the
//!    development file.
//! 2. The env file is read and process variables are layered on top.
//! 3. Sections are built and range-checked.
//! 4. Production settings must additionally pass
//!    [`Settings::validate_for_production`].

mod source;

pub use source::{
    ENVIRONMENT_VAR, LayeredSource, NESTED_DELIMITER, SourceSelection, nested, select_source,
};

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::ConfigError;
use crate::models::{
    AuthConfig, DEFAULT_ADMIN_DATABASE, DEFAULT_APP_NAME, DEFAULT_DB_HOST, DEFAULT_DB_PORT,
    DEFAULT_EMBEDDING_BASE_URL, DEFAULT_LOCAL_BIND_PORT, DEFAULT_SSH_PORT, DEFAULT_SSH_USERNAME,
    DEFAULT_VERSION, DatabaseConfig, Environment, ModelConfig, Settings, TunnelConfig,
};

/// Resolves [`Settings`] from a config directory and a variable snapshot.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    config_dir: PathBuf,
}

impl SettingsResolver {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Resolve against the current process environment.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        self.resolve_from(process_vars())
    }

    /// Resolve against an explicit variable snapshot.
    pub fn resolve_from<I>(&self, vars: I) -> Result<Settings, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let selection = self.select(&vars);

        if selection.fell_back {
            warn!(
                requested = selection.requested.as_deref().unwrap_or_default(),
                path = %selection.path.display(),
                "unrecognized environment, using development settings file"
            );
        }

        let source = LayeredSource::load(&selection.path, vars)?;
        let settings = build_settings(&source)?;

        if settings.environment.is_production() {
            settings.validate_for_production()?;
        }

        info!(
            app = %settings.app_name,
            environment = %settings.environment,
            source = %selection.path.display(),
            "settings resolved"
        );
        Ok(settings)
    }

    /// Which env file a variable snapshot selects.
    pub fn select(&self, vars: &[(String, String)]) -> SourceSelection {
        let requested = vars
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(ENVIRONMENT_VAR))
            .map(|(_, v)| v.as_str());
        select_source(&self.config_dir, requested)
    }
}

/// Process variables that are valid UTF-8.
pub fn process_vars() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

fn build_settings(source: &LayeredSource) -> Result<Settings, ConfigError> {
    let environment = match source.get("environment") {
        Some(raw) => raw.parse::<Environment>()?,
        None => Environment::default(),
    };

    Ok(Settings {
        app_name: source.string_or("app_name", DEFAULT_APP_NAME),
        version: source.string_or("version", DEFAULT_VERSION),
        environment,
        debug: source.bool_or("debug", false)?,
        model: build_model(source)?,
        database: build_database(source)?,
        tunnel: build_tunnel(source)?,
        auth: AuthConfig {
            secret_key: source.secret(&nested("auth", "secret_key")),
        },
    })
}

fn build_model(source: &LayeredSource) -> Result<ModelConfig, ConfigError> {
    let key = |field| nested("model", field);

    let batch_size: usize = source.parse_or(&key("batch_size"), 64)?;
    if batch_size == 0 {
        return Err(ConfigError::InvalidValue {
            key: key("batch_size").to_uppercase(),
            message: "must be at least 1".to_string(),
        });
    }

    Ok(ModelConfig {
        chat_model_name: source.require(&key("chat_model_name"))?,
        embedding_model_name: source.require(&key("embedding_model_name"))?,
        api_key: source.require_secret(&key("api_key"))?,
        base_url: source
            .string_or(&key("base_url"), DEFAULT_EMBEDDING_BASE_URL)
            .trim_end_matches('/')
            .to_string(),
        timeout_secs: source.parse_or(&key("timeout_secs"), 120)?,
        batch_size,
    })
}

fn build_database(source: &LayeredSource) -> Result<DatabaseConfig, ConfigError> {
    let key = |field| nested("database", field);

    Ok(DatabaseConfig {
        user: source.string_or(&key("user"), ""),
        password: source.require_secret(&key("password"))?,
        host: source.string_or(&key("host"), DEFAULT_DB_HOST),
        port: source.port_or(&key("port"), DEFAULT_DB_PORT)?,
        name: source.string_or(&key("name"), DEFAULT_ADMIN_DATABASE),
        vector_db_name: source.require(&key("vector_db_name"))?,
        collection_name: source.require(&key("collection_name"))?,
        connect_timeout_secs: source.parse_or(&key("connect_timeout_secs"), 10)?,
    })
}

fn build_tunnel(source: &LayeredSource) -> Result<TunnelConfig, ConfigError> {
    let key = |field| nested("tunnel", field);

    let enabled = source.bool_or(&key("enabled"), true)?;
    let host_name = if enabled {
        source.require(&key("host_name"))?
    } else {
        source.string_or(&key("host_name"), "")
    };

    Ok(TunnelConfig {
        enabled,
        host_name,
        port: source.port_or(&key("port"), DEFAULT_SSH_PORT)?,
        username: source.string_or(&key("username"), DEFAULT_SSH_USERNAME),
        db_port: source.port_or(&key("db_port"), DEFAULT_DB_PORT)?,
        local_bind_port: source.port_or(&key("local_bind_port"), DEFAULT_LOCAL_BIND_PORT)?,
        identity_file: source.optional(&key("identity_file")),
        connect_timeout_secs: source.parse_or(&key("connect_timeout_secs"), 30)?,
        ssh_binary: source.string_or(&key("ssh_binary"), "ssh"),
    })
}
