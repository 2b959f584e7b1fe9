//! Layered key/value source: env file first, process variables on top.
//!
//! Keys are matched case-insensitively. Nested settings are addressed with a
//! `__` delimiter, e.g. `DATABASE__PASSWORD` or `TUNNEL__LOCAL_BIND_PORT`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::SecretString;
use tracing::debug;

use crate::error::ConfigError;
use crate::models::Environment;

/// Process variable that selects the env file.
pub const ENVIRONMENT_VAR: &str = "ENVIRONMENT";

/// Delimiter between a section and its field.
pub const NESTED_DELIMITER: &str = "__";

/// Which env file was chosen for a requested environment name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    /// Raw value of `ENVIRONMENT`, if set and non-empty.
    pub requested: Option<String>,
    /// Environment whose file was selected.
    pub environment: Environment,
    pub path: PathBuf,
    /// True when `requested` did not name a known environment.
    pub fell_back: bool,
}

/// Maps the requested environment onto `.env.<environment>` in `config_dir`.
///
/// Unrecognized names select the development file.
pub fn select_source(config_dir: &Path, requested: Option<&str>) -> SourceSelection {
    let requested = requested
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let (environment, fell_back) = match requested.as_deref() {
        None => (Environment::Development, false),
        Some(name) => match name.parse::<Environment>() {
            Ok(env) => (env, false),
            Err(_) => (Environment::Development, true),
        },
    };

    SourceSelection {
        requested,
        environment,
        path: config_dir.join(environment.env_file_name()),
        fell_back,
    }
}

/// Flattened settings with lowercase keys.
#[derive(Debug, Clone, Default)]
pub struct LayeredSource {
    values: BTreeMap<String, String>,
}

impl LayeredSource {
    /// Reads `file` (if present) and overlays `vars`.
    pub fn load<I>(file: &Path, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut source = Self::default();

        if file.is_file() {
            let iter = dotenvy::from_path_iter(file).map_err(|e| env_file_error(file, e))?;
            for item in iter {
                let (key, value) = item.map_err(|e| env_file_error(file, e))?;
                source.insert(&key, value);
            }
            debug!(path = %file.display(), keys = source.values.len(), "loaded env file");
        } else {
            debug!(path = %file.display(), "env file not found, using process variables only");
        }

        source.overlay(vars);
        Ok(source)
    }

    pub fn overlay<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            self.insert(&key, value);
        }
    }

    fn insert(&mut self, key: &str, value: String) {
        self.values.insert(key.to_lowercase(), value);
    }

    /// Non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingField(key.to_uppercase()))
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn optional(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    pub fn secret(&self, key: &str) -> Option<SecretString> {
        // Secrets keep surrounding whitespace; only a missing or blank value is absent.
        self.values
            .get(&key.to_lowercase())
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::new(v.clone()))
    }

    pub fn require_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        self.secret(key)
            .ok_or_else(|| ConfigError::MissingField(key.to_uppercase()))
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, e.to_string())),
        }
    }

    /// TCP port in `1..=65535`.
    pub fn port_or(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        let port: u32 = self.parse_or(key, u32::from(default))?;
        match u16::try_from(port) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(invalid(key, format!("port {port} is outside 1..=65535"))),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(str::to_lowercase).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(other) => Err(invalid(key, format!("'{other}' is not a boolean"))),
        }
    }
}

/// `section` + `field` joined with [`NESTED_DELIMITER`].
pub fn nested(section: &str, field: &str) -> String {
    format!("{section}{NESTED_DELIMITER}{field}")
}

fn invalid(key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_uppercase(),
        message,
    }
}

fn env_file_error(path: &Path, err: dotenvy::Error) -> ConfigError {
    let path = path.display().to_string();
    match err {
        dotenvy::Error::Io(source) => ConfigError::IoError { path, source },
        other => ConfigError::EnvFileError {
            path,
            message: other.to_string(),
        },
    }
}
