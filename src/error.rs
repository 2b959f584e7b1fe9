//! Error types for the document ingestion pipeline.

use std::process::ExitStatus;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised while resolving or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse env file {path}: {message}")]
    EnvFileError { path: String, message: String },

    #[error("missing required setting: {0}")]
    MissingField(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("environment must be one of [development, testing, production], got '{0}'")]
    UnknownEnvironment(String),

    #[error("Production validation failed. Required: {}", .0.join(", "))]
    ProductionValidation(Vec<String>),
}

/// Errors related to the SSH forwarding session.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("local port {0} is already in use")]
    PortInUse(u16),

    #[error("failed to spawn ssh client '{binary}': {source}")]
    SpawnError {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ssh exited with {status} before the tunnel was established: {stderr}")]
    Exited { status: ExitStatus, stderr: String },

    #[error("tunnel not established within {0}s")]
    Timeout(u64),

    #[error("tunnel IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors related to database and extension bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to connect to database '{database}': {source}")]
    ConnectionError {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("connection to database '{0}' timed out")]
    Timeout(String),

    #[error("failed to create database '{database}': {source}")]
    CreateDatabase {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to enable extension '{extension}' in '{database}': {source}")]
    EnableExtension {
        database: String,
        extension: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("catalog query failed: {0}")]
    QueryError(#[source] sqlx::Error),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding API: {0}")]
    ConnectionError(String),

    #[error("embedding API returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_) => false,
        }
    }
}

/// Errors related to the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("pgvector extension error: {0}")]
    ExtensionMissing(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("insert error: {0}")]
    InsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Errors related to loading documents from disk.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("path does not exist: {0}")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from {path}: {message}")]
    PdfError { path: String, message: String },

    #[error("directory walk error: {0}")]
    WalkError(String),
}

/// Errors surfaced by the end-to-end ingestion run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("loader error: {0}")]
    Loader(#[from] LoaderError),
}
