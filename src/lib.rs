use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnError>;

#[derive(Error, Debug)]
pub enum AnnError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AnnError {
    /// Whether the error was caused by the request itself rather than a collaborator
    #[inline]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

impl From<sqlx::Error> for AnnError {
    #[inline]
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => Self::Connection(error.to_string()),
            sqlx::Error::Database(ref db) if db.code().is_some_and(|c| c.starts_with("28")) => {
                // SQLSTATE class 28: invalid authorization specification
                Self::Connection(error.to_string())
            }
            _ => Self::Database(error.to_string()),
        }
    }
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod metrics;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
