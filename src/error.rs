use std::fmt;
use thiserror::Error;

use crate::page_type::UsageCategory;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not authenticated: no caller identity")]
    Unauthenticated,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Monthly {category} generation limit reached")]
    QuotaExceeded { category: UsageCategory },

    // The model-service variants carry a caller-safe reason, never the
    // provider's raw error text.
    #[error("Model service is not configured: {0}")]
    Unconfigured(String),

    #[error("Model service is rate limited, please retry in a few minutes: {0}")]
    UpstreamRateLimited(String),

    #[error("Model service failure: {0}")]
    UpstreamFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Caller-facing error category. Several internal variants collapse onto the
/// same kind; `UpstreamRateLimited` shares `ResourceExhausted` with quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    InvalidArgument,
    ResourceExhausted,
    FailedPrecondition,
    Unavailable,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::QuotaExceeded { .. } | Error::UpstreamRateLimited(_) => {
                ErrorKind::ResourceExhausted
            }
            Error::Unconfigured(_) => ErrorKind::FailedPrecondition,
            Error::UpstreamFailure(_) => ErrorKind::Unavailable,
            Error::Internal(_)
            | Error::Database(_)
            | Error::Migration(_)
            | Error::Config(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::UpstreamRateLimited(_) | Error::UpstreamFailure(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
