//! Error taxonomy shared by admission, retrieval and search

use crate::identifiers::DumpIdentifier;
use crate::model::DumpStatus;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// URL/path unreachable or malformed at validation time
    #[error("invalid source: {reason}")]
    InvalidSource { reason: String },

    /// Input carried auxiliary data only, there is no dump to analyze
    #[error("no bundle produced: {reason}")]
    NoBundleProduced { reason: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("analysis of {id} is not finished yet (status: {status})")]
    NotReady { id: DumpIdentifier, status: DumpStatus },

    #[error("analysis of {id} failed: {reason}")]
    AnalysisFailed { id: DumpIdentifier, reason: String },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("timeout ({timeout:?}) elapsed waiting for {service}")]
    UpstreamTimeout { service: String, timeout: Duration },

    /// Collaborator unreachable or answered with an unexpected failure
    #[error("{service} unavailable: {reason}")]
    Upstream { service: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    pub fn invalid_source(reason: impl Into<String>) -> Self {
        Error::InvalidSource {
            reason: reason.into(),
        }
    }

    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Error::InvalidQuery {
            reason: reason.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, reason: impl ToString) -> Self {
        Error::Upstream {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// Map a reqwest failure, keeping timeouts distinct from other failures
    pub fn from_http(service: &str, timeout: Duration, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::UpstreamTimeout {
                service: service.to_string(),
                timeout,
            }
        } else {
            Error::upstream(service, e)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Io(std::io::Error::other(format!("task join error: {}", e)))
    }
}
