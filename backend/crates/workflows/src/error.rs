use std::time::Duration;

use dust_common::error::DustError;
use thiserror::Error;

/// Failure of a single activity call, classified by how a workflow must react.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivityError {
    /// Invalid or expired credentials. Aborts the run.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider throttling. Retried; aborts the run once retries are exhausted.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Whether this is fatal depends on what was looked up.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("upsert failed: {0}")]
    Upsert(String),

    /// One document was rejected by its source or could not be decoded.
    /// Never retried; the document is skipped.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Missing credentials or configuration. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::TransientNetwork(_) | Self::Upsert(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransientNetwork(_) => "transient_network",
            Self::NotFound(_) => "not_found",
            Self::Upsert(_) => "upsert",
            Self::InvalidDocument(_) => "invalid_document",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Repository and configuration failures seen from inside an activity.
impl From<DustError> for ActivityError {
    fn from(err: DustError) -> Self {
        match err {
            DustError::NotFound(msg) => Self::NotFound(msg),
            DustError::Config(msg) => Self::Config(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no workflow handler registered for type {0}")]
    UnknownWorkflowType(String),

    #[error("no running workflow with id {0}")]
    WorkflowNotFound(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Activity(#[from] ActivityError),

    #[error("invalid workflow arguments: {0}")]
    InvalidArgs(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_throttling_network_and_upsert_are_retryable() {
        assert!(ActivityError::RateLimited {
            message: "429".to_owned(),
            retry_after: None
        }
        .is_retryable());
        assert!(ActivityError::TransientNetwork("reset".to_owned()).is_retryable());
        assert!(ActivityError::Upsert("500".to_owned()).is_retryable());

        assert!(!ActivityError::Auth("401".to_owned()).is_retryable());
        assert!(!ActivityError::NotFound("page".to_owned()).is_retryable());
        assert!(!ActivityError::InvalidDocument("400".to_owned()).is_retryable());
        assert!(!ActivityError::Config("missing key".to_owned()).is_retryable());
        assert!(!ActivityError::Internal("db".to_owned()).is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let err = ActivityError::RateLimited {
            message: "429".to_owned(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(ActivityError::Upsert("x".to_owned()).retry_after(), None);
    }

    #[test]
    fn dust_errors_keep_their_class() {
        assert!(matches!(
            ActivityError::from(DustError::NotFound("connector".to_owned())),
            ActivityError::NotFound(_)
        ));
        assert!(matches!(
            ActivityError::from(DustError::Database("timeout".to_owned())),
            ActivityError::Internal(_)
        ));
    }
}
