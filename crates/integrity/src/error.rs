use std::time::Duration;
use thiserror::Error;
use trade_ledger_engine::{ContentError, StoreError};
use trade_ledger_types::{AlertId, Role};

/// Why a single check could not produce an outcome
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("content fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Retrying cannot help; the document or its reference is broken
    #[error("integrity check failed: {0}")]
    Fatal(String),
}

impl VerifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VerifyError::Transient(_) | VerifyError::Timeout(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::Transient(_) => "content_unavailable",
            VerifyError::Timeout(_) => "content_timeout",
            VerifyError::Fatal(_) => "integrity_invariant",
        }
    }
}

impl From<ContentError> for VerifyError {
    fn from(err: ContentError) -> Self {
        if err.is_transient() {
            VerifyError::Transient(err.to_string())
        } else {
            VerifyError::Fatal(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert not found: {0}")]
    NotFound(AlertId),

    #[error("alert {0} is already resolved")]
    AlreadyResolved(AlertId),

    #[error("role {0} may not resolve alerts")]
    Unauthorized(Role),

    #[error(transparent)]
    Store(StoreError),
}

impl AlertError {
    pub fn reason(&self) -> &'static str {
        match self {
            AlertError::NotFound(_) => "not_found",
            AlertError::AlreadyResolved(_) => "already_resolved",
            AlertError::Unauthorized(_) => "unauthorized",
            AlertError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for AlertError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyResolved(id) => AlertError::AlreadyResolved(id),
            other => AlertError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("no documents given for an on-demand run")]
    EmptyScope,

    #[error("scheduler is shut down")]
    ShutDown,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulerError {
    pub fn reason(&self) -> &'static str {
        match self {
            SchedulerError::RunNotFound(_) => "not_found",
            SchedulerError::EmptyScope => "invalid_input",
            SchedulerError::ShutDown => "unavailable",
            SchedulerError::Store(_) => "store_error",
        }
    }
}
