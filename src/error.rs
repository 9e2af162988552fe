use thiserror::Error;
use trade_ledger_engine::{FlowError, LedgerError, RegistryError, StoreError};
use trade_ledger_integrity::{AlertError, SchedulerError};

/// Any failure surfaced by [`crate::TradeLedger`]
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Stable machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::Flow(e) => e.reason(),
            ServiceError::Registry(e) => match e {
                RegistryError::NotFound(_) => "not_found",
                RegistryError::DuplicateDocNumber(_) => "duplicate_doc_number",
                RegistryError::InvalidInput(_) | RegistryError::Invariant(_) => "invalid_input",
                RegistryError::Content(_) => "content_unavailable",
                RegistryError::Store(_) => "store_error",
            },
            ServiceError::Ledger(LedgerError::NotFound(_)) => "not_found",
            ServiceError::Ledger(LedgerError::Store(_)) => "store_error",
            ServiceError::Alert(e) => e.reason(),
            ServiceError::Scheduler(e) => e.reason(),
            ServiceError::Store(StoreError::NotFound(_)) => "not_found",
            ServiceError::Store(_) => "store_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.reason() == "not_found"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_passes_through() {
        let err = ServiceError::from(FlowError::Unauthorized("buyer may not ISSUE_LOC".into()));
        assert_eq!(err.reason(), "unauthorized");

        let err = ServiceError::from(RegistryError::DuplicateDocNumber("PO-1".into()));
        assert_eq!(err.reason(), "duplicate_doc_number");

        let err = ServiceError::from(LedgerError::NotFound("document 9".into()));
        assert!(err.is_not_found());
    }
}
