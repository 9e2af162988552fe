use thiserror::Error;
use trade_ledger_types::{AlertId, ContentRef, DocumentInvariantError, TransactionId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate document number: {0}")]
    DuplicateDocNumber(String),

    #[error("transaction {transaction_id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        transaction_id: TransactionId,
        expected: u64,
        actual: u64,
    },

    #[error("alert {0} is already resolved")]
    AlreadyResolved(AlertId),

    /// A persisted row breaks a model invariant
    #[error("stored data violates invariant: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

impl From<DocumentInvariantError> for StoreError {
    fn from(err: DocumentInvariantError) -> Self {
        StoreError::Invariant(err.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ContentError {
    #[error("no content at {0}")]
    NotFound(ContentRef),

    #[error("content store unavailable: {0}")]
    Unavailable(String),

    #[error("content ref {0} is not served by this store")]
    ForeignRef(ContentRef),

    #[error("content store I/O error: {0}")]
    Io(String),
}

impl ContentError {
    /// Worth retrying; the bytes may still be there
    pub fn is_transient(&self) -> bool {
        matches!(self, ContentError::Unavailable(_) | ContentError::Io(_))
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("duplicate document number: {0}")]
    DuplicateDocNumber(String),

    #[error("invalid document: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Invariant(#[from] DocumentInvariantError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => RegistryError::NotFound(what),
            StoreError::DuplicateDocNumber(n) => RegistryError::DuplicateDocNumber(n),
            other => RegistryError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            other => LedgerError::Store(other),
        }
    }
}

/// Rejection of a trade action. Nothing is written when one is returned.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate document number: {0}")]
    DuplicateDocNumber(String),

    #[error(transparent)]
    Store(StoreError),
}

impl FlowError {
    /// Stable machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            FlowError::Unauthorized(_) => "unauthorized",
            FlowError::InvalidTransition(_) => "invalid_transition",
            FlowError::NotFound(_) => "not_found",
            FlowError::InvalidInput(_) => "invalid_input",
            FlowError::DuplicateDocNumber(_) => "duplicate_doc_number",
            FlowError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for FlowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => FlowError::NotFound(what),
            StoreError::DuplicateDocNumber(n) => FlowError::DuplicateDocNumber(n),
            StoreError::VersionConflict { transaction_id, .. } => FlowError::InvalidTransition(
                format!("transaction {transaction_id} was advanced by a concurrent action"),
            ),
            other => FlowError::Store(other),
        }
    }
}

impl From<LedgerError> for FlowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(what) => FlowError::NotFound(what),
            LedgerError::Store(e) => FlowError::from(e),
        }
    }
}
