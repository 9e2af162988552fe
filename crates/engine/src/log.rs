use std::sync::Arc;
use tracing::debug;
use trade_ledger_types::{
    unix_now, DocumentId, LedgerAction, LedgerEntry, LedgerQuery, Metadata, NewLedgerEntry,
    Principal, TransactionId,
};

use crate::error::LedgerError;
use crate::store::{LedgerStore, TransitionCommit, TransitionReceipt};

/// Default and maximum explorer page sizes
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// Append-only history of accepted transitions.
///
/// Every write to the ledger goes through here; entries are never updated
/// or deleted and sequences are never reused.
pub struct LedgerLog<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> Clone for LedgerLog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: LedgerStore> LedgerLog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a single entry against an existing document
    pub async fn append(
        &self,
        document_id: DocumentId,
        actor: Principal,
        action: LedgerAction,
        metadata: Metadata,
    ) -> Result<LedgerEntry, LedgerError> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("document {document_id}")))?;

        let entry = self
            .store
            .append_entry(NewLedgerEntry {
                document_id,
                transaction_id: doc.transaction_id,
                actor_id: actor.id,
                actor_role: actor.role,
                action,
                metadata,
                timestamp: unix_now(),
            })
            .await?;
        debug!(sequence = entry.sequence, action = %action, "Ledger entry appended");
        Ok(entry)
    }

    /// Commit a transition together with its ledger entry
    pub async fn record_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<TransitionReceipt, LedgerError> {
        let receipt = self.store.commit_transition(commit).await?;
        debug!(
            sequence = receipt.entry.sequence,
            action = %receipt.entry.action,
            transaction_id = %receipt.transaction.id,
            "Transition recorded"
        );
        Ok(receipt)
    }

    /// History of one document, oldest first
    pub async fn entries_for(&self, document_id: DocumentId) -> Result<Vec<LedgerEntry>, LedgerError> {
        if self.store.get_document(document_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!("document {document_id}")));
        }
        Ok(self.store.entries_for_document(document_id).await?)
    }

    /// History of a whole transaction across its documents, oldest first
    pub async fn entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if self.store.get_transaction(transaction_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!("transaction {transaction_id}")));
        }
        Ok(self.store.entries_for_transaction(transaction_id).await?)
    }

    /// Explorer page, newest first. `limit` is clamped to [`MAX_PAGE_SIZE`].
    pub async fn explore(
        &self,
        query: &LedgerQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        Ok(self.store.query_entries(query, limit, offset).await?)
    }
}
