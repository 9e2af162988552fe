use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use trade_ledger_types::{
    ledger_order, AlertFilter, AlertId, Attachment, CheckFilter, CheckId, CheckOutcome,
    CheckReceipt, DocType, Document, DocumentFilter, DocumentId, DocumentStatus,
    IntegrityAlert, IntegrityCheckResult, LedgerAction, LedgerEntry, LedgerQuery, Metadata,
    NewAlert, NewDocument, NewLedgerEntry, NewTransaction, Principal, RunId, RunSummary,
    Severity, Timestamp, Transaction, TransactionId, TransactionStatus, UserId,
};

use crate::error::StoreError;

// ═══════════════════════════════════════════════════════════════════════════
// TRANSITION COMMIT
// ═══════════════════════════════════════════════════════════════════════════

/// How a transition touches its transaction row
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionChange {
    /// Insert a fresh PENDING transaction
    Open(NewTransaction),
    /// Move an existing transaction, guarded by its version
    Advance {
        id: TransactionId,
        expected_version: u64,
        status: TransactionStatus,
    },
}

/// Document produced by a workflow step; the store links it to the transaction
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDocument {
    pub doc_type: DocType,
    pub doc_number: String,
    pub owner_id: UserId,
    pub attachment: Option<Attachment>,
    pub status: DocumentStatus,
}

/// Document a pending ledger entry is recorded against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTarget {
    Existing(DocumentId),
    /// The document created by the same commit
    Created,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub target: EntryTarget,
    pub actor: Principal,
    pub action: LedgerAction,
    pub metadata: Metadata,
}

/// Everything one accepted transition writes. Applied all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionCommit {
    pub transaction: TransactionChange,
    pub created_document: Option<FlowDocument>,
    pub document_status: Vec<(DocumentId, DocumentStatus)>,
    pub entry: PendingEntry,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionReceipt {
    pub transaction: Transaction,
    pub created_document: Option<Document>,
    pub entry: LedgerEntry,
}

/// A listed row that could not be decoded into a valid document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptDocument {
    pub id: DocumentId,
    pub reason: String,
}

/// Aggregate counts backing the integrity dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_documents: u64,
    pub documents_with_content: u64,
    pub total_alerts: u64,
    pub unresolved_alerts: u64,
    pub critical_unresolved_alerts: u64,
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Durable storage for documents, transactions, ledger entries and integrity records
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a document; the doc number must be unique within its transaction
    async fn insert_document(&self, doc: NewDocument) -> Result<Document, StoreError>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// Documents matching `filter`, ascending by id
    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError>;

    /// Like [`LedgerStore::list_documents`], but a row that breaks a document
    /// invariant comes back as its own [`CorruptDocument`] instead of failing
    /// the whole listing.
    async fn scan_documents(
        &self,
        filter: &DocumentFilter,
    ) -> Result<Vec<Result<Document, CorruptDocument>>, StoreError> {
        Ok(self.list_documents(filter).await?.into_iter().map(Ok).collect())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Apply a transition atomically
    ///
    /// Fails with [`StoreError::VersionConflict`] when the transaction moved
    /// since it was read; nothing is written in that case.
    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<TransitionReceipt, StoreError>;

    /// Append a standalone ledger entry
    async fn append_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// Entries for a document, oldest first
    async fn entries_for_document(&self, id: DocumentId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Entries for every document of a transaction, oldest first
    async fn entries_for_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Ledger explorer page, newest first
    async fn query_entries(
        &self,
        query: &LedgerQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Persist a check result and, if `alert` is set, raise it unless an
    /// unresolved alert of the same type already exists for the document.
    async fn record_check(
        &self,
        outcome: CheckOutcome,
        run_id: Option<RunId>,
        alert: Option<NewAlert>,
    ) -> Result<CheckReceipt, StoreError>;

    /// Check history page, newest first
    async fn list_checks(
        &self,
        filter: &CheckFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IntegrityCheckResult>, StoreError>;

    async fn get_alert(&self, id: AlertId) -> Result<Option<IntegrityAlert>, StoreError>;

    /// Alerts matching `filter`, newest first
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<IntegrityAlert>, StoreError>;

    /// Mark an alert resolved; fails if it is already resolved
    async fn resolve_alert(
        &self,
        id: AlertId,
        resolved_by: UserId,
        resolved_at: Timestamp,
    ) -> Result<IntegrityAlert, StoreError>;

    /// Insert or replace a run summary
    async fn save_run(&self, run: &RunSummary) -> Result<(), StoreError>;

    async fn get_run(&self, id: RunId) -> Result<Option<RunSummary>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Tables {
    documents: BTreeMap<DocumentId, Document>,
    transactions: BTreeMap<TransactionId, Transaction>,
    entries: Vec<LedgerEntry>,
    checks: Vec<IntegrityCheckResult>,
    alerts: BTreeMap<AlertId, IntegrityAlert>,
    runs: HashMap<RunId, RunSummary>,
    next_document: i64,
    next_transaction: i64,
    next_sequence: u64,
    next_check: i64,
    next_alert: i64,
}

impl Tables {
    fn doc_number_taken(&self, scope: Option<TransactionId>, doc_number: &str) -> bool {
        self.documents
            .values()
            .any(|d| d.transaction_id == scope && d.doc_number == doc_number)
    }

    fn insert_document(&mut self, doc: NewDocument) -> Document {
        self.next_document += 1;
        let doc = doc.into_document(DocumentId(self.next_document));
        self.documents.insert(doc.id, doc.clone());
        doc
    }

    fn push_entry(&mut self, entry: NewLedgerEntry) -> LedgerEntry {
        self.next_sequence += 1;
        let entry = entry.into_entry(self.next_sequence);
        self.entries.push(entry.clone());
        entry
    }

    fn open_alert(&self, document_id: DocumentId, alert: &NewAlert) -> Option<AlertId> {
        self.alerts
            .values()
            .find(|a| !a.resolved && a.document_id == document_id && a.alert_type == alert.alert_type)
            .map(|a| a.id)
    }
}

/// Single-lock store; every trait method runs under one guard so compound
/// writes are atomic
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::DatabaseError("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::DatabaseError("store lock poisoned".to_string()))
    }

    /// Overwrite a stored document (for testing)
    pub fn replace_document(&self, doc: Document) -> Result<(), StoreError> {
        self.write()?.documents.insert(doc.id, doc);
        Ok(())
    }

    /// Number of ledger entries (for testing)
    pub fn entry_count(&self) -> usize {
        self.read().map(|t| t.entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn insert_document(&self, doc: NewDocument) -> Result<Document, StoreError> {
        let mut tables = self.write()?;
        if tables.doc_number_taken(doc.transaction_id, &doc.doc_number) {
            return Err(StoreError::DuplicateDocNumber(doc.doc_number));
        }
        if let Some(tx) = doc.transaction_id {
            if !tables.transactions.contains_key(&tx) {
                return Err(StoreError::NotFound(format!("transaction {tx}")));
            }
        }
        Ok(tables.insert_document(doc))
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.read()?.documents.get(&id).cloned())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.read()?.transactions.get(&id).cloned())
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<TransitionReceipt, StoreError> {
        let mut tables = self.write()?;

        // Validate everything before the first write
        let tx_id = match &commit.transaction {
            TransactionChange::Open(_) => TransactionId(tables.next_transaction + 1),
            TransactionChange::Advance {
                id,
                expected_version,
                ..
            } => {
                let current = tables
                    .transactions
                    .get(id)
                    .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?;
                if current.version != *expected_version {
                    return Err(StoreError::VersionConflict {
                        transaction_id: *id,
                        expected: *expected_version,
                        actual: current.version,
                    });
                }
                *id
            }
        };
        if let Some(doc) = &commit.created_document {
            if tables.doc_number_taken(Some(tx_id), &doc.doc_number) {
                return Err(StoreError::DuplicateDocNumber(doc.doc_number.clone()));
            }
        }
        for (id, _) in &commit.document_status {
            if !tables.documents.contains_key(id) {
                return Err(StoreError::NotFound(format!("document {id}")));
            }
        }
        match commit.entry.target {
            EntryTarget::Existing(id) if !tables.documents.contains_key(&id) => {
                return Err(StoreError::NotFound(format!("document {id}")));
            }
            EntryTarget::Created if commit.created_document.is_none() => {
                return Err(StoreError::Invariant(
                    "ledger entry targets a document the commit does not create".to_string(),
                ));
            }
            _ => {}
        }

        let mut transaction = match commit.transaction {
            TransactionChange::Open(new_tx) => {
                tables.next_transaction += 1;
                new_tx.into_transaction(tx_id)
            }
            TransactionChange::Advance { id, status, .. } => {
                let mut tx = tables.transactions[&id].clone();
                tx.status = status;
                tx.version += 1;
                tx.updated_at = commit.timestamp;
                tx
            }
        };

        let created_document = commit.created_document.map(|doc| {
            let created = tables.insert_document(NewDocument {
                doc_type: doc.doc_type,
                doc_number: doc.doc_number,
                owner_id: doc.owner_id,
                transaction_id: Some(tx_id),
                attachment: doc.attachment,
                status: doc.status,
                created_at: commit.timestamp,
            });
            transaction.slots.set(created.doc_type, created.id);
            created
        });
        tables.transactions.insert(tx_id, transaction.clone());

        for (id, status) in commit.document_status {
            if let Some(doc) = tables.documents.get_mut(&id) {
                doc.status = status;
            }
        }

        let document_id = match (commit.entry.target, &created_document) {
            (EntryTarget::Existing(id), _) => id,
            (EntryTarget::Created, Some(doc)) => doc.id,
            (EntryTarget::Created, None) => unreachable!("validated above"),
        };
        let entry = tables.push_entry(NewLedgerEntry {
            document_id,
            transaction_id: Some(tx_id),
            actor_id: commit.entry.actor.id,
            actor_role: commit.entry.actor.role,
            action: commit.entry.action,
            metadata: commit.entry.metadata,
            timestamp: commit.timestamp,
        });

        Ok(TransitionReceipt {
            transaction,
            created_document,
            entry,
        })
    }

    async fn append_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let mut tables = self.write()?;
        if !tables.documents.contains_key(&entry.document_id) {
            return Err(StoreError::NotFound(format!("document {}", entry.document_id)));
        }
        Ok(tables.push_entry(entry))
    }

    async fn entries_for_document(&self, id: DocumentId) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .read()?
            .entries
            .iter()
            .filter(|e| e.document_id == id)
            .cloned()
            .collect();
        entries.sort_by(ledger_order);
        Ok(entries)
    }

    async fn entries_for_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .read()?
            .entries
            .iter()
            .filter(|e| e.transaction_id == Some(id))
            .cloned()
            .collect();
        entries.sort_by(ledger_order);
        Ok(entries)
    }

    async fn query_entries(
        &self,
        query: &LedgerQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .read()?
            .entries
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| ledger_order(b, a));
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    async fn record_check(
        &self,
        outcome: CheckOutcome,
        run_id: Option<RunId>,
        alert: Option<NewAlert>,
    ) -> Result<CheckReceipt, StoreError> {
        let mut tables = self.write()?;
        let document_id = outcome.document_id;

        let mut created_alert = None;
        let mut existing_alert = None;
        if let Some(alert) = alert {
            match tables.open_alert(document_id, &alert) {
                Some(id) => existing_alert = Some(id),
                None => {
                    tables.next_alert += 1;
                    let alert = alert.into_alert(AlertId(tables.next_alert));
                    tables.alerts.insert(alert.id, alert.clone());
                    created_alert = Some(alert);
                }
            }
        }

        tables.next_check += 1;
        let result = outcome.into_result(
            CheckId(tables.next_check),
            run_id,
            created_alert.is_some(),
        );
        tables.checks.push(result.clone());

        Ok(CheckReceipt {
            result,
            created_alert,
            existing_alert,
        })
    }

    async fn list_checks(
        &self,
        filter: &CheckFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IntegrityCheckResult>, StoreError> {
        let mut checks: Vec<_> = self
            .read()?
            .checks
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        checks.sort_by(|a, b| b.checked_at.cmp(&a.checked_at).then(b.id.cmp(&a.id)));
        Ok(checks.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<IntegrityAlert>, StoreError> {
        Ok(self.read()?.alerts.get(&id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<IntegrityAlert>, StoreError> {
        let mut alerts: Vec<_> = self
            .read()?
            .alerts
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    async fn resolve_alert(
        &self,
        id: AlertId,
        resolved_by: UserId,
        resolved_at: Timestamp,
    ) -> Result<IntegrityAlert, StoreError> {
        let mut tables = self.write()?;
        let alert = tables
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?;
        if alert.resolved {
            return Err(StoreError::AlreadyResolved(id));
        }
        alert.resolved = true;
        alert.resolved_by = Some(resolved_by);
        alert.resolved_at = Some(resolved_at);
        Ok(alert.clone())
    }

    async fn save_run(&self, run: &RunSummary) -> Result<(), StoreError> {
        self.write()?.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<RunSummary>, StoreError> {
        Ok(self.read()?.runs.get(&id).cloned())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let tables = self.read()?;
        let unresolved = tables.alerts.values().filter(|a| !a.resolved);
        Ok(StoreStats {
            total_documents: tables.documents.len() as u64,
            documents_with_content: tables.documents.values().filter(|d| d.has_content()).count()
                as u64,
            total_alerts: tables.alerts.len() as u64,
            unresolved_alerts: unresolved.clone().count() as u64,
            critical_unresolved_alerts: unresolved
                .filter(|a| a.severity == Severity::Critical)
                .count() as u64,
        })
    }
}
