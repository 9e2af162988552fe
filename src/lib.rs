//! Trade-document ledger service
//!
//! [`TradeLedger`] ties the pieces together: the document registry, the
//! role-gated trade flow with its append-only ledger, and scheduled content
//! integrity verification with deduplicated alerts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trade_ledger::TradeLedger;
//! use trade_ledger_engine::{InMemoryContentStore, SqliteStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::new("ledger.db").await?);
//! let ledger = TradeLedger::builder(store, Arc::new(InMemoryContentStore::new())).build();
//! let handle = ledger.trigger_full_sweep().await?;
//! let summary = ledger.wait_for_run(handle).await?;
//! println!("{} documents checked", summary.counts.processed());
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
mod error;

pub use error::ServiceError;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use trade_ledger_engine::{
    ActionTarget, ContentStore, CreateDocument, DocumentRegistry, LedgerStore, StoreStats,
    TradeAction, TradeFlowEngine, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use trade_ledger_integrity::{
    AlertNotifier, IntegrityScheduler, IntegrityVerifier, RunHandle, RunScope, SchedulerConfig,
    TracingNotifier, DEFAULT_FETCH_TIMEOUT,
};
use trade_ledger_metrics::MetricsCollector;
use trade_ledger_types::{
    AlertFilter, AlertId, Attachment, CheckFilter, Document, DocumentFilter, DocumentId,
    IntegrityAlert, IntegrityCheckResult, LedgerEntry, LedgerQuery, Principal, RunSummary,
    Transaction, TransactionId,
};

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Overview counts for the integrity dashboard
pub type IntegritySummary = StoreStats;

/// Service facade over one store and one content store
pub struct TradeLedger<S: LedgerStore + 'static> {
    store: Arc<S>,
    registry: DocumentRegistry<S>,
    flow: TradeFlowEngine<S>,
    scheduler: Arc<IntegrityScheduler<S>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<S: LedgerStore + 'static> TradeLedger<S> {
    pub fn builder(store: Arc<S>, content: Arc<dyn ContentStore>) -> TradeLedgerBuilder<S> {
        TradeLedgerBuilder {
            store,
            content,
            scheduler: SchedulerConfig::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            notifier: Arc::new(TracingNotifier::default()),
            metrics: None,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<IntegrityScheduler<S>> {
        &self.scheduler
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DOCUMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Store bytes and register a standalone or workflow document for them
    pub async fn upload_document(&self, req: CreateDocument, bytes: &[u8]) -> Result<Document> {
        Ok(self.registry.upload(req, bytes).await?)
    }

    pub async fn register_document(&self, req: CreateDocument) -> Result<Document> {
        let id = self.registry.create(req).await?;
        Ok(self.registry.get(id).await?)
    }

    /// Store bytes to be attached to a workflow step
    pub async fn attach(&self, bytes: &[u8]) -> Result<Attachment> {
        Ok(self.registry.attach(bytes).await?)
    }

    pub async fn document(&self, id: DocumentId) -> Result<Document> {
        Ok(self.registry.get(id).await?)
    }

    pub async fn documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        Ok(self.registry.list(filter).await?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRADE FLOW & LEDGER
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply one workflow step and return the ledger entry it produced
    pub async fn perform_action(
        &self,
        target: ActionTarget,
        action: TradeAction,
        actor: Principal,
    ) -> Result<LedgerEntry> {
        let kind = action.kind();
        match self.flow.perform(target, action, actor).await {
            Ok(receipt) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_transition(kind);
                }
                Ok(receipt.entry)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejection(kind, e.reason());
                }
                Err(e.into())
            }
        }
    }

    pub async fn transaction(&self, id: TransactionId) -> Result<Transaction> {
        Ok(self.flow.transaction(id).await?)
    }

    /// Ledger history of one document, oldest first
    pub async fn document_timeline(&self, id: DocumentId) -> Result<Vec<LedgerEntry>> {
        Ok(self.flow.ledger().entries_for(id).await?)
    }

    /// Ledger history across a transaction's documents, oldest first
    pub async fn transaction_timeline(&self, id: TransactionId) -> Result<Vec<LedgerEntry>> {
        Ok(self.flow.ledger().entries_for_transaction(id).await?)
    }

    /// Ledger explorer page, newest first; `None` uses the default page size
    pub async fn explore_ledger(
        &self,
        query: &LedgerQuery,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        Ok(self.flow.ledger().explore(query, limit, offset).await?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTEGRITY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start a check of `doc_ids`, or an incremental run when empty
    pub async fn trigger_check(&self, doc_ids: Vec<DocumentId>) -> Result<RunHandle> {
        let scope = if doc_ids.is_empty() {
            RunScope::Incremental
        } else {
            RunScope::explicit(doc_ids)
        };
        let handle = self.scheduler.trigger(scope).await?;
        info!(run_id = %handle.run_id, mode = %handle.mode, "Integrity check triggered");
        Ok(handle)
    }

    pub async fn trigger_full_sweep(&self) -> Result<RunHandle> {
        let handle = self.scheduler.trigger(RunScope::FullSweep).await?;
        info!(run_id = %handle.run_id, "Full sweep triggered");
        Ok(handle)
    }

    /// Check `doc_ids` (incremental when empty) and wait for the result
    pub async fn check_now(&self, doc_ids: Vec<DocumentId>) -> Result<RunSummary> {
        let scope = if doc_ids.is_empty() {
            RunScope::Incremental
        } else {
            RunScope::explicit(doc_ids)
        };
        Ok(self.scheduler.run(scope).await?)
    }

    pub async fn run_full_sweep(&self) -> Result<RunSummary> {
        Ok(self.scheduler.run(RunScope::FullSweep).await?)
    }

    /// State and counts of a run, live while it executes
    pub async fn run_status(&self, handle: RunHandle) -> Result<RunSummary> {
        Ok(self.scheduler.status(handle).await?)
    }

    pub async fn wait_for_run(&self, handle: RunHandle) -> Result<RunSummary> {
        Ok(self.scheduler.wait(handle).await?)
    }

    /// Returns false when the run had already finished
    pub async fn cancel_run(&self, handle: RunHandle) -> Result<bool> {
        Ok(self.scheduler.cancel(handle).await?)
    }

    /// Check history, newest first
    pub async fn list_logs(
        &self,
        filter: &CheckFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<IntegrityCheckResult>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(self.scheduler.alerts().checks(filter, limit, offset).await?)
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<IntegrityAlert>> {
        Ok(self.scheduler.alerts().list(filter).await?)
    }

    pub async fn resolve_alert(&self, id: AlertId, actor: Principal) -> Result<IntegrityAlert> {
        Ok(self.scheduler.alerts().resolve(id, actor).await?)
    }

    pub async fn integrity_summary(&self) -> Result<IntegritySummary> {
        Ok(self.store.stats().await?)
    }

    /// Stop accepting runs and cancel active ones
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

pub struct TradeLedgerBuilder<S: LedgerStore + 'static> {
    store: Arc<S>,
    content: Arc<dyn ContentStore>,
    scheduler: SchedulerConfig,
    fetch_timeout: Duration,
    notifier: Arc<dyn AlertNotifier>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<S: LedgerStore + 'static> TradeLedgerBuilder<S> {
    pub fn scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> TradeLedger<S> {
        let verifier = IntegrityVerifier::with_timeout(self.content.clone(), self.fetch_timeout);
        let mut scheduler = IntegrityScheduler::new(self.store.clone(), verifier, self.scheduler)
            .with_notifier(self.notifier);
        if let Some(metrics) = &self.metrics {
            scheduler = scheduler.with_metrics(metrics.clone());
        }

        TradeLedger {
            registry: DocumentRegistry::new(self.store.clone(), self.content),
            flow: TradeFlowEngine::new(self.store.clone()),
            scheduler: Arc::new(scheduler),
            store: self.store,
            metrics: self.metrics,
        }
    }
}
