use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};
use trade_ledger_engine::{LedgerStore, StoreError};
use trade_ledger_metrics::{MetricsCollector, RunSpan};
use trade_ledger_retry::{PoolError, Retried, RetryError, RetryPolicy, WorkerPool};
use trade_ledger_types::{
    unix_now, CheckReceipt, Document, DocumentFilter, DocumentId, IntegrityAlert, RunFailure,
    RunId, RunMode, RunState, RunSummary,
};

use crate::alerts::AlertManager;
use crate::error::{SchedulerError, VerifyError};
use crate::notifier::{AlertNotifier, RunNotice, TracingNotifier};
use crate::verifier::IntegrityVerifier;

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub incremental_interval_secs: u64,
    pub full_sweep_interval_secs: u64,
    /// Incremental runs cover documents created this far back
    pub incremental_window_secs: u64,
    /// Concurrent document checks across all runs
    pub max_workers: u32,
    pub incremental_retry: RetryPolicy,
    pub full_sweep_retry: RetryPolicy,
    pub on_demand_retry: RetryPolicy,
}

impl SchedulerConfig {
    pub fn retry_for(&self, mode: RunMode) -> RetryPolicy {
        match mode {
            RunMode::Incremental => self.incremental_retry,
            RunMode::FullSweep => self.full_sweep_retry,
            RunMode::OnDemand => self.on_demand_retry,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            incremental_interval_secs: 3600,
            full_sweep_interval_secs: 86400,
            incremental_window_secs: 86400,
            max_workers: 8,
            incremental_retry: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(10)),
            full_sweep_retry: RetryPolicy::new(2, Duration::from_millis(500), Duration::from_secs(10)),
            on_demand_retry: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(10)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RUN TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Which documents a run covers; at most one run per scope is active
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunScope {
    Incremental,
    FullSweep,
    Explicit(BTreeSet<DocumentId>),
}

impl RunScope {
    pub fn explicit(ids: impl IntoIterator<Item = DocumentId>) -> Self {
        RunScope::Explicit(ids.into_iter().collect())
    }

    pub fn mode(&self) -> RunMode {
        match self {
            RunScope::Incremental => RunMode::Incremental,
            RunScope::FullSweep => RunMode::FullSweep,
            RunScope::Explicit(_) => RunMode::OnDemand,
        }
    }
}

/// Reference to a triggered run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: RunId,
    pub mode: RunMode,
}

struct ActiveRun {
    handle: RunHandle,
    scope: RunScope,
    cancelled: AtomicBool,
    summary: Mutex<RunSummary>,
    done: watch::Sender<Option<RunSummary>>,
}

impl ActiveRun {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn summary(&self) -> MutexGuard<'_, RunSummary> {
        self.summary.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Targets {
    documents: Vec<Document>,
    unresolved: Vec<RunFailure>,
}

enum DocResult {
    Checked(CheckReceipt),
    Failed(RunFailure),
    /// Not started because the run was cancelled or the pool closed
    Skipped,
}

/// Serialises all work on one document across concurrent runs
#[derive(Default)]
struct DocumentLocks {
    inner: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    async fn lock(&self, id: DocumentId) -> OwnedMutexGuard<()> {
        let mutex = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the entry once nobody holds or waits on it
    fn release(&self, id: DocumentId) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(&id).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(&id);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════

/// Runs integrity checks over document sets, periodically or on demand
pub struct IntegrityScheduler<S: LedgerStore> {
    store: Arc<S>,
    verifier: IntegrityVerifier,
    alerts: AlertManager<S>,
    notifier: Arc<dyn AlertNotifier>,
    metrics: Option<Arc<MetricsCollector>>,
    config: SchedulerConfig,
    pool: WorkerPool,
    locks: DocumentLocks,
    active: Mutex<Vec<Arc<ActiveRun>>>,
    closed: AtomicBool,
}

impl<S: LedgerStore + 'static> IntegrityScheduler<S> {
    pub fn new(store: Arc<S>, verifier: IntegrityVerifier, config: SchedulerConfig) -> Self {
        Self {
            alerts: AlertManager::new(store.clone()),
            store,
            verifier,
            notifier: Arc::new(TracingNotifier::default()),
            metrics: None,
            pool: WorkerPool::new(config.max_workers),
            config,
            locks: DocumentLocks::default(),
            active: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.alerts = self.alerts.clone().with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn alerts(&self) -> &AlertManager<S> {
        &self.alerts
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Start a run in the background; joins the active run if the scope is busy
    pub async fn trigger(self: &Arc<Self>, scope: RunScope) -> Result<RunHandle, SchedulerError> {
        let (run, targets) = match self.begin(scope).await? {
            Begin::Joined(handle) => return Ok(handle),
            Begin::Started(run, targets) => (run, targets),
        };

        let handle = run.handle;
        let this = self.clone();
        let span = RunSpan::new(handle.run_id, handle.mode).span();
        tokio::spawn(async move { this.execute(run, targets).await }.instrument(span));
        Ok(handle)
    }

    /// Run to completion, or wait for the active run of the same scope
    pub async fn run(&self, scope: RunScope) -> Result<RunSummary, SchedulerError> {
        match self.begin(scope).await? {
            Begin::Joined(handle) => self.wait(handle).await,
            Begin::Started(run, targets) => {
                let span = RunSpan::new(run.handle.run_id, run.handle.mode).span();
                Ok(self.execute(run, targets).instrument(span).await)
            }
        }
    }

    /// Wait until the run has finished and return its final summary
    pub async fn wait(&self, handle: RunHandle) -> Result<RunSummary, SchedulerError> {
        if let Some(run) = self.find(|r| r.handle.run_id == handle.run_id) {
            let mut done = run.done.subscribe();
            drop(run);
            if let Ok(summary) = done.wait_for(Option::is_some).await {
                if let Some(summary) = summary.clone() {
                    return Ok(summary);
                }
            };
        }
        self.stored_run(handle.run_id).await
    }

    /// Live summary of an active run, or the persisted one once finished
    pub async fn status(&self, handle: RunHandle) -> Result<RunSummary, SchedulerError> {
        if let Some(run) = self.find(|r| r.handle.run_id == handle.run_id) {
            return Ok(run.summary().clone());
        }
        self.stored_run(handle.run_id).await
    }

    /// Ask a run to stop before its next document.
    ///
    /// Returns false when the run had already finished.
    pub async fn cancel(&self, handle: RunHandle) -> Result<bool, SchedulerError> {
        if let Some(run) = self.find(|r| r.handle.run_id == handle.run_id) {
            run.cancelled.store(true, Ordering::SeqCst);
            info!(run_id = %handle.run_id, "Integrity run cancellation requested");
            return Ok(true);
        }
        self.stored_run(handle.run_id).await.map(|_| false)
    }

    pub fn active_runs(&self) -> Vec<RunHandle> {
        self.lock_active().iter().map(|r| r.handle).collect()
    }

    /// Refuse new runs and cancel the active ones
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for run in self.lock_active().iter() {
            run.cancelled.store(true, Ordering::SeqCst);
        }
        self.pool.close();
        info!("Integrity scheduler shut down");
    }

    /// Spawn the incremental and full-sweep loops; they exit when `shutdown` flips to true
    pub fn spawn_periodic(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_loop(
                RunScope::Incremental,
                Duration::from_secs(self.config.incremental_interval_secs),
                shutdown.clone(),
            ),
            self.spawn_loop(
                RunScope::FullSweep,
                Duration::from_secs(self.config.full_sweep_interval_secs),
                shutdown,
            ),
        ]
    }

    fn spawn_loop(
        self: &Arc<Self>,
        scope: RunScope,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mode = scope.mode();
            let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;
            info!(%mode, period_secs = period.as_secs(), "Integrity schedule started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match this.run(scope.clone()).await {
                            Ok(summary) => debug!(run_id = %summary.id, %mode, "Scheduled run finished"),
                            Err(SchedulerError::ShutDown) => break,
                            Err(e) => error!(%mode, error = %e, "Scheduled integrity run failed to start"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(%mode, "Integrity schedule stopped");
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RUN EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    async fn begin(&self, scope: RunScope) -> Result<Begin, SchedulerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown);
        }
        if matches!(&scope, RunScope::Explicit(ids) if ids.is_empty()) {
            return Err(SchedulerError::EmptyScope);
        }
        if let Some(run) = self.find(|r| r.scope == scope) {
            return Ok(Begin::Joined(run.handle));
        }

        let targets = self.resolve(&scope).await?;

        let mut active = self.lock_active();
        if let Some(run) = active.iter().find(|r| r.scope == scope) {
            return Ok(Begin::Joined(run.handle));
        }
        let handle = RunHandle {
            run_id: RunId::new(),
            mode: scope.mode(),
        };
        let (done, _) = watch::channel(None);
        let run = Arc::new(ActiveRun {
            handle,
            scope,
            cancelled: AtomicBool::new(false),
            summary: Mutex::new(RunSummary::started(handle.run_id, handle.mode, unix_now())),
            done,
        });
        active.push(run.clone());
        Ok(Begin::Started(run, targets))
    }

    async fn resolve(&self, scope: &RunScope) -> Result<Targets, SchedulerError> {
        let filter = match scope {
            RunScope::Incremental => DocumentFilter::with_content()
                .created_since(unix_now().saturating_sub(self.config.incremental_window_secs)),
            RunScope::FullSweep => DocumentFilter::with_content(),
            RunScope::Explicit(ids) => return self.resolve_explicit(ids).await,
        };
        let mut targets = Targets {
            documents: Vec::new(),
            unresolved: Vec::new(),
        };
        for scanned in self.store.scan_documents(&filter).await? {
            match scanned {
                Ok(doc) => targets.documents.push(doc),
                Err(corrupt) => {
                    error!(
                        document_id = %corrupt.id,
                        error = %corrupt.reason,
                        "Document violates its content invariant"
                    );
                    targets.unresolved.push(RunFailure {
                        document_id: corrupt.id,
                        reason: corrupt.reason,
                        attempts: 0,
                    });
                }
            }
        }
        Ok(targets)
    }

    async fn resolve_explicit(&self, ids: &BTreeSet<DocumentId>) -> Result<Targets, SchedulerError> {
        let mut targets = Targets {
            documents: Vec::with_capacity(ids.len()),
            unresolved: Vec::new(),
        };
        for &id in ids {
            match self.store.get_document(id).await {
                Ok(Some(doc)) => targets.documents.push(doc),
                Ok(None) => targets.unresolved.push(RunFailure {
                    document_id: id,
                    reason: "document not found".to_string(),
                    attempts: 0,
                }),
                Err(StoreError::Invariant(msg)) => {
                    error!(document_id = %id, error = %msg, "Document violates its content invariant");
                    targets.unresolved.push(RunFailure {
                        document_id: id,
                        reason: msg,
                        attempts: 0,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(targets)
    }

    async fn execute(&self, run: Arc<ActiveRun>, targets: Targets) -> RunSummary {
        let started = Instant::now();
        let handle = run.handle;
        let policy = self.config.retry_for(handle.mode);

        let snapshot = {
            let mut summary = run.summary();
            summary.counts.total = (targets.documents.len() + targets.unresolved.len()) as u64;
            for failure in targets.unresolved {
                summary.counts.record_failure();
                summary.failures.push(failure);
            }
            summary.clone()
        };
        self.persist(&snapshot).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_run_started();
        }
        info!(total = snapshot.counts.total, "Integrity run started");

        let mut pending: FuturesUnordered<_> = targets
            .documents
            .into_iter()
            .map(|doc| self.process(&run, doc, policy))
            .collect();

        let mut new_alerts: Vec<IntegrityAlert> = Vec::new();
        while let Some(result) = pending.next().await {
            let mut summary = run.summary();
            match result {
                DocResult::Checked(receipt) => {
                    summary
                        .counts
                        .record_status(receipt.result.status, receipt.created_alert.is_some());
                    new_alerts.extend(receipt.created_alert);
                }
                DocResult::Failed(failure) => {
                    summary.counts.record_failure();
                    summary.failures.push(failure);
                }
                DocResult::Skipped => {}
            }
        }
        drop(pending);

        let summary = {
            let mut summary = run.summary();
            summary.state = if run.is_cancelled() {
                RunState::Cancelled
            } else {
                RunState::Completed
            };
            summary.finished_at = Some(unix_now());
            summary.clone()
        };
        self.persist(&summary).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_run_finished(&summary, started.elapsed());
        }

        let counts = summary.counts;
        info!(
            state = %summary.state,
            total = counts.total,
            ok = counts.ok,
            mismatch = counts.mismatch,
            missing = counts.missing,
            failed = counts.failed,
            alerts_created = counts.alerts_created,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Integrity run finished"
        );

        if !new_alerts.is_empty() {
            let notice = RunNotice {
                run_id: handle.run_id,
                mode: handle.mode,
                counts,
                new_alerts,
            };
            if let Err(e) = self.notifier.notify(&notice).await {
                warn!(error = %e, "Alert notification failed");
            }
        }

        self.lock_active().retain(|r| r.handle.run_id != handle.run_id);
        run.done.send_replace(Some(summary.clone()));
        summary
    }

    async fn process(&self, run: &ActiveRun, doc: Document, policy: RetryPolicy) -> DocResult {
        if run.is_cancelled() {
            return DocResult::Skipped;
        }
        match self.pool.submit(self.check_document(run, doc, policy)).await {
            Ok(result) => result,
            Err(PoolError::Closed) => DocResult::Skipped,
        }
    }

    async fn check_document(&self, run: &ActiveRun, doc: Document, policy: RetryPolicy) -> DocResult {
        // Waiting for a worker slot may have outlasted the run
        if run.is_cancelled() {
            return DocResult::Skipped;
        }

        let document_id = doc.id;
        let mode = run.handle.mode;
        let guard = self.locks.lock(document_id).await;
        let started = Instant::now();

        let checked = policy
            .run(
                |attempt| {
                    debug!(%document_id, attempt, "Checking document");
                    self.verifier.check(&doc)
                },
                VerifyError::is_transient,
            )
            .await;

        let result = match checked {
            Ok(Retried { value, attempts }) => {
                match self.alerts.record(value, Some(run.handle.run_id)).await {
                    Ok(receipt) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_check(mode, receipt.result.status, started.elapsed());
                        }
                        DocResult::Checked(receipt)
                    }
                    Err(e) => {
                        error!(%document_id, error = %e, "Failed to record integrity check");
                        DocResult::Failed(RunFailure {
                            document_id,
                            reason: e.to_string(),
                            attempts,
                        })
                    }
                }
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(%document_id, attempts, error = %last, "Giving up on document after retries");
                DocResult::Failed(RunFailure {
                    document_id,
                    reason: last.to_string(),
                    attempts,
                })
            }
            Err(RetryError::Permanent { attempts, error }) => {
                error!(%document_id, reason = error.reason(), error = %error, "Integrity check failed permanently");
                DocResult::Failed(RunFailure {
                    document_id,
                    reason: error.to_string(),
                    attempts,
                })
            }
        };

        if matches!(result, DocResult::Failed(_)) {
            if let Some(metrics) = &self.metrics {
                metrics.record_check_failure(mode);
            }
        }

        drop(guard);
        self.locks.release(document_id);
        result
    }

    async fn persist(&self, summary: &RunSummary) {
        if let Err(e) = self.store.save_run(summary).await {
            error!(run_id = %summary.id, error = %e, "Failed to persist integrity run");
        }
    }

    async fn stored_run(&self, run_id: RunId) -> Result<RunSummary, SchedulerError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| SchedulerError::RunNotFound(run_id.to_string()))
    }

    fn find(&self, pred: impl Fn(&ActiveRun) -> bool) -> Option<Arc<ActiveRun>> {
        self.lock_active().iter().find(|r| pred(r)).cloned()
    }

    fn lock_active(&self) -> MutexGuard<'_, Vec<Arc<ActiveRun>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Begin {
    Joined(RunHandle),
    Started(Arc<ActiveRun>, Targets),
}
