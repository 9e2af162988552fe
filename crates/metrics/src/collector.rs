use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use trade_ledger_types::{AlertType, IntegrityStatus, LedgerAction, RunMode, RunSummary};

const NAMESPACE: &str = "trade_ledger";

/// Metrics collector for the trade ledger; every metric lives in its own registry
pub struct MetricsCollector {
    registry: Registry,

    // Trade flow
    transitions_accepted: IntCounterVec,
    transitions_rejected: IntCounterVec,

    // Integrity checks
    checks: IntCounterVec,
    check_failures: IntCounterVec,
    check_duration: HistogramVec,
    alerts_created: IntCounterVec,
    alerts_resolved: IntCounter,

    // Runs
    runs: IntCounterVec,
    run_duration: HistogramVec,
    active_runs: IntGauge,

    errors: IntCounterVec,
}

impl MetricsCollector {
    /// Create a collector with a fresh registry
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_registry(Registry::new())
    }

    /// Create a collector registering into `registry`
    pub fn with_registry(registry: Registry) -> Result<Self, MetricsError> {
        let transitions_accepted = IntCounterVec::new(
            opts("transitions_accepted_total", "Trade actions accepted, by action"),
            &["action"],
        )?;
        let transitions_rejected = IntCounterVec::new(
            opts("transitions_rejected_total", "Trade actions rejected, by action and reason"),
            &["action", "reason"],
        )?;
        let checks = IntCounterVec::new(
            opts("integrity_checks_total", "Integrity checks recorded, by run mode and outcome"),
            &["mode", "status"],
        )?;
        let check_failures = IntCounterVec::new(
            opts("integrity_check_failures_total", "Checks that could not complete, by run mode"),
            &["mode"],
        )?;
        let check_duration = HistogramVec::new(
            HistogramOpts::new("integrity_check_duration_ms", "Time to fetch and hash one document")
                .namespace(NAMESPACE)
                .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0]),
            &["mode"],
        )?;
        let alerts_created = IntCounterVec::new(
            opts("integrity_alerts_created_total", "Alerts raised, by type"),
            &["alert_type"],
        )?;
        let alerts_resolved = IntCounter::with_opts(opts(
            "integrity_alerts_resolved_total",
            "Alerts resolved by an operator",
        ))?;
        let runs = IntCounterVec::new(
            opts("integrity_runs_total", "Finished integrity runs, by mode and final state"),
            &["mode", "state"],
        )?;
        let run_duration = HistogramVec::new(
            HistogramOpts::new("integrity_run_duration_seconds", "Wall time of an integrity run")
                .namespace(NAMESPACE)
                .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0]),
            &["mode"],
        )?;
        let active_runs = IntGauge::with_opts(opts(
            "integrity_runs_active",
            "Integrity runs currently executing",
        ))?;
        let errors = IntCounterVec::new(
            opts("errors_total", "Error-level log events, by target"),
            &["target"],
        )?;

        registry.register(Box::new(transitions_accepted.clone()))?;
        registry.register(Box::new(transitions_rejected.clone()))?;
        registry.register(Box::new(checks.clone()))?;
        registry.register(Box::new(check_failures.clone()))?;
        registry.register(Box::new(check_duration.clone()))?;
        registry.register(Box::new(alerts_created.clone()))?;
        registry.register(Box::new(alerts_resolved.clone()))?;
        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;
        registry.register(Box::new(active_runs.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            transitions_accepted,
            transitions_rejected,
            checks,
            check_failures,
            check_duration,
            alerts_created,
            alerts_resolved,
            runs,
            run_duration,
            active_runs,
            errors,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRADE FLOW METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_transition(&self, action: LedgerAction) {
        self.transitions_accepted
            .with_label_values(&[action.as_str()])
            .inc();
    }

    pub fn record_rejection(&self, action: LedgerAction, reason: &str) {
        self.transitions_rejected
            .with_label_values(&[action.as_str(), reason])
            .inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTEGRITY METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_check(&self, mode: RunMode, status: IntegrityStatus, duration: Duration) {
        self.checks
            .with_label_values(&[mode.as_str(), status.as_str()])
            .inc();
        self.check_duration
            .with_label_values(&[mode.as_str()])
            .observe(duration.as_secs_f64() * 1000.0);
    }

    pub fn record_check_failure(&self, mode: RunMode) {
        self.check_failures.with_label_values(&[mode.as_str()]).inc();
    }

    pub fn record_alert_created(&self, alert_type: AlertType) {
        self.alerts_created
            .with_label_values(&[alert_type.as_str()])
            .inc();
    }

    pub fn record_alert_resolved(&self) {
        self.alerts_resolved.inc();
    }

    pub fn record_run_started(&self) {
        self.active_runs.inc();
    }

    pub fn record_run_finished(&self, summary: &RunSummary, duration: Duration) {
        self.active_runs.dec();
        self.runs
            .with_label_values(&[summary.mode.as_str(), summary.state.as_str()])
            .inc();
        self.run_duration
            .with_label_values(&[summary.mode.as_str()])
            .observe(duration.as_secs_f64());
    }

    pub fn record_error(&self, target: &str) {
        self.errors.with_label_values(&[target]).inc();
    }

    pub fn active_runs(&self) -> i64 {
        self.active_runs.get()
    }

    /// Render every metric in the Prometheus text format
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE)
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
    #[error("registry error: {0}")]
    RegistryError(String),
}

impl From<prometheus::Error> for MetricsError {
    fn from(err: prometheus::Error) -> Self {
        MetricsError::RegistryError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trade_ledger_types::{RunId, RunState};

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().unwrap();
        assert!(collector.export_metrics().is_ok());
    }

    #[test]
    fn test_collectors_do_not_share_state() {
        let a = MetricsCollector::new().unwrap();
        let b = MetricsCollector::new().unwrap();
        a.record_alert_resolved();
        assert!(a.export_metrics().unwrap().contains("trade_ledger_integrity_alerts_resolved_total 1"));
        assert!(b.export_metrics().unwrap().contains("trade_ledger_integrity_alerts_resolved_total 0"));
    }

    #[test]
    fn test_record_check_metrics() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_check(RunMode::FullSweep, IntegrityStatus::Mismatch, Duration::from_millis(12));
        collector.record_check_failure(RunMode::Incremental);
        collector.record_alert_created(AlertType::HashMismatch);

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("trade_ledger_integrity_checks_total"));
        assert!(metrics.contains("status=\"MISMATCH\""));
        assert!(metrics.contains("trade_ledger_integrity_check_duration_ms"));
        assert!(metrics.contains("alert_type=\"hash_mismatch\""));
    }

    #[test]
    fn test_run_gauge() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_run_started();
        assert_eq!(collector.active_runs(), 1);

        let mut summary = RunSummary::started(RunId::new(), RunMode::Incremental, 0);
        summary.state = RunState::Completed;
        collector.record_run_finished(&summary, Duration::from_secs(2));
        assert_eq!(collector.active_runs(), 0);
        assert!(collector
            .export_metrics()
            .unwrap()
            .contains("state=\"completed\""));
    }

    #[test]
    fn test_transition_metrics() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_transition(LedgerAction::CreatePo);
        collector.record_rejection(LedgerAction::IssueLoc, "unauthorized");
        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("action=\"CREATE_PO\""));
        assert!(metrics.contains("reason=\"unauthorized\""));
    }
}
