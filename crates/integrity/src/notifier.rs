use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;
use trade_ledger_types::{IntegrityAlert, RunCounts, RunId, RunMode, Severity};

/// Summary handed to the notifier after a run that raised new alerts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunNotice {
    pub run_id: RunId,
    pub mode: RunMode,
    pub counts: RunCounts,
    pub new_alerts: Vec<IntegrityAlert>,
}

impl RunNotice {
    pub fn critical_count(&self) -> usize {
        self.new_alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count()
    }

    /// One-line subject for the notice
    pub fn subject(&self) -> String {
        format!(
            "{} new integrity alert(s) from {} run {} ({} critical)",
            self.new_alerts.len(),
            self.mode,
            self.run_id,
            self.critical_count()
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for run notices
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, notice: &RunNotice) -> Result<(), NotifyError>;
}

/// Writes notices to the log
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    recipients: Vec<String>,
}

impl TracingNotifier {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, notice: &RunNotice) -> Result<(), NotifyError> {
        warn!(
            run_id = %notice.run_id,
            mode = %notice.mode,
            alerts = notice.new_alerts.len(),
            critical = notice.critical_count(),
            recipients = ?self.recipients,
            "{}",
            notice.subject()
        );
        for alert in &notice.new_alerts {
            warn!(
                alert_id = %alert.id,
                document_id = %alert.document_id,
                alert_type = %alert.alert_type,
                severity = %alert.severity,
                detail = %alert.detail,
                "Integrity alert raised"
            );
        }
        Ok(())
    }
}

/// Keeps every notice in memory; optionally fails each delivery
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<RunNotice>>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<RunNotice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, notice: &RunNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .map_err(|_| NotifyError("notice buffer poisoned".to_string()))?
            .push(notice.clone());
        if self.failing {
            return Err(NotifyError("mail relay refused connection".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trade_ledger_types::{AlertId, AlertType, DocumentId, NewAlert};

    fn notice() -> RunNotice {
        let alert = |id, alert_type: AlertType| {
            NewAlert {
                document_id: DocumentId(id),
                alert_type,
                severity: alert_type.severity(),
                detail: "x".into(),
                created_at: 0,
            }
            .into_alert(AlertId(id))
        };
        RunNotice {
            run_id: RunId::new(),
            mode: RunMode::FullSweep,
            counts: RunCounts::default(),
            new_alerts: vec![
                alert(1, AlertType::HashMismatch),
                alert(2, AlertType::FileMissing),
            ],
        }
    }

    #[test]
    fn test_subject() {
        let notice = notice();
        assert_eq!(notice.critical_count(), 1);
        assert!(notice.subject().starts_with("2 new integrity alert(s) from full_sweep run"));
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(&notice()).await.unwrap();
        assert_eq!(notifier.notices().len(), 1);

        let failing = RecordingNotifier::failing();
        assert!(failing.notify(&notice()).await.is_err());
        assert_eq!(failing.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_tracing_notifier_never_fails() {
        let notifier = TracingNotifier::new(vec!["ops@example.com".into()]);
        assert!(notifier.notify(&notice()).await.is_ok());
    }
}
