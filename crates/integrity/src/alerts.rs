use std::sync::Arc;
use tracing::{info, warn};
use trade_ledger_engine::LedgerStore;
use trade_ledger_metrics::MetricsCollector;
use trade_ledger_types::{
    unix_now, AlertFilter, AlertId, CheckFilter, CheckOutcome, CheckReceipt, IntegrityAlert,
    IntegrityCheckResult, NewAlert, Principal, RunId,
};

use crate::error::AlertError;

/// Turns check outcomes into persisted results and deduplicated alerts
pub struct AlertManager<S: LedgerStore> {
    store: Arc<S>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<S: LedgerStore> Clone for AlertManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: LedgerStore> AlertManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Persist `outcome` and raise an alert for a failing status.
    ///
    /// The store suppresses the alert when an unresolved one of the same type
    /// is already open for the document; the check result is kept either way.
    pub async fn record(
        &self,
        outcome: CheckOutcome,
        run_id: Option<RunId>,
    ) -> Result<CheckReceipt, AlertError> {
        let alert = outcome.status.alert_type().map(|alert_type| NewAlert {
            document_id: outcome.document_id,
            alert_type,
            severity: alert_type.severity(),
            detail: outcome.detail.clone(),
            created_at: outcome.checked_at,
        });

        let receipt = self.store.record_check(outcome, run_id, alert).await?;

        if let Some(alert) = &receipt.created_alert {
            warn!(
                alert_id = %alert.id,
                document_id = %alert.document_id,
                alert_type = %alert.alert_type,
                severity = %alert.severity,
                "Integrity alert created"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_alert_created(alert.alert_type);
            }
        } else if let Some(existing) = receipt.existing_alert {
            info!(
                document_id = %receipt.result.document_id,
                alert_id = %existing,
                "Alert already open, check recorded without a new alert"
            );
        }

        Ok(receipt)
    }

    /// Close an alert on behalf of an admin or auditor
    pub async fn resolve(&self, id: AlertId, actor: Principal) -> Result<IntegrityAlert, AlertError> {
        if self.store.get_alert(id).await?.is_none() {
            return Err(AlertError::NotFound(id));
        }
        if !actor.role.can_resolve_alerts() {
            return Err(AlertError::Unauthorized(actor.role));
        }

        let alert = self.store.resolve_alert(id, actor.id, unix_now()).await?;
        info!(alert_id = %id, resolved_by = %actor.id, "Integrity alert resolved");
        if let Some(metrics) = &self.metrics {
            metrics.record_alert_resolved();
        }
        Ok(alert)
    }

    pub async fn get(&self, id: AlertId) -> Result<IntegrityAlert, AlertError> {
        self.store
            .get_alert(id)
            .await?
            .ok_or(AlertError::NotFound(id))
    }

    /// Alerts matching `filter`, newest first
    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<IntegrityAlert>, AlertError> {
        Ok(self.store.list_alerts(filter).await?)
    }

    /// Check history page, newest first
    pub async fn checks(
        &self,
        filter: &CheckFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IntegrityCheckResult>, AlertError> {
        Ok(self.store.list_checks(filter, limit, offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trade_ledger_engine::InMemoryStore;
    use trade_ledger_types::{AlertType, DocumentId, IntegrityStatus, Severity};

    fn outcome(status: IntegrityStatus) -> CheckOutcome {
        CheckOutcome {
            document_id: DocumentId(5),
            status,
            stored_hash: Some("aa".into()),
            computed_hash: Some("bb".into()),
            detail: "stored hash aa does not match computed hash bb".into(),
            checked_at: 100,
        }
    }

    fn manager() -> (AlertManager<InMemoryStore>, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let manager = AlertManager::new(Arc::new(InMemoryStore::new())).with_metrics(metrics.clone());
        (manager, metrics)
    }

    #[tokio::test]
    async fn test_ok_records_check_only() {
        let (manager, _) = manager();
        let receipt = manager.record(outcome(IntegrityStatus::Ok), None).await.unwrap();
        assert!(receipt.created_alert.is_none());
        assert!(!receipt.result.alert_raised);
        assert!(manager.list(&AlertFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatch_raises_critical_once() {
        let (manager, metrics) = manager();
        let first = manager.record(outcome(IntegrityStatus::Mismatch), None).await.unwrap();
        let alert = first.created_alert.unwrap();
        assert_eq!(alert.alert_type, AlertType::HashMismatch);
        assert_eq!(alert.severity, Severity::Critical);

        let second = manager.record(outcome(IntegrityStatus::Mismatch), None).await.unwrap();
        assert!(second.created_alert.is_none());
        assert_eq!(second.existing_alert, Some(alert.id));

        assert_eq!(manager.list(&AlertFilter::unresolved()).await.unwrap().len(), 1);
        assert_eq!(
            manager
                .checks(&CheckFilter::default(), 10, 0)
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(metrics
            .export_metrics()
            .unwrap()
            .contains("trade_ledger_integrity_alerts_created_total{alert_type=\"hash_mismatch\"} 1"));
    }

    #[tokio::test]
    async fn test_missing_raises_high() {
        let (manager, _) = manager();
        let receipt = manager.record(outcome(IntegrityStatus::Missing), None).await.unwrap();
        assert_eq!(receipt.created_alert.unwrap().severity, Severity::High);
    }

    #[tokio::test]
    async fn test_resolve_rules() {
        let (manager, _) = manager();
        let alert = manager
            .record(outcome(IntegrityStatus::Mismatch), None)
            .await
            .unwrap()
            .created_alert
            .unwrap();

        assert!(matches!(
            manager.resolve(AlertId(999), Principal::admin(1)).await,
            Err(AlertError::NotFound(_))
        ));
        assert!(matches!(
            manager.resolve(alert.id, Principal::buyer(2)).await,
            Err(AlertError::Unauthorized(_))
        ));

        let resolved = manager.resolve(alert.id, Principal::auditor(3)).await.unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by.map(|u| u.get()), Some(3));

        assert!(matches!(
            manager.resolve(alert.id, Principal::admin(1)).await,
            Err(AlertError::AlreadyResolved(_))
        ));

        // A fresh failure after resolution opens a new alert
        let again = manager.record(outcome(IntegrityStatus::Mismatch), None).await.unwrap();
        assert!(again.created_alert.is_some());
    }
}
