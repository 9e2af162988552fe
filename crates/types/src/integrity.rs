use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AlertId, CheckId, DocumentId, RunId, Timestamp, UnknownVariant, UserId};

/// Outcome of one hash-recompute-and-compare pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityStatus {
    Ok,
    Mismatch,
    Missing,
}

impl IntegrityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityStatus::Ok => "OK",
            IntegrityStatus::Mismatch => "MISMATCH",
            IntegrityStatus::Missing => "MISSING",
        }
    }

    /// Alert raised for a failing status, `None` for `Ok`
    pub fn alert_type(&self) -> Option<AlertType> {
        match self {
            IntegrityStatus::Ok => None,
            IntegrityStatus::Mismatch => Some(AlertType::HashMismatch),
            IntegrityStatus::Missing => Some(AlertType::FileMissing),
        }
    }
}

impl fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrityStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(IntegrityStatus::Ok),
            "MISMATCH" => Ok(IntegrityStatus::Mismatch),
            "MISSING" => Ok(IntegrityStatus::Missing),
            other => Err(UnknownVariant::new("integrity_status", other)),
        }
    }
}

/// Result of a single integrity check; never mutated once persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheckResult {
    pub id: CheckId,
    pub document_id: DocumentId,
    pub run_id: Option<RunId>,
    pub status: IntegrityStatus,
    pub stored_hash: Option<String>,
    pub computed_hash: Option<String>,
    pub detail: String,
    pub checked_at: Timestamp,
    /// Whether this check created the alert.
    ///
    /// False for a finding deduplicated against an alert that is still open,
    /// so `false` does not mean no alert is open for the document.
    pub alert_raised: bool,
}

/// Verifier output before persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub document_id: DocumentId,
    pub status: IntegrityStatus,
    pub stored_hash: Option<String>,
    pub computed_hash: Option<String>,
    pub detail: String,
    pub checked_at: Timestamp,
}

impl CheckOutcome {
    pub fn into_result(self, id: CheckId, run_id: Option<RunId>, alert_raised: bool) -> IntegrityCheckResult {
        IntegrityCheckResult {
            id,
            document_id: self.document_id,
            run_id,
            status: self.status,
            stored_hash: self.stored_hash,
            computed_hash: self.computed_hash,
            detail: self.detail,
            checked_at: self.checked_at,
            alert_raised,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HashMismatch,
    FileMissing,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HashMismatch => "hash_mismatch",
            AlertType::FileMissing => "file_missing",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AlertType::HashMismatch => Severity::Critical,
            AlertType::FileMissing => Severity::High,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash_mismatch" => Ok(AlertType::HashMismatch),
            "file_missing" => Ok(AlertType::FileMissing),
            other => Err(UnknownVariant::new("alert_type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(UnknownVariant::new("severity", other)),
        }
    }
}

/// Persisted, resolvable record of a failed integrity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityAlert {
    pub id: AlertId,
    pub document_id: DocumentId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub detail: String,
    pub resolved: bool,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Alert candidate handed to the store alongside a failing check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub document_id: DocumentId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub detail: String,
    pub created_at: Timestamp,
}

impl NewAlert {
    pub fn into_alert(self, id: AlertId) -> IntegrityAlert {
        IntegrityAlert {
            id,
            document_id: self.document_id,
            alert_type: self.alert_type,
            severity: self.severity,
            detail: self.detail,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: self.created_at,
        }
    }
}

/// What the store did with a recorded check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReceipt {
    pub result: IntegrityCheckResult,
    /// Newly created alert, if any
    pub created_alert: Option<IntegrityAlert>,
    /// Unresolved alert that suppressed a duplicate, if any
    pub existing_alert: Option<AlertId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckFilter {
    pub document_id: Option<DocumentId>,
    pub status: Option<IntegrityStatus>,
}

impl CheckFilter {
    pub fn matches(&self, result: &IntegrityCheckResult) -> bool {
        self.document_id.map_or(true, |d| d == result.document_id)
            && self.status.map_or(true, |s| s == result.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub resolved: Option<bool>,
    pub severity: Option<Severity>,
    pub document_id: Option<DocumentId>,
}

impl AlertFilter {
    pub fn unresolved() -> Self {
        Self {
            resolved: Some(false),
            ..Default::default()
        }
    }

    pub fn matches(&self, alert: &IntegrityAlert) -> bool {
        self.resolved.map_or(true, |r| r == alert.resolved)
            && self.severity.map_or(true, |s| s == alert.severity)
            && self.document_id.map_or(true, |d| d == alert.document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_to_alert_mapping() {
        assert_eq!(IntegrityStatus::Ok.alert_type(), None);
        assert_eq!(
            IntegrityStatus::Mismatch.alert_type(),
            Some(AlertType::HashMismatch)
        );
        assert_eq!(
            IntegrityStatus::Missing.alert_type(),
            Some(AlertType::FileMissing)
        );
        assert_eq!(AlertType::HashMismatch.severity(), Severity::Critical);
        assert_eq!(AlertType::FileMissing.severity(), Severity::High);
    }

    #[test]
    fn test_alert_filter() {
        let alert = NewAlert {
            document_id: DocumentId(4),
            alert_type: AlertType::FileMissing,
            severity: Severity::High,
            detail: "gone".into(),
            created_at: 1,
        }
        .into_alert(AlertId(1));

        assert!(AlertFilter::unresolved().matches(&alert));
        assert!(!AlertFilter {
            severity: Some(Severity::Critical),
            ..Default::default()
        }
        .matches(&alert));
        assert!(!AlertFilter {
            document_id: Some(DocumentId(5)),
            ..Default::default()
        }
        .matches(&alert));
    }
}
