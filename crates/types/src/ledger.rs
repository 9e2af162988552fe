use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{DocumentId, Role, Timestamp, TransactionId, UnknownVariant, UserId};

/// Opaque key/value details attached to a ledger entry
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Lifecycle verbs recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAction {
    CreatePo,
    IssueLoc,
    Verify,
    UploadBol,
    IssueInvoice,
    MarkReceived,
    PayInvoice,
    Dispute,
    Resolve,
}

impl LedgerAction {
    pub const ALL: [LedgerAction; 9] = [
        LedgerAction::CreatePo,
        LedgerAction::IssueLoc,
        LedgerAction::Verify,
        LedgerAction::UploadBol,
        LedgerAction::IssueInvoice,
        LedgerAction::MarkReceived,
        LedgerAction::PayInvoice,
        LedgerAction::Dispute,
        LedgerAction::Resolve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAction::CreatePo => "CREATE_PO",
            LedgerAction::IssueLoc => "ISSUE_LOC",
            LedgerAction::Verify => "VERIFY",
            LedgerAction::UploadBol => "UPLOAD_BOL",
            LedgerAction::IssueInvoice => "ISSUE_INVOICE",
            LedgerAction::MarkReceived => "MARK_RECEIVED",
            LedgerAction::PayInvoice => "PAY_INVOICE",
            LedgerAction::Dispute => "DISPUTE",
            LedgerAction::Resolve => "RESOLVE",
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LedgerAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("ledger_action", s))
    }
}

/// One immutable record of an accepted transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-assigned, strictly increasing and never reused
    pub sequence: u64,
    pub document_id: DocumentId,
    pub transaction_id: Option<TransactionId>,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub action: LedgerAction,
    pub metadata: Metadata,
    pub timestamp: Timestamp,
}

/// Entry to be appended; the store assigns the sequence
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub document_id: DocumentId,
    pub transaction_id: Option<TransactionId>,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub action: LedgerAction,
    pub metadata: Metadata,
    pub timestamp: Timestamp,
}

impl NewLedgerEntry {
    pub fn into_entry(self, sequence: u64) -> LedgerEntry {
        LedgerEntry {
            sequence,
            document_id: self.document_id,
            transaction_id: self.transaction_id,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            action: self.action,
            metadata: self.metadata,
            timestamp: self.timestamp,
        }
    }
}

/// Ledger explorer query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerQuery {
    pub action: Option<LedgerAction>,
    pub actor_id: Option<UserId>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl LedgerQuery {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.action.map_or(true, |a| a == entry.action)
            && self.actor_id.map_or(true, |a| a == entry.actor_id)
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
    }
}

/// Total order used for every ledger read: timestamp, then sequence
pub fn ledger_order(a: &LedgerEntry, b: &LedgerEntry) -> std::cmp::Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.sequence.cmp(&b.sequence))
}
