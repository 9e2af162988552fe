use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{DocType, DocumentId, Timestamp, TransactionId, UnknownVariant, UserId};

/// Status of a trade transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    InProgress,
    Completed,
    Disputed,
    Cancelled,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 5] = [
        TransactionStatus::Pending,
        TransactionStatus::InProgress,
        TransactionStatus::Completed,
        TransactionStatus::Disputed,
        TransactionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::InProgress => "IN_PROGRESS",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Disputed => "DISPUTED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    /// No further transitions are accepted out of a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("transaction_status", s))
    }
}

/// Documents produced by each workflow step, filled as the steps happen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSlots {
    pub po: Option<DocumentId>,
    pub loc: Option<DocumentId>,
    pub bol: Option<DocumentId>,
    pub invoice: Option<DocumentId>,
}

impl WorkflowSlots {
    pub fn get(&self, doc_type: DocType) -> Option<DocumentId> {
        match doc_type {
            DocType::Po => self.po,
            DocType::Loc => self.loc,
            DocType::BillOfLading => self.bol,
            DocType::Invoice => self.invoice,
            DocType::Coo | DocType::InsuranceCert => None,
        }
    }

    /// Fill the slot for `doc_type`; returns false for types with no slot
    pub fn set(&mut self, doc_type: DocType, id: DocumentId) -> bool {
        let slot = match doc_type {
            DocType::Po => &mut self.po,
            DocType::Loc => &mut self.loc,
            DocType::BillOfLading => &mut self.bol,
            DocType::Invoice => &mut self.invoice,
            DocType::Coo | DocType::InsuranceCert => return false,
        };
        *slot = Some(id);
        true
    }

    pub fn documents(&self) -> impl Iterator<Item = DocumentId> {
        [self.po, self.loc, self.bol, self.invoice].into_iter().flatten()
    }
}

/// Persisted trade transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub slots: WorkflowSlots,
    /// Bumped on every accepted transition; used for optimistic concurrency
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Transaction {
    pub fn is_party(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }
}

/// Transaction row to be inserted; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: Timestamp,
}

impl NewTransaction {
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            amount: self.amount,
            currency: self.currency,
            status: TransactionStatus::Pending,
            slots: WorkflowSlots::default(),
            version: 0,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Currency codes are three uppercase ASCII letters, e.g. `USD`
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
