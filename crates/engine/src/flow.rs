use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use trade_ledger_types::{
    is_currency_code, unix_now, Attachment, DocType, Document, DocumentId, DocumentStatus,
    LedgerAction, Metadata, NewTransaction, Principal, Role, Transaction,
    TransactionId, UserId,
};

use crate::error::FlowError;
use crate::log::LedgerLog;
use crate::rules::{rule_for, PartyRequirement, Requirement, TransitionRule};
use crate::store::{
    EntryTarget, FlowDocument, LedgerStore, PendingEntry, TransactionChange, TransitionCommit,
    TransitionReceipt,
};

// ═══════════════════════════════════════════════════════════════════════════
// ACTIONS
// ═══════════════════════════════════════════════════════════════════════════

/// What an action is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTarget {
    /// CREATE_PO opens a transaction
    NewTransaction,
    Transaction(TransactionId),
    /// Any document of the transaction
    Document(DocumentId),
}

/// A workflow step with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    CreatePo {
        seller_id: UserId,
        amount: Decimal,
        currency: String,
        doc_number: String,
        attachment: Option<Attachment>,
    },
    IssueLoc {
        doc_number: String,
        attachment: Option<Attachment>,
    },
    Verify,
    UploadBol {
        doc_number: String,
        tracking_id: Option<String>,
        attachment: Option<Attachment>,
    },
    IssueInvoice {
        doc_number: String,
        amount: Option<Decimal>,
        attachment: Option<Attachment>,
    },
    MarkReceived,
    PayInvoice,
    Dispute {
        reason: String,
    },
    Resolve {
        resolution: String,
    },
}

impl TradeAction {
    pub fn kind(&self) -> LedgerAction {
        match self {
            TradeAction::CreatePo { .. } => LedgerAction::CreatePo,
            TradeAction::IssueLoc { .. } => LedgerAction::IssueLoc,
            TradeAction::Verify => LedgerAction::Verify,
            TradeAction::UploadBol { .. } => LedgerAction::UploadBol,
            TradeAction::IssueInvoice { .. } => LedgerAction::IssueInvoice,
            TradeAction::MarkReceived => LedgerAction::MarkReceived,
            TradeAction::PayInvoice => LedgerAction::PayInvoice,
            TradeAction::Dispute { .. } => LedgerAction::Dispute,
            TradeAction::Resolve { .. } => LedgerAction::Resolve,
        }
    }

    /// Number and file of the document this step creates
    fn produced(&self) -> Option<(&str, Option<&Attachment>)> {
        match self {
            TradeAction::CreatePo {
                doc_number,
                attachment,
                ..
            }
            | TradeAction::IssueLoc {
                doc_number,
                attachment,
            }
            | TradeAction::UploadBol {
                doc_number,
                attachment,
                ..
            }
            | TradeAction::IssueInvoice {
                doc_number,
                attachment,
                ..
            } => Some((doc_number.as_str(), attachment.as_ref())),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TRADE FLOW ENGINE
// ═══════════════════════════════════════════════════════════════════════════

/// Role-gated state machine over transactions and their documents.
///
/// The only component that changes transaction or document status. Each
/// accepted action commits its status changes and exactly one ledger entry
/// in a single store transaction; a rejected action writes nothing.
pub struct TradeFlowEngine<S: LedgerStore> {
    store: Arc<S>,
    ledger: LedgerLog<S>,
}

impl<S: LedgerStore> TradeFlowEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        let ledger = LedgerLog::new(store.clone());
        Self { store, ledger }
    }

    pub fn ledger(&self) -> &LedgerLog<S> {
        &self.ledger
    }

    pub async fn transaction(&self, id: TransactionId) -> Result<Transaction, FlowError> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("transaction {id}")))
    }

    /// Validate and apply one action
    pub async fn perform(
        &self,
        target: ActionTarget,
        action: TradeAction,
        actor: Principal,
    ) -> Result<TransitionReceipt, FlowError> {
        let kind = action.kind();
        let result = self.try_perform(target, action, actor).await;
        match &result {
            Ok(receipt) => info!(
                action = %kind,
                actor_id = %actor.id,
                actor_role = %actor.role,
                transaction_id = %receipt.transaction.id,
                status = %receipt.transaction.status,
                sequence = receipt.entry.sequence,
                "Trade action accepted"
            ),
            Err(e) => warn!(
                action = %kind,
                actor_id = %actor.id,
                actor_role = %actor.role,
                reason = e.reason(),
                error = %e,
                "Trade action rejected"
            ),
        }
        result
    }

    async fn try_perform(
        &self,
        target: ActionTarget,
        action: TradeAction,
        actor: Principal,
    ) -> Result<TransitionReceipt, FlowError> {
        let rule = rule_for(action.kind());
        if !rule.permits(actor.role) {
            return Err(FlowError::Unauthorized(format!(
                "role {} may not perform {}",
                actor.role, rule.action
            )));
        }

        if rule.opens_transaction() {
            return match target {
                ActionTarget::NewTransaction => self.open_transaction(&rule, action, actor).await,
                _ => Err(FlowError::InvalidTransition(format!(
                    "{} opens a new transaction",
                    rule.action
                ))),
            };
        }

        let tx = self.resolve_target(target).await?;
        check_party(&rule, &tx, actor)?;
        if !rule.accepts(tx.status) {
            return Err(FlowError::InvalidTransition(format!(
                "{} not allowed while transaction {} is {}",
                rule.action, tx.id, tx.status
            )));
        }
        for requirement in rule.requires {
            match *requirement {
                Requirement::Present(doc_type) if tx.slots.get(doc_type).is_none() => {
                    return Err(FlowError::InvalidTransition(format!(
                        "{} requires a {doc_type} on transaction {}",
                        rule.action, tx.id
                    )));
                }
                Requirement::Absent(doc_type) if tx.slots.get(doc_type).is_some() => {
                    return Err(FlowError::InvalidTransition(format!(
                        "transaction {} already has a {doc_type}",
                        tx.id
                    )));
                }
                _ => {}
            }
        }

        let plan = self.plan_step(&rule, &action, &tx).await?;
        let created_document = match (rule.creates, action.produced()) {
            (Some(doc_type), Some((doc_number, attachment))) => Some(FlowDocument {
                doc_type,
                doc_number: validate_doc_number(doc_number)?,
                owner_id: actor.id,
                attachment: attachment.cloned(),
                status: initial_status(doc_type),
            }),
            _ => None,
        };

        let commit = TransitionCommit {
            transaction: TransactionChange::Advance {
                id: tx.id,
                expected_version: tx.version,
                status: rule.to,
            },
            created_document,
            document_status: plan.document_status,
            entry: PendingEntry {
                target: plan.target,
                actor,
                action: rule.action,
                metadata: step_metadata(&action, &tx),
            },
            timestamp: unix_now(),
        };
        Ok(self.ledger.record_transition(commit).await?)
    }

    async fn open_transaction(
        &self,
        rule: &TransitionRule,
        action: TradeAction,
        actor: Principal,
    ) -> Result<TransitionReceipt, FlowError> {
        let TradeAction::CreatePo {
            seller_id,
            amount,
            currency,
            doc_number,
            attachment,
        } = action
        else {
            return Err(FlowError::InvalidTransition(format!(
                "{} does not open a transaction",
                rule.action
            )));
        };

        if amount <= Decimal::ZERO {
            return Err(FlowError::InvalidInput(format!("amount must be positive, got {amount}")));
        }
        if !is_currency_code(&currency) {
            return Err(FlowError::InvalidInput(format!(
                "currency must be a 3-letter code, got {currency:?}"
            )));
        }
        if seller_id == actor.id {
            return Err(FlowError::InvalidInput(
                "buyer and seller must differ".to_string(),
            ));
        }
        let doc_number = validate_doc_number(&doc_number)?;

        let now = unix_now();
        let mut metadata = Metadata::new();
        metadata.insert("buyer_id".into(), json!(actor.id));
        metadata.insert("seller_id".into(), json!(seller_id));
        metadata.insert("amount".into(), json!(amount.to_string()));
        metadata.insert("currency".into(), json!(currency));

        let commit = TransitionCommit {
            transaction: TransactionChange::Open(NewTransaction {
                buyer_id: actor.id,
                seller_id,
                amount,
                currency,
                created_at: now,
            }),
            created_document: Some(FlowDocument {
                doc_type: DocType::Po,
                doc_number,
                owner_id: actor.id,
                attachment,
                status: DocumentStatus::Issued,
            }),
            document_status: Vec::new(),
            entry: PendingEntry {
                target: EntryTarget::Created,
                actor,
                action: rule.action,
                metadata,
            },
            timestamp: now,
        };
        Ok(self.ledger.record_transition(commit).await?)
    }

    async fn resolve_target(&self, target: ActionTarget) -> Result<Transaction, FlowError> {
        let tx_id = match target {
            ActionTarget::NewTransaction => {
                return Err(FlowError::InvalidTransition(
                    "only CREATE_PO opens a new transaction".to_string(),
                ))
            }
            ActionTarget::Transaction(id) => id,
            ActionTarget::Document(doc_id) => self
                .document(doc_id)
                .await?
                .transaction_id
                .ok_or_else(|| {
                    FlowError::NotFound(format!("document {doc_id} belongs to no transaction"))
                })?,
        };
        self.transaction(tx_id).await
    }

    async fn document(&self, id: DocumentId) -> Result<Document, FlowError> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("document {id}")))
    }

    /// Entry placement and document status changes for steps on an existing transaction
    async fn plan_step(
        &self,
        rule: &TransitionRule,
        action: &TradeAction,
        tx: &Transaction,
    ) -> Result<StepPlan, FlowError> {
        let slot = |doc_type: DocType| {
            tx.slots.get(doc_type).ok_or_else(|| {
                FlowError::NotFound(format!("transaction {} has no {doc_type}", tx.id))
            })
        };

        let plan = match action {
            TradeAction::IssueLoc { .. }
            | TradeAction::UploadBol { .. }
            | TradeAction::IssueInvoice { .. } => StepPlan::created(),
            TradeAction::Verify => {
                let loc = slot(DocType::Loc)?;
                StepPlan {
                    target: EntryTarget::Existing(loc),
                    document_status: vec![
                        (slot(DocType::Po)?, DocumentStatus::Verified),
                        (loc, DocumentStatus::Verified),
                    ],
                }
            }
            TradeAction::MarkReceived => {
                let bol = self.document(slot(DocType::BillOfLading)?).await?;
                if bol.status == DocumentStatus::Received {
                    return Err(FlowError::InvalidTransition(format!(
                        "bill of lading {} already received",
                        bol.doc_number
                    )));
                }
                StepPlan {
                    target: EntryTarget::Existing(bol.id),
                    document_status: vec![(bol.id, DocumentStatus::Received)],
                }
            }
            TradeAction::PayInvoice => {
                let invoice = slot(DocType::Invoice)?;
                StepPlan {
                    target: EntryTarget::Existing(invoice),
                    document_status: vec![(invoice, DocumentStatus::Paid)],
                }
            }
            TradeAction::Dispute { .. } | TradeAction::Resolve { .. } => StepPlan {
                target: EntryTarget::Existing(slot(DocType::Po)?),
                document_status: Vec::new(),
            },
            TradeAction::CreatePo { .. } => {
                return Err(FlowError::InvalidTransition(format!(
                    "{} opens a new transaction",
                    rule.action
                )))
            }
        };
        Ok(plan)
    }
}

struct StepPlan {
    target: EntryTarget,
    document_status: Vec<(DocumentId, DocumentStatus)>,
}

impl StepPlan {
    fn created() -> Self {
        Self {
            target: EntryTarget::Created,
            document_status: Vec::new(),
        }
    }
}

fn check_party(rule: &TransitionRule, tx: &Transaction, actor: Principal) -> Result<(), FlowError> {
    let ok = match rule.party {
        PartyRequirement::None => true,
        PartyRequirement::Buyer => tx.buyer_id == actor.id,
        PartyRequirement::Seller => tx.seller_id == actor.id,
        PartyRequirement::EitherParty => match actor.role {
            Role::Buyer | Role::Seller => tx.is_party(actor.id),
            _ => true,
        },
    };
    if ok {
        Ok(())
    } else {
        Err(FlowError::Unauthorized(format!(
            "user {} is not the required party of transaction {} for {}",
            actor.id, tx.id, rule.action
        )))
    }
}

fn validate_doc_number(doc_number: &str) -> Result<String, FlowError> {
    let trimmed = doc_number.trim();
    if trimmed.is_empty() {
        return Err(FlowError::InvalidInput("doc_number must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn initial_status(doc_type: DocType) -> DocumentStatus {
    match doc_type {
        DocType::BillOfLading => DocumentStatus::Shipped,
        _ => DocumentStatus::Issued,
    }
}

fn step_metadata(action: &TradeAction, tx: &Transaction) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("transaction_id".into(), json!(tx.id));
    match action {
        TradeAction::UploadBol {
            tracking_id: Some(tracking_id),
            ..
        } => {
            metadata.insert("tracking_id".into(), json!(tracking_id));
        }
        TradeAction::IssueInvoice { amount, .. } => {
            let amount = amount.unwrap_or(tx.amount);
            metadata.insert("amount".into(), json!(amount.to_string()));
            metadata.insert("currency".into(), json!(tx.currency));
        }
        TradeAction::PayInvoice => {
            metadata.insert("amount".into(), json!(tx.amount.to_string()));
            metadata.insert("currency".into(), json!(tx.currency));
        }
        TradeAction::Dispute { reason } => {
            metadata.insert("reason".into(), json!(reason));
        }
        TradeAction::Resolve { resolution } => {
            metadata.insert("resolution".into(), json!(resolution));
        }
        _ => {}
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use trade_ledger_types::TransactionStatus;

    const BUYER: i64 = 1;
    const SELLER: i64 = 2;
    const BANK: i64 = 3;
    const AUDITOR: i64 = 4;

    fn engine() -> TradeFlowEngine<InMemoryStore> {
        TradeFlowEngine::new(Arc::new(InMemoryStore::new()))
    }

    fn create_po(doc_number: &str) -> TradeAction {
        TradeAction::CreatePo {
            seller_id: UserId(SELLER),
            amount: Decimal::new(250_000, 2),
            currency: "USD".into(),
            doc_number: doc_number.into(),
            attachment: None,
        }
    }

    async fn open(engine: &TradeFlowEngine<InMemoryStore>) -> TransactionId {
        engine
            .perform(ActionTarget::NewTransaction, create_po("PO-1"), Principal::buyer(BUYER))
            .await
            .unwrap()
            .transaction
            .id
    }

    async fn verified(engine: &TradeFlowEngine<InMemoryStore>) -> TransactionId {
        let tx = open(engine).await;
        let target = ActionTarget::Transaction(tx);
        engine
            .perform(
                target,
                TradeAction::IssueLoc {
                    doc_number: "LOC-1".into(),
                    attachment: None,
                },
                Principal::bank(BANK),
            )
            .await
            .unwrap();
        engine
            .perform(target, TradeAction::Verify, Principal::auditor(AUDITOR))
            .await
            .unwrap();
        tx
    }

    #[tokio::test]
    async fn test_full_workflow() {
        let engine = engine();
        let tx = verified(&engine).await;
        let target = ActionTarget::Transaction(tx);

        engine
            .perform(
                target,
                TradeAction::UploadBol {
                    doc_number: "BOL-1".into(),
                    tracking_id: Some("TRK-9".into()),
                    attachment: None,
                },
                Principal::seller(SELLER),
            )
            .await
            .unwrap();
        engine
            .perform(
                target,
                TradeAction::IssueInvoice {
                    doc_number: "INV-1".into(),
                    amount: None,
                    attachment: None,
                },
                Principal::seller(SELLER),
            )
            .await
            .unwrap();
        engine
            .perform(target, TradeAction::MarkReceived, Principal::buyer(BUYER))
            .await
            .unwrap();
        let receipt = engine
            .perform(target, TradeAction::PayInvoice, Principal::bank(BANK))
            .await
            .unwrap();

        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        let history = engine.ledger().entries_for_transaction(tx).await.unwrap();
        let actions: Vec<_> = history.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                LedgerAction::CreatePo,
                LedgerAction::IssueLoc,
                LedgerAction::Verify,
                LedgerAction::UploadBol,
                LedgerAction::IssueInvoice,
                LedgerAction::MarkReceived,
                LedgerAction::PayInvoice,
            ]
        );
        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[tokio::test]
    async fn test_verify_marks_po_and_loc() {
        let engine = engine();
        let tx = verified(&engine).await;
        let tx = engine.transaction(tx).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::InProgress);

        for id in [tx.slots.po.unwrap(), tx.slots.loc.unwrap()] {
            let doc = engine.document(id).await.unwrap();
            assert_eq!(doc.status, DocumentStatus::Verified);
        }
    }

    #[tokio::test]
    async fn test_wrong_role_is_unauthorized() {
        let engine = engine();
        let tx = open(&engine).await;
        let err = engine
            .perform(
                ActionTarget::Transaction(tx),
                TradeAction::IssueLoc {
                    doc_number: "LOC-1".into(),
                    attachment: None,
                },
                Principal::buyer(BUYER),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Unauthorized(_)));
        let history = engine.ledger().entries_for_transaction(tx).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            engine.transaction(tx).await.unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_other_seller_cannot_upload_bol() {
        let engine = engine();
        let tx = verified(&engine).await;
        let err = engine
            .perform(
                ActionTarget::Transaction(tx),
                TradeAction::UploadBol {
                    doc_number: "BOL-1".into(),
                    tracking_id: None,
                    attachment: None,
                },
                Principal::seller(99),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_wrong_state_is_invalid_transition() {
        let engine = engine();
        let tx = open(&engine).await;
        let err = engine
            .perform(
                ActionTarget::Transaction(tx),
                TradeAction::Dispute {
                    reason: "late".into(),
                },
                Principal::buyer(BUYER),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_step_cannot_repeat() {
        let engine = engine();
        let tx = open(&engine).await;
        let issue = TradeAction::IssueLoc {
            doc_number: "LOC-1".into(),
            attachment: None,
        };
        engine
            .perform(ActionTarget::Transaction(tx), issue.clone(), Principal::bank(BANK))
            .await
            .unwrap();
        let err = engine
            .perform(ActionTarget::Transaction(tx), issue, Principal::bank(BANK))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_dispute_then_resolve_completes() {
        let engine = engine();
        let tx = verified(&engine).await;
        let po = engine.transaction(tx).await.unwrap().slots.po.unwrap();

        let disputed = engine
            .perform(
                ActionTarget::Document(po),
                TradeAction::Dispute {
                    reason: "short shipment".into(),
                },
                Principal::seller(SELLER),
            )
            .await
            .unwrap();
        assert_eq!(disputed.transaction.status, TransactionStatus::Disputed);
        assert_eq!(disputed.entry.document_id, po);
        assert_eq!(disputed.entry.metadata["reason"], json!("short shipment"));

        let resolved = engine
            .perform(
                ActionTarget::Transaction(tx),
                TradeAction::Resolve {
                    resolution: "partial refund".into(),
                },
                Principal::admin(7),
            )
            .await
            .unwrap();
        assert_eq!(resolved.transaction.status, TransactionStatus::Completed);

        let err = engine
            .perform(
                ActionTarget::Transaction(tx),
                TradeAction::Dispute {
                    reason: "again".into(),
                },
                Principal::buyer(BUYER),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_create_po_validation() {
        let engine = engine();
        let mut bad = create_po("PO-1");
        if let TradeAction::CreatePo { currency, .. } = &mut bad {
            *currency = "usd".into();
        }
        let err = engine
            .perform(ActionTarget::NewTransaction, bad, Principal::buyer(BUYER))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));

        let err = engine
            .perform(ActionTarget::NewTransaction, create_po("PO-1"), Principal::buyer(SELLER))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_targets() {
        let engine = engine();
        let err = engine
            .perform(
                ActionTarget::Transaction(TransactionId(42)),
                TradeAction::Verify,
                Principal::auditor(AUDITOR),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));

        let err = engine
            .perform(
                ActionTarget::Document(DocumentId(42)),
                TradeAction::Verify,
                Principal::auditor(AUDITOR),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
    }
}
