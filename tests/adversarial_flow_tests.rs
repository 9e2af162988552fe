/// Adversarial workflow tests
///
/// These tests try to push the ledger into states it must never reach:
/// - Racing actors on the same transaction step
/// - Reused document numbers
/// - Out-of-order and foreign-party actions
/// - Concurrent checks on the same tampered document
/// - Restarts in the middle of a trade
use futures::future::join_all;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trade_ledger::{ServiceError, TradeLedger};
use trade_ledger_engine::{
    ActionTarget, CreateDocument, FlowError, InMemoryContentStore, SqliteStore, TradeAction,
};
use trade_ledger_integrity::SchedulerConfig;
use trade_ledger_retry::RetryPolicy;
use trade_ledger_types::{
    AlertFilter, Attachment, ContentRef, DocType, DocumentFilter, DocumentInvariantError,
    LedgerQuery, Principal, TransactionId, TransactionStatus, UserId,
};

const BUYER: i64 = 10;
const SELLER: i64 = 20;
const BANK: i64 = 30;

fn fast_config() -> SchedulerConfig {
    let quick = |attempts| RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(5));
    SchedulerConfig {
        max_workers: 8,
        incremental_retry: quick(2),
        full_sweep_retry: quick(2),
        on_demand_retry: quick(2),
        ..SchedulerConfig::default()
    }
}

async fn file_ledger(
    path: &std::path::Path,
    content: &InMemoryContentStore,
) -> (Arc<SqliteStore>, Arc<TradeLedger<SqliteStore>>) {
    let store = Arc::new(SqliteStore::with_max_connections(path, 4).await.unwrap());
    let ledger = TradeLedger::builder(store.clone(), Arc::new(content.clone()))
        .scheduler_config(fast_config())
        .build();
    (store, Arc::new(ledger))
}

fn create_po(number: &str) -> TradeAction {
    TradeAction::CreatePo {
        seller_id: UserId(SELLER),
        amount: Decimal::from_str("9800.50").unwrap(),
        currency: "EUR".to_string(),
        doc_number: number.to_string(),
        attachment: None,
    }
}

fn issue_loc(number: &str) -> TradeAction {
    TradeAction::IssueLoc {
        doc_number: number.to_string(),
        attachment: None,
    }
}

async fn open_trade(ledger: &TradeLedger<SqliteStore>, number: &str) -> TransactionId {
    ledger
        .perform_action(ActionTarget::NewTransaction, create_po(number), Principal::buyer(BUYER))
        .await
        .unwrap()
        .transaction_id
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// RACES
// ═══════════════════════════════════════════════════════════════════════════

/// Attack: several banks race to verify the same transaction
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_verifications_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("race.db"), &content).await;

    let tx_id = open_trade(&ledger, "PO-RACE").await;
    let target = ActionTarget::Transaction(tx_id);
    ledger
        .perform_action(target, issue_loc("LOC-RACE"), Principal::bank(BANK))
        .await
        .unwrap();

    let attempts = (0..8).map(|i| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .perform_action(target, TradeAction::Verify, Principal::bank(BANK + i))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(err.reason(), "invalid_transition");
    }

    let tx = ledger.transaction(tx_id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::InProgress);
    assert_eq!(ledger.transaction_timeline(tx_id).await.unwrap().len(), 3);
}

/// Attack: two letters of credit issued for one purchase order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_loc_issuance_creates_one_document() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("loc.db"), &content).await;
    let tx_id = open_trade(&ledger, "PO-LOC").await;

    let attempts = (0..6).map(|i| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .perform_action(
                    ActionTarget::Transaction(tx_id),
                    issue_loc(&format!("LOC-{i}")),
                    Principal::bank(BANK),
                )
                .await
        })
    });
    let winners = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();
    assert_eq!(winners, 1);

    let filter = DocumentFilter {
        transaction_id: Some(tx_id),
        ..DocumentFilter::default()
    };
    let docs = ledger.documents(&filter).await.unwrap();
    let locs: Vec<_> = docs.iter().filter(|d| d.doc_type == DocType::Loc).collect();
    assert_eq!(locs.len(), 1);
    assert_eq!(ledger.transaction(tx_id).await.unwrap().slots.loc, Some(locs[0].id));
}

/// Attack: reuse a purchase order number to shadow an existing trade
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_po_numbers_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("dup.db"), &content).await;

    let attempts = (0..5).map(|_| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .perform_action(
                    ActionTarget::NewTransaction,
                    create_po("PO-SHADOW"),
                    Principal::buyer(BUYER),
                )
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(matches!(err, ServiceError::Flow(FlowError::DuplicateDocNumber(_))));
    }

    // A failed PO leaves no orphan transaction or entry behind
    let entries = ledger.explore_ledger(&LedgerQuery::default(), None, 0).await.unwrap();
    assert_eq!(entries.len(), 1);
    let stats = ledger.integrity_summary().await.unwrap();
    assert_eq!(stats.total_documents, 1);
}

/// Attack: concurrent checks of one tampered document raising duplicate alerts
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_raise_one_alert() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("alerts.db"), &content).await;

    let doc = ledger
        .upload_document(CreateDocument::new(DocType::Invoice, "INV-T", UserId(SELLER)), b"genuine")
        .await
        .unwrap();
    content.overwrite(doc.content_ref().unwrap(), b"forged");

    let runs = (0..4).map(|_| {
        let ledger = ledger.clone();
        let id = doc.id;
        tokio::spawn(async move { ledger.check_now(vec![id]).await })
    });
    for joined in join_all(runs).await {
        assert_eq!(joined.unwrap().unwrap().counts.mismatch, 1);
    }

    let sweep = ledger.run_full_sweep().await.unwrap();
    assert_eq!(sweep.counts.alerts_created, 0);
    assert_eq!(ledger.list_alerts(&AlertFilter::unresolved()).await.unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// ABUSE OF THE WORKFLOW
// ═══════════════════════════════════════════════════════════════════════════

/// Attack: seller invoices and gets paid without shipping or verification
#[tokio::test]
async fn test_steps_cannot_be_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("skip.db"), &content).await;
    let tx_id = open_trade(&ledger, "PO-SKIP").await;
    let target = ActionTarget::Transaction(tx_id);

    let invoice = TradeAction::IssueInvoice {
        doc_number: "INV-EARLY".into(),
        amount: Some(Decimal::from_str("9800.50").unwrap()),
        attachment: None,
    };
    let err = ledger
        .perform_action(target, invoice, Principal::seller(SELLER))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "invalid_transition");

    let err = ledger
        .perform_action(target, TradeAction::PayInvoice, Principal::bank(BANK))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "invalid_transition");

    // Verification needs a letter of credit first
    let err = ledger
        .perform_action(target, TradeAction::Verify, Principal::auditor(40))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "invalid_transition");

    let tx = ledger.transaction(tx_id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.version, 0);
    assert_eq!(ledger.transaction_timeline(tx_id).await.unwrap().len(), 1);
}

/// Attack: an unrelated seller ships against someone else's trade
#[tokio::test]
async fn test_foreign_seller_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("foreign.db"), &content).await;
    let tx_id = open_trade(&ledger, "PO-F").await;
    let target = ActionTarget::Transaction(tx_id);
    ledger
        .perform_action(target, issue_loc("LOC-F"), Principal::bank(BANK))
        .await
        .unwrap();
    ledger
        .perform_action(target, TradeAction::Verify, Principal::bank(BANK))
        .await
        .unwrap();

    let bol = TradeAction::UploadBol {
        doc_number: "BOL-F".into(),
        tracking_id: None,
        attachment: None,
    };
    let err = ledger
        .perform_action(target, bol, Principal::seller(SELLER + 1))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "unauthorized");
    assert_eq!(ledger.transaction(tx_id).await.unwrap().slots.bol, None);
}

/// Attack: negative or malformed purchase orders
#[tokio::test]
async fn test_malformed_purchase_orders_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("bad.db"), &content).await;

    let bad = [
        TradeAction::CreatePo {
            seller_id: UserId(SELLER),
            amount: Decimal::from_str("-1").unwrap(),
            currency: "USD".into(),
            doc_number: "PO-NEG".into(),
            attachment: None,
        },
        TradeAction::CreatePo {
            seller_id: UserId(SELLER),
            amount: Decimal::ONE,
            currency: "dollars".into(),
            doc_number: "PO-CUR".into(),
            attachment: None,
        },
        TradeAction::CreatePo {
            seller_id: UserId(BUYER),
            amount: Decimal::ONE,
            currency: "USD".into(),
            doc_number: "PO-SELF".into(),
            attachment: None,
        },
        TradeAction::CreatePo {
            seller_id: UserId(SELLER),
            amount: Decimal::ONE,
            currency: "USD".into(),
            doc_number: "   ".into(),
            attachment: None,
        },
    ];
    for action in bad {
        let err = ledger
            .perform_action(ActionTarget::NewTransaction, action, Principal::buyer(BUYER))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_input");
    }

    assert!(ledger
        .explore_ledger(&LedgerQuery::default(), None, 0)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(ledger.integrity_summary().await.unwrap().total_documents, 0);
}

/// Attack: smuggle a malformed digest into a workflow document
#[tokio::test]
async fn test_purchase_order_digest_is_checked() {
    let dir = tempfile::tempdir().unwrap();
    let content = InMemoryContentStore::new();
    let (_store, ledger) = file_ledger(&dir.path().join("digest.db"), &content).await;

    let err = Attachment::new(ContentRef::new("mem://x"), "not-a-hash").unwrap_err();
    assert!(matches!(err, DocumentInvariantError::MalformedHash(_)));
    assert!(ledger
        .explore_ledger(&LedgerQuery::default(), None, 0)
        .await
        .unwrap()
        .is_empty());

    // An uppercase digest is stored lowercase and verifies against unmodified bytes
    let (content_ref, hash) = ledger.attach(b"PO-HEX terms").await.unwrap().into_parts();
    let attachment = Attachment::new(content_ref, hash.to_ascii_uppercase()).unwrap();
    let action = TradeAction::CreatePo {
        seller_id: UserId(SELLER),
        amount: Decimal::ONE,
        currency: "USD".into(),
        doc_number: "PO-HEX".into(),
        attachment: Some(attachment),
    };
    let entry = ledger
        .perform_action(ActionTarget::NewTransaction, action, Principal::buyer(BUYER))
        .await
        .unwrap();
    let doc = ledger.document(entry.document_id).await.unwrap();
    assert_eq!(doc.content_hash(), Some(hash.as_str()));

    let summary = ledger.run_full_sweep().await.unwrap();
    assert_eq!(summary.counts.ok, 1);
    assert_eq!(summary.counts.failed, 0);
    assert!(ledger
        .list_alerts(&AlertFilter::default())
        .await
        .unwrap()
        .is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// RESTARTS
// ═══════════════════════════════════════════════════════════════════════════

/// Attack: restart the service to reuse ledger sequence numbers
#[tokio::test]
async fn test_sequences_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.db");
    let content = InMemoryContentStore::new();

    let (store, ledger) = file_ledger(&path, &content).await;
    let tx_id = open_trade(&ledger, "PO-R").await;
    ledger
        .perform_action(ActionTarget::Transaction(tx_id), issue_loc("LOC-R"), Principal::bank(BANK))
        .await
        .unwrap();
    let before = ledger.transaction_timeline(tx_id).await.unwrap();
    let last_sequence = before.last().unwrap().sequence;
    ledger.shutdown();
    drop(ledger);
    store.close().await;

    let (store, ledger) = file_ledger(&path, &content).await;
    let tx = ledger.transaction(tx_id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert!(tx.slots.loc.is_some());

    let entry = ledger
        .perform_action(ActionTarget::Transaction(tx_id), TradeAction::Verify, Principal::bank(BANK))
        .await
        .unwrap();
    assert!(entry.sequence > last_sequence);

    let after = ledger.transaction_timeline(tx_id).await.unwrap();
    assert_eq!(after.len(), 3);
    assert_eq!(&after[..2], &before[..]);
    store.close().await;
}
