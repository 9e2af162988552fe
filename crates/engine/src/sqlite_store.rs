use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction as SqlTransaction};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use trade_ledger_types::{
    AlertFilter, AlertId, Attachment, CheckFilter, CheckId, CheckOutcome, CheckReceipt,
    ContentRef, Document, DocumentFilter, DocumentId, IntegrityAlert, IntegrityCheckResult,
    LedgerEntry, LedgerQuery, Metadata, NewAlert, NewDocument, NewLedgerEntry, RunCounts, RunId,
    RunSummary, Timestamp, Transaction, TransactionId, UserId, WorkflowSlots,
};

use crate::error::StoreError;
use crate::store::{
    CorruptDocument, EntryTarget, LedgerStore, StoreStats, TransactionChange, TransitionCommit,
    TransitionReceipt,
};

const MIGRATIONS: [&str; 3] = [
    include_str!("../migrations/001_create_documents.sql"),
    include_str!("../migrations/002_create_ledger_entries.sql"),
    include_str!("../migrations/003_create_integrity.sql"),
];

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `db_path`
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        Self::with_max_connections(db_path, 5).await
    }

    pub async fn with_max_connections<P: AsRef<Path>>(
        db_path: P,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for migration in MIGRATIONS {
            for statement in migration.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(db_error)?;
            }
        }
        Ok(())
    }

    /// Rows of `documents` matching `filter`, ascending by id. A row with
    /// either content column set counts as having content.
    async fn document_rows(&self, filter: &DocumentFilter) -> Result<Vec<SqliteRow>, StoreError> {
        let since = filter.created_since.map(|t| t as i64);
        let tx_id = filter.transaction_id.map(TransactionId::get);
        let rows = sqlx::query(
            r#"
            SELECT * FROM documents
            WHERE (? IS NULL OR created_at >= ?)
              AND (? = 0 OR content_ref IS NOT NULL OR content_hash IS NOT NULL)
              AND (? IS NULL OR transaction_id = ?)
            ORDER BY id ASC
            "#,
        )
        .bind(since)
        .bind(since)
        .bind(filter.with_content_only)
        .bind(tx_id)
        .bind(tx_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows)
    }

    /// Underlying pool, for maintenance queries outside the store API
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn begin(&self) -> Result<SqlTransaction<'static, Sqlite>, StoreError> {
        self.pool.begin().await.map_err(db_error)
    }

    async fn fetch_transaction(
        conn: &mut SqlTransaction<'static, Sqlite>,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&mut **conn)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(row_to_transaction)
            .transpose()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ROW MAPPING
// ═══════════════════════════════════════════════════════════════════════════

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

fn parse<T>(value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::SerializationError(e.to_string()))
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::SerializationError(format!("{name}: {e}")))
}

fn ts(row: &SqliteRow, name: &str) -> Result<Timestamp, StoreError> {
    Ok(col::<i64>(row, name)?.max(0) as u64)
}

fn opt_ts(row: &SqliteRow, name: &str) -> Result<Option<Timestamp>, StoreError> {
    Ok(col::<Option<i64>>(row, name)?.map(|v| v.max(0) as u64))
}

fn row_to_document(row: &SqliteRow) -> Result<Document, StoreError> {
    let attachment = Attachment::from_parts(
        col::<Option<String>>(row, "content_ref")?.map(ContentRef::new),
        col::<Option<String>>(row, "content_hash")?,
    )?;
    Ok(Document {
        id: DocumentId(col(row, "id")?),
        doc_type: parse(&col::<String>(row, "doc_type")?)?,
        doc_number: col(row, "doc_number")?,
        owner_id: UserId(col(row, "owner_id")?),
        transaction_id: col::<Option<i64>>(row, "transaction_id")?.map(TransactionId),
        attachment,
        status: parse(&col::<String>(row, "status")?)?,
        created_at: ts(row, "created_at")?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction, StoreError> {
    let slot = |name: &str| -> Result<Option<DocumentId>, StoreError> {
        Ok(col::<Option<i64>>(row, name)?.map(DocumentId))
    };
    Ok(Transaction {
        id: TransactionId(col(row, "id")?),
        buyer_id: UserId(col(row, "buyer_id")?),
        seller_id: UserId(col(row, "seller_id")?),
        amount: parse::<Decimal>(&col::<String>(row, "amount")?)?,
        currency: col(row, "currency")?,
        status: parse(&col::<String>(row, "status")?)?,
        slots: WorkflowSlots {
            po: slot("po_id")?,
            loc: slot("loc_id")?,
            bol: slot("bol_id")?,
            invoice: slot("invoice_id")?,
        },
        version: col::<i64>(row, "version")?.max(0) as u64,
        created_at: ts(row, "created_at")?,
        updated_at: ts(row, "updated_at")?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry, StoreError> {
    let metadata: Metadata = serde_json::from_str(&col::<String>(row, "metadata")?)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(LedgerEntry {
        sequence: col::<i64>(row, "sequence")? as u64,
        document_id: DocumentId(col(row, "document_id")?),
        transaction_id: col::<Option<i64>>(row, "transaction_id")?.map(TransactionId),
        actor_id: UserId(col(row, "actor_id")?),
        actor_role: parse(&col::<String>(row, "actor_role")?)?,
        action: parse(&col::<String>(row, "action")?)?,
        metadata,
        timestamp: ts(row, "timestamp")?,
    })
}

fn row_to_check(row: &SqliteRow) -> Result<IntegrityCheckResult, StoreError> {
    Ok(IntegrityCheckResult {
        id: CheckId(col(row, "id")?),
        document_id: DocumentId(col(row, "document_id")?),
        run_id: col::<Option<String>>(row, "run_id")?
            .map(|r| parse::<RunId>(&r))
            .transpose()?,
        status: parse(&col::<String>(row, "status")?)?,
        stored_hash: col(row, "stored_hash")?,
        computed_hash: col(row, "computed_hash")?,
        detail: col(row, "detail")?,
        checked_at: ts(row, "checked_at")?,
        alert_raised: col(row, "alert_raised")?,
    })
}

fn row_to_alert(row: &SqliteRow) -> Result<IntegrityAlert, StoreError> {
    Ok(IntegrityAlert {
        id: AlertId(col(row, "id")?),
        document_id: DocumentId(col(row, "document_id")?),
        alert_type: parse(&col::<String>(row, "alert_type")?)?,
        severity: parse(&col::<String>(row, "severity")?)?,
        detail: col(row, "detail")?,
        resolved: col(row, "resolved")?,
        resolved_by: col::<Option<i64>>(row, "resolved_by")?.map(UserId),
        resolved_at: opt_ts(row, "resolved_at")?,
        created_at: ts(row, "created_at")?,
    })
}

fn row_to_run(row: &SqliteRow) -> Result<RunSummary, StoreError> {
    let count = |name: &str| -> Result<u64, StoreError> { Ok(col::<i64>(row, name)?.max(0) as u64) };
    Ok(RunSummary {
        id: parse(&col::<String>(row, "id")?)?,
        mode: parse(&col::<String>(row, "mode")?)?,
        state: parse(&col::<String>(row, "state")?)?,
        counts: RunCounts {
            total: count("total")?,
            ok: count("ok")?,
            mismatch: count("mismatch")?,
            missing: count("missing")?,
            alerts_created: count("alerts_created")?,
            failed: count("failed")?,
        },
        failures: serde_json::from_str(&col::<String>(row, "failures")?)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?,
        started_at: ts(row, "started_at")?,
        finished_at: opt_ts(row, "finished_at")?,
    })
}

fn slot_column(doc_type: trade_ledger_types::DocType) -> Option<&'static str> {
    use trade_ledger_types::DocType;
    match doc_type {
        DocType::Po => Some("po_id"),
        DocType::Loc => Some("loc_id"),
        DocType::BillOfLading => Some("bol_id"),
        DocType::Invoice => Some("invoice_id"),
        DocType::Coo | DocType::InsuranceCert => None,
    }
}

fn unique_to_duplicate(e: sqlx::Error, doc_number: &str) -> StoreError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::DuplicateDocNumber(doc_number.to_string())
        }
        other => db_error(other),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::SerializationError(e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn insert_document(&self, doc: NewDocument) -> Result<Document, StoreError> {
        let mut tx = self.begin().await?;
        if let Some(tx_id) = doc.transaction_id {
            if Self::fetch_transaction(&mut tx, tx_id).await?.is_none() {
                return Err(StoreError::NotFound(format!("transaction {tx_id}")));
            }
        }
        let result = sqlx::query(
            r#"
            INSERT INTO documents (doc_type, doc_number, owner_id, transaction_id,
                                   content_ref, content_hash, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.doc_type.as_str())
        .bind(&doc.doc_number)
        .bind(doc.owner_id.get())
        .bind(doc.transaction_id.map(TransactionId::get))
        .bind(doc.attachment.as_ref().map(|a| a.content_ref().as_str().to_string()))
        .bind(doc.attachment.as_ref().map(|a| a.content_hash().to_string()))
        .bind(doc.status.as_str())
        .bind(doc.created_at as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_to_duplicate(e, &doc.doc_number))?;

        tx.commit().await.map_err(db_error)?;
        Ok(doc.into_document(DocumentId(result.last_insert_rowid())))
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(row_to_document)
            .transpose()
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        self.document_rows(filter).await?.iter().map(row_to_document).collect()
    }

    async fn scan_documents(
        &self,
        filter: &DocumentFilter,
    ) -> Result<Vec<Result<Document, CorruptDocument>>, StoreError> {
        self.document_rows(filter)
            .await?
            .iter()
            .map(|row| {
                let id = DocumentId(col(row, "id")?);
                Ok(row_to_document(row).map_err(|e| CorruptDocument {
                    id,
                    reason: e.to_string(),
                }))
            })
            .collect()
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(row_to_transaction)
            .transpose()
    }
    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<TransitionReceipt, StoreError> {
        let mut tx = self.begin().await?;

        // The first statement writes, so the connection takes the write lock
        // up front instead of upgrading from a read lock.
        let tx_id = match &commit.transaction {
            TransactionChange::Open(new_tx) => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO transactions (buyer_id, seller_id, amount, currency, status,
                                              version, created_at, updated_at)
                    VALUES (?, ?, ?, ?, 'PENDING', 0, ?, ?)
                    "#,
                )
                .bind(new_tx.buyer_id.get())
                .bind(new_tx.seller_id.get())
                .bind(new_tx.amount.to_string())
                .bind(&new_tx.currency)
                .bind(new_tx.created_at as i64)
                .bind(new_tx.created_at as i64)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                TransactionId(result.last_insert_rowid())
            }
            TransactionChange::Advance {
                id,
                expected_version,
                status,
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE transactions
                    SET status = ?, version = version + 1, updated_at = ?
                    WHERE id = ? AND version = ?
                    "#,
                )
                .bind(status.as_str())
                .bind(commit.timestamp as i64)
                .bind(id.get())
                .bind(*expected_version as i64)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

                if result.rows_affected() == 0 {
                    let current = Self::fetch_transaction(&mut tx, *id).await?;
                    return Err(match current {
                        None => StoreError::NotFound(format!("transaction {id}")),
                        Some(current) => StoreError::VersionConflict {
                            transaction_id: *id,
                            expected: *expected_version,
                            actual: current.version,
                        },
                    });
                }
                *id
            }
        };

        let mut created_document = None;
        if let Some(doc) = commit.created_document {
            let new_doc = NewDocument {
                doc_type: doc.doc_type,
                doc_number: doc.doc_number,
                owner_id: doc.owner_id,
                transaction_id: Some(tx_id),
                attachment: doc.attachment,
                status: doc.status,
                created_at: commit.timestamp,
            };
            let result = sqlx::query(
                r#"
                INSERT INTO documents (doc_type, doc_number, owner_id, transaction_id,
                                       content_ref, content_hash, status, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(new_doc.doc_type.as_str())
            .bind(&new_doc.doc_number)
            .bind(new_doc.owner_id.get())
            .bind(tx_id.get())
            .bind(new_doc.attachment.as_ref().map(|a| a.content_ref().as_str().to_string()))
            .bind(new_doc.attachment.as_ref().map(|a| a.content_hash().to_string()))
            .bind(new_doc.status.as_str())
            .bind(commit.timestamp as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_to_duplicate(e, &new_doc.doc_number))?;
            let created = new_doc.into_document(DocumentId(result.last_insert_rowid()));

            if let Some(column) = slot_column(created.doc_type) {
                sqlx::query(&format!("UPDATE transactions SET {column} = ? WHERE id = ?"))
                    .bind(created.id.get())
                    .bind(tx_id.get())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
            }
            created_document = Some(created);
        }

        for (doc_id, status) in &commit.document_status {
            let result = sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(doc_id.get())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("document {doc_id}")));
            }
        }

        let document_id = match (commit.entry.target, &created_document) {
            (EntryTarget::Existing(id), _) => id,
            (EntryTarget::Created, Some(doc)) => doc.id,
            (EntryTarget::Created, None) => {
                return Err(StoreError::Invariant(
                    "ledger entry targets a document the commit does not create".to_string(),
                ))
            }
        };
        let new_entry = NewLedgerEntry {
            document_id,
            transaction_id: Some(tx_id),
            actor_id: commit.entry.actor.id,
            actor_role: commit.entry.actor.role,
            action: commit.entry.action,
            metadata: commit.entry.metadata,
            timestamp: commit.timestamp,
        };
        let entry = insert_entry(&mut tx, new_entry).await?;

        let transaction = Self::fetch_transaction(&mut tx, tx_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction {tx_id}")))?;
        tx.commit().await.map_err(db_error)?;

        Ok(TransitionReceipt {
            transaction,
            created_document,
            entry,
        })
    }

    async fn append_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let mut tx = self.begin().await?;
        let entry = insert_entry(&mut tx, entry).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(entry)
    }

    async fn entries_for_document(&self, id: DocumentId) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries WHERE document_id = ? ORDER BY timestamp ASC, sequence ASC",
        )
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn entries_for_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries WHERE transaction_id = ? ORDER BY timestamp ASC, sequence ASC",
        )
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn query_entries(
        &self,
        query: &LedgerQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let action = query.action.map(|a| a.as_str());
        let actor = query.actor_id.map(UserId::get);
        let from = query.from.map(|t| t as i64);
        let to = query.to.map(|t| t as i64);
        let rows = sqlx::query(
            r#"
            SELECT * FROM ledger_entries
            WHERE (? IS NULL OR action = ?)
              AND (? IS NULL OR actor_id = ?)
              AND (? IS NULL OR timestamp >= ?)
              AND (? IS NULL OR timestamp <= ?)
            ORDER BY timestamp DESC, sequence DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(action)
        .bind(action)
        .bind(actor)
        .bind(actor)
        .bind(from)
        .bind(from)
        .bind(to)
        .bind(to)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn record_check(
        &self,
        outcome: CheckOutcome,
        run_id: Option<RunId>,
        alert: Option<NewAlert>,
    ) -> Result<CheckReceipt, StoreError> {
        let mut tx = self.begin().await?;

        let mut created_alert = None;
        let mut existing_alert = None;
        if let Some(alert) = alert {
            // The partial unique index on open alerts makes this a compare-and-set
            let result = sqlx::query(
                r#"
                INSERT INTO integrity_alerts (document_id, alert_type, severity, detail,
                                              resolved, created_at)
                VALUES (?, ?, ?, ?, 0, ?)
                ON CONFLICT (document_id, alert_type) WHERE resolved = 0 DO NOTHING
                "#,
            )
            .bind(alert.document_id.get())
            .bind(alert.alert_type.as_str())
            .bind(alert.severity.as_str())
            .bind(&alert.detail)
            .bind(alert.created_at as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            if result.rows_affected() == 1 {
                created_alert = Some(alert.into_alert(AlertId(result.last_insert_rowid())));
            } else {
                let id: i64 = sqlx::query(
                    "SELECT id FROM integrity_alerts WHERE document_id = ? AND alert_type = ? AND resolved = 0",
                )
                .bind(alert.document_id.get())
                .bind(alert.alert_type.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?
                .try_get("id")
                .map_err(db_error)?;
                existing_alert = Some(AlertId(id));
            }
        }

        let alert_raised = created_alert.is_some();
        let result = sqlx::query(
            r#"
            INSERT INTO integrity_checks (document_id, run_id, status, stored_hash,
                                          computed_hash, detail, checked_at, alert_raised)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(outcome.document_id.get())
        .bind(run_id.map(|r| r.to_string()))
        .bind(outcome.status.as_str())
        .bind(&outcome.stored_hash)
        .bind(&outcome.computed_hash)
        .bind(&outcome.detail)
        .bind(outcome.checked_at as i64)
        .bind(alert_raised)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        Ok(CheckReceipt {
            result: outcome.into_result(CheckId(result.last_insert_rowid()), run_id, alert_raised),
            created_alert,
            existing_alert,
        })
    }

    async fn list_checks(
        &self,
        filter: &CheckFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IntegrityCheckResult>, StoreError> {
        let doc = filter.document_id.map(DocumentId::get);
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query(
            r#"
            SELECT * FROM integrity_checks
            WHERE (? IS NULL OR document_id = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY checked_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(doc)
        .bind(doc)
        .bind(status)
        .bind(status)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_check).collect()
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<IntegrityAlert>, StoreError> {
        sqlx::query("SELECT * FROM integrity_alerts WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(row_to_alert)
            .transpose()
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<IntegrityAlert>, StoreError> {
        let severity = filter.severity.map(|s| s.as_str());
        let doc = filter.document_id.map(DocumentId::get);
        let rows = sqlx::query(
            r#"
            SELECT * FROM integrity_alerts
            WHERE (? IS NULL OR resolved = ?)
              AND (? IS NULL OR severity = ?)
              AND (? IS NULL OR document_id = ?)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(filter.resolved)
        .bind(filter.resolved)
        .bind(severity)
        .bind(severity)
        .bind(doc)
        .bind(doc)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_alert).collect()
    }

    async fn resolve_alert(
        &self,
        id: AlertId,
        resolved_by: UserId,
        resolved_at: Timestamp,
    ) -> Result<IntegrityAlert, StoreError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE integrity_alerts
            SET resolved = 1, resolved_by = ?, resolved_at = ?
            WHERE id = ? AND resolved = 0
            "#,
        )
        .bind(resolved_by.get())
        .bind(resolved_at as i64)
        .bind(id.get())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let row = sqlx::query("SELECT * FROM integrity_alerts WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let alert = match row {
            None => return Err(StoreError::NotFound(format!("alert {id}"))),
            Some(_) if result.rows_affected() == 0 => return Err(StoreError::AlreadyResolved(id)),
            Some(row) => row_to_alert(&row)?,
        };
        tx.commit().await.map_err(db_error)?;
        Ok(alert)
    }

    async fn save_run(&self, run: &RunSummary) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO integrity_runs (id, mode, state, total, ok, mismatch, missing,
                                        alerts_created, failed, failures, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                state = excluded.state,
                total = excluded.total,
                ok = excluded.ok,
                mismatch = excluded.mismatch,
                missing = excluded.missing,
                alerts_created = excluded.alerts_created,
                failed = excluded.failed,
                failures = excluded.failures,
                finished_at = excluded.finished_at
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.mode.as_str())
        .bind(run.state.as_str())
        .bind(run.counts.total as i64)
        .bind(run.counts.ok as i64)
        .bind(run.counts.mismatch as i64)
        .bind(run.counts.missing as i64)
        .bind(run.counts.alerts_created as i64)
        .bind(run.counts.failed as i64)
        .bind(to_json(&run.failures)?)
        .bind(run.started_at as i64)
        .bind(run.finished_at.map(|t| t as i64))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<RunSummary>, StoreError> {
        sqlx::query("SELECT * FROM integrity_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(row_to_run)
            .transpose()
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents) AS total_documents,
                (SELECT COUNT(*) FROM documents WHERE content_ref IS NOT NULL) AS with_content,
                (SELECT COUNT(*) FROM integrity_alerts) AS total_alerts,
                (SELECT COUNT(*) FROM integrity_alerts WHERE resolved = 0) AS unresolved,
                (SELECT COUNT(*) FROM integrity_alerts
                    WHERE resolved = 0 AND severity = 'critical') AS critical
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        let count = |name: &str| -> Result<u64, StoreError> { Ok(col::<i64>(&row, name)?.max(0) as u64) };
        Ok(StoreStats {
            total_documents: count("total_documents")?,
            documents_with_content: count("with_content")?,
            total_alerts: count("total_alerts")?,
            unresolved_alerts: count("unresolved")?,
            critical_unresolved_alerts: count("critical")?,
        })
    }
}

async fn insert_entry(
    conn: &mut SqlTransaction<'static, Sqlite>,
    entry: NewLedgerEntry,
) -> Result<LedgerEntry, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries (document_id, transaction_id, actor_id, actor_role,
                                    action, metadata, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.document_id.get())
    .bind(entry.transaction_id.map(TransactionId::get))
    .bind(entry.actor_id.get())
    .bind(entry.actor_role.as_str())
    .bind(entry.action.as_str())
    .bind(to_json(&entry.metadata)?)
    .bind(entry.timestamp as i64)
    .execute(&mut **conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            StoreError::NotFound(format!("document {}", entry.document_id))
        }
        other => db_error(other),
    })?;
    Ok(entry.into_entry(result.last_insert_rowid() as u64))
}
