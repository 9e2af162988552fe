use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use trade_ledger_engine::{ContentError, ContentStore};
use trade_ledger_types::{
    sha256_hex, short_digest, unix_now, CheckOutcome, Document, IntegrityStatus,
};

use crate::error::VerifyError;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Recomputes a document's content hash and compares it with the stored one.
///
/// A check makes exactly one fetch attempt. Transient failures come back as
/// [`VerifyError`] for the caller's retry policy to handle.
#[derive(Clone)]
pub struct IntegrityVerifier {
    content: Arc<dyn ContentStore>,
    fetch_timeout: Duration,
}

impl IntegrityVerifier {
    pub fn new(content: Arc<dyn ContentStore>) -> Self {
        Self::with_timeout(content, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(content: Arc<dyn ContentStore>, fetch_timeout: Duration) -> Self {
        Self {
            content,
            fetch_timeout,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub async fn check(&self, doc: &Document) -> Result<CheckOutcome, VerifyError> {
        let Some(attachment) = doc.attachment.as_ref() else {
            return Ok(outcome(doc, IntegrityStatus::Ok, None, "no content to verify".into()));
        };

        let fetched = tokio::time::timeout(self.fetch_timeout, self.content.get(attachment.content_ref()))
            .await
            .map_err(|_| VerifyError::Timeout(self.fetch_timeout))?;

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(ContentError::NotFound(content_ref)) => {
                debug!(document_id = %doc.id, content_ref = %content_ref, "Content missing");
                return Ok(outcome(
                    doc,
                    IntegrityStatus::Missing,
                    None,
                    format!("no content found at {content_ref}"),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let computed = sha256_hex(&bytes);
        if computed == attachment.content_hash() {
            return Ok(outcome(doc, IntegrityStatus::Ok, Some(computed), "content hash matches".into()));
        }

        let detail = format!(
            "stored hash {} does not match computed hash {}",
            short_digest(attachment.content_hash()),
            short_digest(&computed)
        );
        Ok(outcome(doc, IntegrityStatus::Mismatch, Some(computed), detail))
    }
}

fn outcome(
    doc: &Document,
    status: IntegrityStatus,
    computed_hash: Option<String>,
    detail: String,
) -> CheckOutcome {
    CheckOutcome {
        document_id: doc.id,
        status,
        stored_hash: doc.content_hash().map(str::to_string),
        computed_hash,
        detail,
        checked_at: unix_now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trade_ledger_engine::InMemoryContentStore;
    use trade_ledger_types::{
        Attachment, ContentRef, DocType, DocumentId, DocumentStatus, UserId,
    };

    fn document(attachment: Option<Attachment>) -> Document {
        Document {
            id: DocumentId(1),
            doc_type: DocType::Invoice,
            doc_number: "INV-1".into(),
            owner_id: UserId(2),
            transaction_id: None,
            attachment,
            status: DocumentStatus::Issued,
            created_at: 0,
        }
    }

    async fn stored(content: &InMemoryContentStore, bytes: &[u8]) -> Document {
        let content_ref = content.put(bytes).await.unwrap();
        document(Some(Attachment::new(content_ref, sha256_hex(bytes)).unwrap()))
    }

    #[tokio::test]
    async fn test_unmodified_content_is_ok() {
        let content = InMemoryContentStore::new();
        let doc = stored(&content, b"invoice body").await;
        let verifier = IntegrityVerifier::new(Arc::new(content));

        let outcome = verifier.check(&doc).await.unwrap();
        assert_eq!(outcome.status, IntegrityStatus::Ok);
        assert_eq!(outcome.computed_hash.as_deref(), doc.content_hash());
    }

    #[tokio::test]
    async fn test_no_content() {
        let verifier = IntegrityVerifier::new(Arc::new(InMemoryContentStore::new()));
        let outcome = verifier.check(&document(None)).await.unwrap();
        assert_eq!(outcome.status, IntegrityStatus::Ok);
        assert_eq!(outcome.detail, "no content to verify");
        assert_eq!(outcome.stored_hash, None);
    }

    #[tokio::test]
    async fn test_tampered_content_is_mismatch() {
        let content = InMemoryContentStore::new();
        let doc = stored(&content, b"original").await;
        content.overwrite(doc.content_ref().unwrap(), b"tampered");
        let verifier = IntegrityVerifier::new(Arc::new(content));

        let outcome = verifier.check(&doc).await.unwrap();
        assert_eq!(outcome.status, IntegrityStatus::Mismatch);
        assert!(outcome.detail.contains(&short_digest(&sha256_hex(b"original"))));
        assert!(outcome.detail.contains(&short_digest(&sha256_hex(b"tampered"))));
    }

    #[tokio::test]
    async fn test_removed_content_is_missing() {
        let content = InMemoryContentStore::new();
        let doc = stored(&content, b"bol").await;
        content.remove(doc.content_ref().unwrap());
        let verifier = IntegrityVerifier::new(Arc::new(content));

        let outcome = verifier.check(&doc).await.unwrap();
        assert_eq!(outcome.status, IntegrityStatus::Missing);
        assert_eq!(outcome.computed_hash, None);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transient() {
        let content = InMemoryContentStore::new();
        let doc = stored(&content, b"bol").await;
        content.set_offline(true);
        let verifier = IntegrityVerifier::new(Arc::new(content));

        let err = verifier.check(&doc).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let content = InMemoryContentStore::new();
        let doc = stored(&content, b"bol").await;
        content.set_latency(Duration::from_millis(200));
        let verifier = IntegrityVerifier::with_timeout(Arc::new(content), Duration::from_millis(20));

        let err = verifier.check(&doc).await.unwrap_err();
        assert!(matches!(err, VerifyError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_foreign_ref_is_fatal() {
        let doc = document(Some(Attachment::new(
            ContentRef::new("s3://elsewhere/1"),
            sha256_hex(b"x"),
        )
        .unwrap()));
        let verifier = IntegrityVerifier::new(Arc::new(InMemoryContentStore::new()));

        let err = verifier.check(&doc).await.unwrap_err();
        assert!(matches!(err, VerifyError::Fatal(_)));
    }
}
