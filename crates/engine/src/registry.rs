use std::sync::Arc;
use tracing::{debug, info};
use trade_ledger_types::{
    sha256_hex, unix_now, Attachment, ContentRef, DocType, Document, DocumentFilter, DocumentId,
    DocumentStatus, NewDocument, TransactionId, UserId,
};

use crate::content::ContentStore;
use crate::error::RegistryError;
use crate::store::LedgerStore;

/// Request to register a document outside the trade flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDocument {
    pub doc_type: DocType,
    pub doc_number: String,
    pub owner_id: UserId,
    pub transaction_id: Option<TransactionId>,
    pub content_ref: Option<ContentRef>,
    pub content_hash: Option<String>,
}

impl CreateDocument {
    pub fn new(doc_type: DocType, doc_number: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            doc_type,
            doc_number: doc_number.into(),
            owner_id,
            transaction_id: None,
            content_ref: None,
            content_hash: None,
        }
    }

    pub fn with_content(mut self, content_ref: ContentRef, content_hash: impl Into<String>) -> Self {
        self.content_ref = Some(content_ref);
        self.content_hash = Some(content_hash.into());
        self
    }

    pub fn in_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
}

/// Source of truth for documents and the hash recorded at upload
pub struct DocumentRegistry<S: LedgerStore> {
    store: Arc<S>,
    content: Arc<dyn ContentStore>,
}

impl<S: LedgerStore> DocumentRegistry<S> {
    pub fn new(store: Arc<S>, content: Arc<dyn ContentStore>) -> Self {
        Self { store, content }
    }

    pub fn content_store(&self) -> Arc<dyn ContentStore> {
        self.content.clone()
    }

    /// Register a document. Content ref and hash must both be set or both absent.
    pub async fn create(&self, req: CreateDocument) -> Result<DocumentId, RegistryError> {
        let doc_number = req.doc_number.trim();
        if doc_number.is_empty() {
            return Err(RegistryError::InvalidInput(
                "doc_number must not be empty".to_string(),
            ));
        }
        let attachment = Attachment::from_parts(req.content_ref, req.content_hash)?;

        let doc = self
            .store
            .insert_document(NewDocument {
                doc_type: req.doc_type,
                doc_number: doc_number.to_string(),
                owner_id: req.owner_id,
                transaction_id: req.transaction_id,
                attachment,
                status: DocumentStatus::Issued,
                created_at: unix_now(),
            })
            .await?;

        info!(
            document_id = %doc.id,
            doc_type = %doc.doc_type,
            has_content = doc.has_content(),
            "Document registered"
        );
        Ok(doc.id)
    }

    pub async fn get(&self, id: DocumentId) -> Result<Document, RegistryError> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("document {id}")))
    }

    pub async fn list(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RegistryError> {
        Ok(self.store.list_documents(filter).await?)
    }

    /// Store bytes and return the attachment (locator plus digest at upload)
    pub async fn attach(&self, bytes: &[u8]) -> Result<Attachment, RegistryError> {
        let content_hash = sha256_hex(bytes);
        let content_ref = self.content.put(bytes).await?;
        debug!(content_ref = %content_ref, content_hash = %content_hash, "Content stored");
        Ok(Attachment::new(content_ref, content_hash)?)
    }

    /// Store bytes and register a document pointing at them
    pub async fn upload(
        &self,
        req: CreateDocument,
        bytes: &[u8],
    ) -> Result<Document, RegistryError> {
        let attachment = self.attach(bytes).await?;
        let id = self
            .create({
                let (content_ref, content_hash) = attachment.into_parts();
                req.with_content(content_ref, content_hash)
            })
            .await?;
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemoryContentStore;
    use crate::store::InMemoryStore;
    use trade_ledger_types::DocumentInvariantError;

    fn registry() -> DocumentRegistry<InMemoryStore> {
        DocumentRegistry::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryContentStore::new()),
        )
    }

    #[tokio::test]
    async fn test_upload_records_hash_of_bytes() {
        let registry = registry();
        let doc = registry
            .upload(CreateDocument::new(DocType::Coo, "COO-7", UserId(3)), b"origin")
            .await
            .unwrap();

        assert_eq!(doc.content_hash(), Some(sha256_hex(b"origin").as_str()));
        assert_eq!(doc.status, DocumentStatus::Issued);
        let bytes = registry
            .content_store()
            .get(doc.content_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"origin");
    }

    #[tokio::test]
    async fn test_create_metadata_only() {
        let registry = registry();
        let id = registry
            .create(CreateDocument::new(DocType::InsuranceCert, "INS-1", UserId(3)))
            .await
            .unwrap();
        assert!(!registry.get(id).await.unwrap().has_content());
    }

    #[tokio::test]
    async fn test_create_rejects_half_attachment() {
        let registry = registry();
        let mut req = CreateDocument::new(DocType::Coo, "COO-1", UserId(3));
        req.content_hash = Some(sha256_hex(b"x"));
        let err = registry.create(req).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Invariant(DocumentInvariantError::HashWithoutRef(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let registry = registry();
        registry
            .create(CreateDocument::new(DocType::Coo, "COO-1", UserId(3)))
            .await
            .unwrap();
        assert!(matches!(
            registry
                .create(CreateDocument::new(DocType::Coo, "COO-1", UserId(4)))
                .await,
            Err(RegistryError::DuplicateDocNumber(_))
        ));
        assert!(matches!(
            registry.get(DocumentId(404)).await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
