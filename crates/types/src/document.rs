use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{is_sha256_hex, DocumentId, Timestamp, TransactionId, UserId};

/// Trade document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    Loc,
    Invoice,
    BillOfLading,
    Po,
    Coo,
    InsuranceCert,
}

impl DocType {
    pub const ALL: [DocType; 6] = [
        DocType::Loc,
        DocType::Invoice,
        DocType::BillOfLading,
        DocType::Po,
        DocType::Coo,
        DocType::InsuranceCert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Loc => "LOC",
            DocType::Invoice => "INVOICE",
            DocType::BillOfLading => "BILL_OF_LADING",
            DocType::Po => "PO",
            DocType::Coo => "COO",
            DocType::InsuranceCert => "INSURANCE_CERT",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("doc_type", s))
    }
}

/// Lifecycle status of a single document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Issued,
    Verified,
    Shipped,
    Received,
    Paid,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 5] = [
        DocumentStatus::Issued,
        DocumentStatus::Verified,
        DocumentStatus::Shipped,
        DocumentStatus::Received,
        DocumentStatus::Paid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Issued => "ISSUED",
            DocumentStatus::Verified => "VERIFIED",
            DocumentStatus::Shipped => "SHIPPED",
            DocumentStatus::Received => "RECEIVED",
            DocumentStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("document_status", s))
    }
}

/// Opaque locator handed out by the content store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(pub String);

impl ContentRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored bytes of a document: where they live and what they hashed to at upload.
///
/// Fields are private so every attachment, built in code or decoded, carries
/// a well-formed lowercase SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AttachmentParts")]
pub struct Attachment {
    content_ref: ContentRef,
    content_hash: String,
}

#[derive(Deserialize)]
struct AttachmentParts {
    content_ref: ContentRef,
    content_hash: String,
}

impl TryFrom<AttachmentParts> for Attachment {
    type Error = DocumentInvariantError;

    fn try_from(parts: AttachmentParts) -> Result<Self, Self::Error> {
        Attachment::new(parts.content_ref, parts.content_hash)
    }
}

impl Attachment {
    pub fn new(
        content_ref: ContentRef,
        content_hash: impl Into<String>,
    ) -> Result<Self, DocumentInvariantError> {
        let content_hash = content_hash.into();
        if !is_sha256_hex(&content_hash) {
            return Err(DocumentInvariantError::MalformedHash(content_hash));
        }
        Ok(Self {
            content_ref,
            content_hash: content_hash.to_ascii_lowercase(),
        })
    }

    /// Build an optional attachment from the two nullable columns.
    ///
    /// Exactly one of the two being present violates the document invariant.
    pub fn from_parts(
        content_ref: Option<ContentRef>,
        content_hash: Option<String>,
    ) -> Result<Option<Self>, DocumentInvariantError> {
        match (content_ref, content_hash) {
            (None, None) => Ok(None),
            (Some(content_ref), Some(content_hash)) => {
                Self::new(content_ref, content_hash).map(Some)
            }
            (Some(content_ref), None) => Err(DocumentInvariantError::RefWithoutHash(content_ref)),
            (None, Some(content_hash)) => Err(DocumentInvariantError::HashWithoutRef(content_hash)),
        }
    }

    pub fn content_ref(&self) -> &ContentRef {
        &self.content_ref
    }

    /// Lowercase hex digest
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn into_parts(self) -> (ContentRef, String) {
        (self.content_ref, self.content_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentInvariantError {
    #[error("content_hash {0} present without content_ref")]
    HashWithoutRef(String),

    #[error("content_ref {0} present without content_hash")]
    RefWithoutHash(ContentRef),

    #[error("content_hash is not a hex SHA-256 digest: {0}")]
    MalformedHash(String),
}

/// Persisted trade document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub doc_type: DocType,
    pub doc_number: String,
    pub owner_id: UserId,
    /// Workflow this document belongs to; standalone uploads have none
    pub transaction_id: Option<TransactionId>,
    pub attachment: Option<Attachment>,
    pub status: DocumentStatus,
    pub created_at: Timestamp,
}

impl Document {
    pub fn content_ref(&self) -> Option<&ContentRef> {
        self.attachment.as_ref().map(Attachment::content_ref)
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.attachment.as_ref().map(Attachment::content_hash)
    }

    pub fn has_content(&self) -> bool {
        self.attachment.is_some()
    }
}

/// Document row to be inserted; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub doc_type: DocType,
    pub doc_number: String,
    pub owner_id: UserId,
    pub transaction_id: Option<TransactionId>,
    pub attachment: Option<Attachment>,
    pub status: DocumentStatus,
    pub created_at: Timestamp,
}

impl NewDocument {
    pub fn into_document(self, id: DocumentId) -> Document {
        Document {
            id,
            doc_type: self.doc_type,
            doc_number: self.doc_number,
            owner_id: self.owner_id,
            transaction_id: self.transaction_id,
            attachment: self.attachment,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Query over documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    /// Only documents created at or after this time
    pub created_since: Option<Timestamp>,
    /// Only documents with stored content
    pub with_content_only: bool,
    pub transaction_id: Option<TransactionId>,
}

impl DocumentFilter {
    pub fn with_content() -> Self {
        Self {
            with_content_only: true,
            ..Default::default()
        }
    }

    pub fn created_since(mut self, ts: Timestamp) -> Self {
        self.created_since = Some(ts);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if self.with_content_only && !doc.has_content() {
            return false;
        }
        if let Some(since) = self.created_since {
            if doc.created_at < since {
                return false;
            }
        }
        if let Some(tx) = self.transaction_id {
            if doc.transaction_id != Some(tx) {
                return false;
            }
        }
        true
    }
}

/// A persisted string column did not name a known enum variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {field}: {value}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}
