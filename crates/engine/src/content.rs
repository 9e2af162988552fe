use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use trade_ledger_types::ContentRef;

use crate::error::ContentError;

// ═══════════════════════════════════════════════════════════════════════════
// CONTENT STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Blob storage for document bytes
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return the locator for them
    async fn put(&self, bytes: &[u8]) -> Result<ContentRef, ContentError>;

    /// Fetch the bytes behind a locator; [`ContentError::NotFound`] when absent
    async fn get(&self, content_ref: &ContentRef) -> Result<Vec<u8>, ContentError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY CONTENT STORE
// ═══════════════════════════════════════════════════════════════════════════

const MEM_SCHEME: &str = "mem://";

/// Content store backed by a map, with fault injection for tests
#[derive(Debug, Default, Clone)]
pub struct InMemoryContentStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    next_id: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
    failures_left: Arc<AtomicU32>,
    latency_ms: Arc<AtomicU64>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the bytes behind `content_ref` (for testing)
    pub fn overwrite(&self, content_ref: &ContentRef, bytes: &[u8]) {
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.insert(content_ref.as_str().to_string(), bytes.to_vec());
        }
    }

    /// Drop the bytes behind `content_ref` (for testing)
    pub fn remove(&self, content_ref: &ContentRef) {
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.remove(content_ref.as_str());
        }
    }

    /// Make every fetch fail as unavailable until switched back (for testing)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `n` fetches as unavailable (for testing)
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Delay every fetch (for testing)
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentRef, ContentError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let content_ref = ContentRef::new(format!("{MEM_SCHEME}{id}"));
        self.blobs
            .write()
            .map_err(|_| ContentError::Unavailable("content lock poisoned".to_string()))?
            .insert(content_ref.as_str().to_string(), bytes.to_vec());
        Ok(content_ref)
    }

    async fn get(&self, content_ref: &ContentRef) -> Result<Vec<u8>, ContentError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ContentError::Unavailable("content store offline".to_string()));
        }
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ContentError::Unavailable("injected failure".to_string()));
        }
        if !content_ref.as_str().starts_with(MEM_SCHEME) {
            return Err(ContentError::ForeignRef(content_ref.clone()));
        }
        self.blobs
            .read()
            .map_err(|_| ContentError::Unavailable("content lock poisoned".to_string()))?
            .get(content_ref.as_str())
            .cloned()
            .ok_or_else(|| ContentError::NotFound(content_ref.clone()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOCAL FILESYSTEM CONTENT STORE
// ═══════════════════════════════════════════════════════════════════════════

const LOCAL_SCHEME: &str = "local://";

/// One file per blob under a root directory
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, ContentError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ContentError::Io(format!("{}: {e}", root.display())))?;
        Ok(Self { root })
    }

    fn path_for(&self, content_ref: &ContentRef) -> Result<PathBuf, ContentError> {
        let name = content_ref
            .as_str()
            .strip_prefix(LOCAL_SCHEME)
            .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
            .ok_or_else(|| ContentError::ForeignRef(content_ref.clone()))?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentRef, ContentError> {
        let content_ref = ContentRef::new(format!("{LOCAL_SCHEME}{}", uuid::Uuid::new_v4()));
        let path = self.path_for(&content_ref)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ContentError::Io(format!("{}: {e}", path.display())))?;
        Ok(content_ref)
    }

    async fn get(&self, content_ref: &ContentRef) -> Result<Vec<u8>, ContentError> {
        let path = self.path_for(content_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ContentError::NotFound(content_ref.clone()))
            }
            Err(e) => Err(ContentError::Io(format!("{}: {e}", path.display()))),
        }
    }
}
