//! In-memory blob store.
//!
//! Backs local development and the saga test suites, where spinning up a
//! real storage root is noise. Keys behave exactly as in [`FsBlobStore`]:
//! flat strings, prefix deletion by string match.
//!
//! [`FsBlobStore`]: crate::FsBlobStore

use std::collections::HashMap;

use async_trait::async_trait;
use keepsake_core::{BlobDelete, BlobStore, Error, Result};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    content_type: String,
}

/// Blob store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// All stored keys, sorted for stable assertions.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn content_type_of(&self, key: &str) -> Option<String> {
        self.blobs
            .read()
            .await
            .get(key)
            .map(|blob| blob.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::Validation("blob key is empty".into()));
        }
        self.blobs.write().await.insert(
            key.to_string(),
            StoredBlob {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<BlobDelete> {
        match self.blobs.write().await.remove(key) {
            Some(_) => Ok(BlobDelete::Deleted),
            None => Ok(BlobDelete::NotFound),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut blobs = self.blobs.write().await;
        let before = blobs.len();
        blobs.retain(|key, _| !key.starts_with(prefix));
        Ok((before - blobs.len()) as u64)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(key)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| Error::NotFound(format!("blob not found: {key}")))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.read().await.contains_key(key))
    }
}
