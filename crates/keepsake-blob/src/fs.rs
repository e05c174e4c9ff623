//! Filesystem-backed blob store.
//!
//! Blobs live under a single root directory, addressed by their relative
//! key (`albums/{owner}/images/{uuid}.jpg`). Writes go through a temp file
//! and an atomic rename so a crash mid-write never leaves a partial blob
//! at the final key.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use keepsake_core::{BlobDelete, BlobStore, Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Probe key used by [`FsBlobStore::validate`].
const VALIDATE_KEY: &str = ".keepsake-validate";
const VALIDATE_CONTENT: &[u8] = b"keepsake blob store validation probe";

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to its on-disk path.
    ///
    /// Keys are relative paths produced by the key builder; anything that
    /// could escape the root (absolute paths, `..` segments) is rejected.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::Validation("blob key is empty".into()));
        }
        let rel = Path::new(key);
        for component in rel.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "blob key escapes storage root: {key}"
                    )))
                }
            }
        }
        Ok(self.root.join(rel))
    }

    /// Verify the root is writable with a write/read/delete round-trip.
    ///
    /// Intended for startup so a misconfigured root fails fast instead of
    /// surfacing as upload errors under load.
    pub async fn validate(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            Error::Blob(format!(
                "cannot create storage root {}: {e}",
                self.root.display()
            ))
        })?;

        self.put(VALIDATE_KEY, VALIDATE_CONTENT, "application/octet-stream")
            .await?;
        let read_back = self.read(VALIDATE_KEY).await?;
        self.delete(VALIDATE_KEY).await?;

        if read_back != VALIDATE_CONTENT {
            return Err(Error::Blob(format!(
                "storage root {} failed read-back validation",
                self.root.display()
            )));
        }

        debug!(root = %self.root.display(), "Storage root validated");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::Blob(format!("cannot create directory {}: {e}", parent.display()))
            })?;
        }

        // Write to a temp file, fsync, then rename into place.
        let temp = path.with_extension("tmp");
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| Error::Blob(format!("cannot create {}: {e}", temp.display())))?;
        file.write_all(data)
            .await
            .map_err(|e| Error::Blob(format!("cannot write {}: {e}", temp.display())))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Blob(format!("cannot sync {}: {e}", temp.display())))?;
        drop(file);

        fs::rename(&temp, &path).await.map_err(|e| {
            Error::Blob(format!(
                "cannot rename {} to {}: {e}",
                temp.display(),
                path.display()
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o644);
            if let Err(e) = fs::set_permissions(&path, perms).await {
                warn!(blob_key = key, error = ?e, "Failed to set blob permissions");
            }
        }

        debug!(blob_key = key, size_bytes = data.len(), "Blob stored");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<BlobDelete> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(BlobDelete::Deleted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BlobDelete::NotFound),
            Err(e) => Err(Error::Blob(format!(
                "cannot delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let dir = self.resolve(prefix.trim_end_matches('/'))?;
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Blob(format!(
                    "prefix {} is not a directory",
                    dir.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(Error::Blob(format!("cannot stat {}: {e}", dir.display())))
            }
        }

        // Remove files one by one so the returned count stays accurate
        // even if the walk dies partway through.
        let mut removed = 0u64;
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current)
                .await
                .map_err(|e| Error::Blob(format!("cannot read {}: {e}", current.display())))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::Blob(format!("cannot read {}: {e}", current.display())))?
            {
                let entry_path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| {
                    Error::Blob(format!("cannot stat {}: {e}", entry_path.display()))
                })?;
                if file_type.is_dir() {
                    pending.push(entry_path);
                } else {
                    fs::remove_file(&entry_path).await.map_err(|e| {
                        Error::Blob(format!("cannot delete {}: {e}", entry_path.display()))
                    })?;
                    removed += 1;
                }
            }
        }

        // The emptied directory skeleton is cosmetic; ignore failures.
        let _ = fs::remove_dir_all(&dir).await;

        debug!(blob_prefix = prefix, deleted_count = removed, "Prefix swept");
        Ok(removed)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob not found: {key}")))
            }
            Err(e) => Err(Error::Blob(format!("cannot read {}: {e}", path.display()))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Blob(format!("cannot stat {}: {e}", path.display()))),
        }
    }
}
