//! Collaborator traits for keepsake abstractions.
//!
//! The coordinator composes two stores with no shared transaction
//! coordinator: a relational [`RecordStore`] (transactional, rollback-able)
//! and a [`BlobStore`] (each call settles independently). These traits pin
//! down exactly the surface the consistency protocol needs: concrete
//! backends live in `keepsake-db` and `keepsake-blob`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AttachmentMeta, AttachmentRecord, NewOrphan, OwnerRecord};
use crate::owner::OwnerKind;

// =============================================================================
// BLOB STORE
// =============================================================================

/// Outcome of a single-key blob delete.
///
/// "The key was already gone" must be distinguishable from "the delete
/// failed": the former is success for cleanup purposes, the latter becomes
/// a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobDelete {
    Deleted,
    NotFound,
}

/// Binary attachment storage.
///
/// Implementations must be safe for concurrent use; the coordinator fans
/// out batch uploads against one shared handle.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write one blob. Overwriting an existing key is an implementation
    /// choice; the coordinator never reuses keys (UUIDv7 stamps).
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// Delete one blob, distinguishing not-found from failure.
    async fn delete(&self, key: &str) -> Result<BlobDelete>;

    /// Best-effort delete of every blob under a key prefix; returns the
    /// number of blobs removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Read one blob.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> Result<bool>;
}

// =============================================================================
// RECORD STORE
// =============================================================================

/// Relational storage for owner and attachment rows.
///
/// Reads on this trait see committed state only; writes happen inside a
/// [`RecordTxn`] and stay revocable until `commit`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn RecordTxn>>;

    /// Load one owner row.
    async fn load_owner(&self, kind: OwnerKind, id: Uuid) -> Result<Option<OwnerRecord>>;

    /// Load every gallery attachment row of one owner.
    async fn load_owner_attachments(
        &self,
        kind: OwnerKind,
        id: Uuid,
    ) -> Result<Vec<AttachmentRecord>>;

    /// Load specific attachment rows belonging to one owner. Rows that do
    /// not exist (or belong elsewhere) are simply absent from the result.
    async fn load_attachments(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<AttachmentRecord>>;

    /// Find an owner id by its natural key within a kind (conflict check).
    async fn find_by_natural_key(
        &self,
        kind: OwnerKind,
        natural_key: &str,
    ) -> Result<Option<Uuid>>;

    /// Number of committed gallery attachments for one owner.
    async fn gallery_count(&self, kind: OwnerKind, id: Uuid) -> Result<u32>;
}

/// One open transaction on the record store.
///
/// Pre-commit rows are pending writes: visible to reads on this handle
/// (read-your-own-writes), gone after `rollback`. Dropping the handle
/// without committing must roll back.
#[async_trait]
pub trait RecordTxn: Send {
    /// Insert an owner row.
    async fn insert_owner(&mut self, owner: &OwnerRecord) -> Result<()>;

    /// Bulk-insert gallery attachment rows.
    async fn insert_attachments(&mut self, rows: &[AttachmentRecord]) -> Result<()>;

    /// Set or clear the primary attachment metadata folded into the owner
    /// row, stamping `updated_at_utc` with `updated_at`. The caller passes
    /// the stamp so the record it returns matches what a later load sees.
    /// Absent owner is `OwnerNotFound`.
    async fn set_primary(
        &mut self,
        kind: OwnerKind,
        id: Uuid,
        meta: Option<&AttachmentMeta>,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Delete one owner row (attachment rows cascade); returns rows removed
    /// including cascaded attachment rows. Absent owner is `OwnerNotFound`.
    async fn delete_owner(&mut self, kind: OwnerKind, id: Uuid) -> Result<u64>;

    /// Delete specific attachment rows of one owner; returns rows removed.
    async fn delete_attachments(
        &mut self,
        kind: OwnerKind,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64>;

    /// Gallery count as seen inside this transaction, pending rows included.
    async fn gallery_count(&mut self, kind: OwnerKind, id: Uuid) -> Result<u32>;

    /// Make every pending write durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Revoke every pending write.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// ORPHAN LEDGER
// =============================================================================

/// Append-only record of blob paths whose deletion or compensation failed.
///
/// The ledger is the sole durable bridge between the two stores once a
/// transaction is gone; an external reconciliation process consumes it.
/// No dedup is required: double-recording a path is harmless, losing one
/// is not.
#[async_trait]
pub trait OrphanLedger: Send + Sync {
    /// Append one entry.
    async fn record(&self, orphan: NewOrphan) -> Result<()>;
}
