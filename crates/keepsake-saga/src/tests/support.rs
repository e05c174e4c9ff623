//! In-memory fakes for exercising the coordinator without Postgres or a
//! filesystem.
//!
//! `MemoryRecordStore` gives real transaction semantics (snapshot on
//! begin, publish on commit, discard on rollback or drop) so the tests
//! observe exactly what a caller racing the saga would observe.
//! `FlakyBlobStore` wraps the in-memory blob store with scriptable
//! failures for uploads, deletes and prefix sweeps.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use keepsake_blob::MemoryBlobStore;
use keepsake_core::{
    AttachmentMeta, AttachmentRecord, AttachmentUpload, BlobDelete, BlobStore, Error, NewOrphan,
    OrphanLedger, OwnerKind, OwnerRecord, RecordStore, RecordTxn, Result,
};

use crate::coordinator::AttachmentCoordinator;

// =============================================================================
// Record store fake
// =============================================================================

#[derive(Debug, Default, Clone)]
struct Tables {
    owners: Vec<OwnerRecord>,
    attachments: Vec<AttachmentRecord>,
}

/// Failure switches shared between the store and its live transactions.
#[derive(Debug, Default)]
pub struct TxnFailures {
    pub commit: AtomicBool,
    pub set_primary: AtomicBool,
    pub insert_attachments: AtomicBool,
    /// Extra gallery rows visible only to in-transaction counts, as if
    /// another process committed them after the pool-side read.
    pub phantom_gallery_rows: AtomicU32,
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Arc<Mutex<Tables>>,
    pub failures: Arc<TxnFailures>,
}

impl MemoryRecordStore {
    pub fn owner(&self, kind: OwnerKind, id: Uuid) -> Option<OwnerRecord> {
        self.tables
            .lock()
            .unwrap()
            .owners
            .iter()
            .find(|o| o.kind == kind && o.id == id)
            .cloned()
    }

    pub fn owner_count(&self) -> usize {
        self.tables.lock().unwrap().owners.len()
    }

    pub fn attachment_rows(&self, kind: OwnerKind, id: Uuid) -> Vec<AttachmentRecord> {
        self.tables
            .lock()
            .unwrap()
            .attachments
            .iter()
            .filter(|a| a.owner_kind == kind && a.owner_id == id)
            .cloned()
            .collect()
    }

    pub fn attachment_count(&self) -> usize {
        self.tables.lock().unwrap().attachments.len()
    }

    /// Insert committed rows directly, bypassing the saga.
    pub fn seed_owner(&self, owner: OwnerRecord) {
        self.tables.lock().unwrap().owners.push(owner);
    }

    pub fn seed_attachment(&self, row: AttachmentRecord) {
        self.tables.lock().unwrap().attachments.push(row);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn RecordTxn>> {
        let working = self.tables.lock().unwrap().clone();
        Ok(Box::new(MemoryTxn {
            tables: Arc::clone(&self.tables),
            working,
            failures: Arc::clone(&self.failures),
        }))
    }

    async fn load_owner(&self, kind: OwnerKind, id: Uuid) -> Result<Option<OwnerRecord>> {
        Ok(self.owner(kind, id))
    }

    async fn load_owner_attachments(
        &self,
        kind: OwnerKind,
        id: Uuid,
    ) -> Result<Vec<AttachmentRecord>> {
        Ok(self.attachment_rows(kind, id))
    }

    async fn load_attachments(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<AttachmentRecord>> {
        Ok(self
            .attachment_rows(kind, owner_id)
            .into_iter()
            .filter(|a| ids.contains(&a.id))
            .collect())
    }

    async fn find_by_natural_key(
        &self,
        kind: OwnerKind,
        natural_key: &str,
    ) -> Result<Option<Uuid>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .owners
            .iter()
            .find(|o| o.kind == kind && o.natural_key.as_deref() == Some(natural_key))
            .map(|o| o.id))
    }

    async fn gallery_count(&self, kind: OwnerKind, id: Uuid) -> Result<u32> {
        Ok(self.attachment_rows(kind, id).len() as u32)
    }
}

/// Snapshot transaction: mutates a private copy, publishes it on commit.
struct MemoryTxn {
    tables: Arc<Mutex<Tables>>,
    working: Tables,
    failures: Arc<TxnFailures>,
}

#[async_trait]
impl RecordTxn for MemoryTxn {
    async fn insert_owner(&mut self, owner: &OwnerRecord) -> Result<()> {
        if let Some(key) = &owner.natural_key {
            let taken = self
                .working
                .owners
                .iter()
                .any(|o| o.kind == owner.kind && o.natural_key.as_deref() == Some(key.as_str()));
            if taken {
                return Err(Error::Conflict(format!(
                    "{} natural key already exists: {key}",
                    owner.kind
                )));
            }
        }
        self.working.owners.push(owner.clone());
        Ok(())
    }

    async fn insert_attachments(&mut self, rows: &[AttachmentRecord]) -> Result<()> {
        if self.failures.insert_attachments.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected insert failure".to_string()));
        }
        self.working.attachments.extend(rows.iter().cloned());
        Ok(())
    }

    async fn set_primary(
        &mut self,
        kind: OwnerKind,
        id: Uuid,
        meta: Option<&AttachmentMeta>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.failures.set_primary.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected set_primary failure".to_string()));
        }
        let owner = self
            .working
            .owners
            .iter_mut()
            .find(|o| o.kind == kind && o.id == id)
            .ok_or(Error::OwnerNotFound { kind, id })?;
        owner.primary = meta.cloned();
        owner.updated_at_utc = updated_at;
        Ok(())
    }

    async fn delete_owner(&mut self, kind: OwnerKind, id: Uuid) -> Result<u64> {
        let owners_before = self.working.owners.len();
        self.working.owners.retain(|o| !(o.kind == kind && o.id == id));
        if self.working.owners.len() == owners_before {
            return Err(Error::OwnerNotFound { kind, id });
        }
        let rows_before = self.working.attachments.len();
        self.working
            .attachments
            .retain(|a| !(a.owner_kind == kind && a.owner_id == id));
        Ok(1 + (rows_before - self.working.attachments.len()) as u64)
    }

    async fn delete_attachments(
        &mut self,
        kind: OwnerKind,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64> {
        let before = self.working.attachments.len();
        self.working.attachments.retain(|a| {
            !(a.owner_kind == kind && a.owner_id == owner_id && ids.contains(&a.id))
        });
        Ok((before - self.working.attachments.len()) as u64)
    }

    async fn gallery_count(&mut self, kind: OwnerKind, id: Uuid) -> Result<u32> {
        let pending = self
            .working
            .attachments
            .iter()
            .filter(|a| a.owner_kind == kind && a.owner_id == id)
            .count() as u32;
        Ok(pending + self.failures.phantom_gallery_rows.load(Ordering::SeqCst))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.failures.commit.load(Ordering::SeqCst) {
            return Err(Error::Transaction("injected commit failure".to_string()));
        }
        let this = *self;
        *this.tables.lock().unwrap() = this.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Blob store fake
// =============================================================================

#[derive(Debug, Default)]
enum PutPlan {
    #[default]
    Pass,
    /// Fail every put whose key contains the needle.
    FailMatching(String),
    /// Fail the next N puts, then pass.
    FailNext(usize),
    /// Fail the nth put call (1-based arrival order).
    FailNth { nth: usize, seen: usize },
}

/// Blob store with scriptable failures, delegating to [`MemoryBlobStore`].
#[derive(Debug, Default)]
pub struct FlakyBlobStore {
    pub inner: MemoryBlobStore,
    plan: Mutex<PutPlan>,
    delete_needles: Mutex<Vec<String>>,
    fail_sweep: AtomicBool,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FlakyBlobStore {
    pub fn fail_puts_containing(&self, needle: &str) {
        *self.plan.lock().unwrap() = PutPlan::FailMatching(needle.to_string());
    }

    pub fn fail_next_puts(&self, n: usize) {
        *self.plan.lock().unwrap() = PutPlan::FailNext(n);
    }

    pub fn fail_nth_put(&self, nth: usize) {
        *self.plan.lock().unwrap() = PutPlan::FailNth { nth, seen: 0 };
    }

    pub fn fail_deletes_containing(&self, needle: &str) {
        self.delete_needles.lock().unwrap().push(needle.to_string());
    }

    pub fn fail_prefix_sweeps(&self) {
        self.fail_sweep.store(true, Ordering::SeqCst);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        *self.plan.lock().unwrap() = PutPlan::Pass;
        self.delete_needles.lock().unwrap().clear();
        self.fail_sweep.store(false, Ordering::SeqCst);
    }

    fn put_should_fail(&self, key: &str) -> bool {
        let mut plan = self.plan.lock().unwrap();
        match &mut *plan {
            PutPlan::Pass => false,
            PutPlan::FailMatching(needle) => key.contains(needle.as_str()),
            PutPlan::FailNext(remaining) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            }
            PutPlan::FailNth { nth, seen } => {
                *seen += 1;
                *seen == *nth
            }
        }
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.put_should_fail(key) {
            return Err(Error::Blob(format!("injected put failure: {key}")));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn delete(&self, key: &str) -> Result<BlobDelete> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let blocked = self
            .delete_needles
            .lock()
            .unwrap()
            .iter()
            .any(|needle| key.contains(needle.as_str()));
        if blocked {
            return Err(Error::Blob(format!("injected delete failure: {key}")));
        }
        self.inner.delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        if self.fail_sweep.load(Ordering::SeqCst) {
            return Err(Error::Blob(format!("injected sweep failure: {prefix}")));
        }
        self.inner.delete_prefix(prefix).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.read(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }
}

// =============================================================================
// Orphan ledger fake
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<NewOrphan>>,
    fail: AtomicBool,
}

impl MemoryLedger {
    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<NewOrphan> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrphanLedger for MemoryLedger {
    async fn record(&self, orphan: NewOrphan) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected ledger failure".to_string()));
        }
        self.entries.lock().unwrap().push(orphan);
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// One coordinator wired to all three fakes, each kept reachable for
/// seeding and assertions.
pub struct Harness {
    pub coordinator: AttachmentCoordinator,
    pub records: Arc<MemoryRecordStore>,
    pub blobs: Arc<FlakyBlobStore>,
    pub ledger: Arc<MemoryLedger>,
}

pub fn harness() -> Harness {
    let records = Arc::new(MemoryRecordStore::default());
    let blobs = Arc::new(FlakyBlobStore::default());
    let ledger = Arc::new(MemoryLedger::default());
    let record_store: Arc<dyn RecordStore> = records.clone();
    let blob_store: Arc<dyn BlobStore> = blobs.clone();
    let orphan_ledger: Arc<dyn OrphanLedger> = ledger.clone();
    let coordinator = AttachmentCoordinator::new(record_store, blob_store, orphan_ledger);
    Harness {
        coordinator,
        records,
        blobs,
        ledger,
    }
}

/// PNG upload with a real magic signature plus `filler` padding bytes.
pub fn png_upload(filler: usize) -> AttachmentUpload {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.resize(bytes.len() + filler, 0);
    AttachmentUpload::new(bytes, "image/png")
}

/// JPEG upload with a real magic signature plus `filler` padding bytes.
pub fn jpeg_upload(filler: usize) -> AttachmentUpload {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(bytes.len() + filler, 0);
    AttachmentUpload::new(bytes, "image/jpeg")
}
