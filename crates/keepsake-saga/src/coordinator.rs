//! The attachment consistency saga.
//!
//! Owner rows live in the record store; their binary attachments live in
//! the blob store. The two share no transaction, so every mutation here
//! follows the same protocol: write pending rows, upload blobs *before*
//! commit, then either commit (all uploads landed) or roll back and
//! delete whatever did land. Post-commit removals of no-longer-referenced
//! blobs are best-effort; a failed removal becomes an orphan ledger entry
//! instead of a caller-visible error.
//!
//! The ordering gives two guarantees without cross-store atomicity:
//! every committed row points at an existing blob, and a failed batch
//! leaves neither rows nor blobs behind.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use keepsake_core::logging;
use keepsake_core::{
    blob_key, effective_content_type, extension_for, new_v7, owner_prefix, AttachmentMeta,
    AttachmentRecord, AttachmentUpload, BlobDelete, BlobStore, CreateOwner, DeleteReceipt, Error,
    GallerySpec, NewOrphan, OrphanLedger, OwnerKind, OwnerReceipt, OwnerRecord, RecordStore,
    RecordTxn, Result, UploadFailure,
};

use crate::batch::{BatchReport, BatchUploadExecutor, UploadJob};
use crate::locks::OwnerLockRegistry;
use crate::retry::RetryPolicy;

/// Orchestrates record rows and blobs through create, append, replace
/// and delete operations.
///
/// One coordinator serves every owner kind; the kind's descriptor
/// supplies the key prefix, slot names and gallery cap. Same-owner
/// operations serialize through [`OwnerLockRegistry`].
pub struct AttachmentCoordinator {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn OrphanLedger>,
    executor: BatchUploadExecutor,
    locks: OwnerLockRegistry,
}

/// What became of one post-commit blob removal.
enum Cleanup {
    Deleted,
    AlreadyGone,
    Ledgered,
    /// Delete failed and the ledger write failed too; the error log is
    /// the only remaining trace.
    Lost,
}

impl AttachmentCoordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn OrphanLedger>,
    ) -> Self {
        let executor = BatchUploadExecutor::new(Arc::clone(&blobs));
        Self {
            records,
            blobs,
            ledger,
            executor,
            locks: OwnerLockRegistry::new(),
        }
    }

    /// Replace the upload retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.executor = self.executor.with_retry(retry);
        self
    }

    /// Create an owner together with its initial attachments.
    ///
    /// The owner row and all gallery rows are written pending, every blob
    /// is uploaded, primary metadata is folded into the row, and only
    /// then does the transaction commit. Any failure in between rolls
    /// back and deletes every blob that already reached storage.
    pub async fn create_owner(&self, req: CreateOwner) -> Result<OwnerReceipt> {
        let CreateOwner {
            kind,
            fields,
            natural_key,
            primary,
            gallery,
        } = req;

        let owner_id = new_v7();
        let now = Utc::now();

        let primary_prepared = match (primary, kind.spec().primary_slot) {
            (Some(upload), Some(slot)) => Some(prepare_one(kind, owner_id, slot, upload)),
            (Some(_), None) => {
                return Err(Error::Validation(format!(
                    "{kind} has no primary attachment slot"
                )))
            }
            (None, _) => None,
        };

        let (gallery_rows, gallery_jobs) = if gallery.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let gallery_spec = require_gallery(kind)?;
            if gallery.len() as u32 > gallery_spec.cap {
                return Err(Error::Validation(format!(
                    "{kind} gallery holds at most {} attachments, {} given",
                    gallery_spec.cap,
                    gallery.len()
                )));
            }
            prepare_gallery(kind, owner_id, gallery_spec.slot, gallery, now)
        };

        // Uniqueness is checked before the transaction opens and is not
        // retried; a concurrent insert surfaces as Conflict from the
        // unique index instead.
        if let Some(key) = &natural_key {
            if self.records.find_by_natural_key(kind, key).await?.is_some() {
                return Err(Error::Conflict(format!(
                    "{kind} natural key already exists: {key}"
                )));
            }
        }

        let mut owner = OwnerRecord {
            id: owner_id,
            kind,
            fields,
            natural_key,
            primary: None,
            created_at_utc: now,
            updated_at_utc: now,
        };

        let mut txn = self.records.begin().await?;
        if let Err(e) = txn.insert_owner(&owner).await {
            rollback_quietly(txn).await;
            return Err(e);
        }
        if !gallery_rows.is_empty() {
            if let Err(e) = txn.insert_attachments(&gallery_rows).await {
                rollback_quietly(txn).await;
                return Err(e);
            }
        }
        debug!(
            subsystem = "saga",
            op = "create_owner",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_ROW_PENDING,
            batch_size = gallery_rows.len(),
            "Owner rows pending"
        );

        let (primary_meta, primary_job) = match primary_prepared {
            Some((meta, job)) => (Some(meta), Some(job)),
            None => (None, None),
        };
        let mut jobs: Vec<UploadJob> = Vec::new();
        jobs.extend(primary_job);
        jobs.extend(gallery_jobs);

        let report = self.upload_phase(kind, owner_id, jobs).await;
        if !report.all_succeeded() {
            return Err(self.abort_upload(txn, &report, "create_owner").await);
        }

        if let Some(meta) = &primary_meta {
            if let Err(e) = txn.set_primary(kind, owner_id, Some(meta), now).await {
                return Err(self.abort_db(txn, &report, "create_owner", e).await);
            }
        }

        if let Err(e) = txn.commit().await {
            return Err(self.commit_failed(&report, "create_owner", e).await);
        }

        owner.primary = primary_meta;
        info!(
            subsystem = "saga",
            op = "create_owner",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_COMMITTED,
            batch_size = report.attempted(),
            "Owner created"
        );

        Ok(OwnerReceipt {
            locator: owner.locator(),
            owner,
            gallery: gallery_rows,
        })
    }

    /// Append attachments to an owner's gallery.
    ///
    /// The whole batch commits or none of it does: one failed upload
    /// rejects the batch and deletes every sibling blob that made it.
    pub async fn append_gallery(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        uploads: Vec<AttachmentUpload>,
    ) -> Result<Vec<AttachmentRecord>> {
        if uploads.is_empty() {
            return Err(Error::Validation("no attachments to append".to_string()));
        }
        let gallery_spec = require_gallery(kind)?;

        let _guard = self.locks.lock(kind, owner_id).await;

        if self.records.load_owner(kind, owner_id).await?.is_none() {
            return Err(Error::OwnerNotFound { kind, id: owner_id });
        }

        // Cap check before any write or upload. The cap covers committed
        // plus requested rows, so it must read the current count.
        let current = self.records.gallery_count(kind, owner_id).await?;
        let requested = uploads.len() as u32;
        if current + requested > gallery_spec.cap {
            return Err(Error::Validation(format!(
                "{kind} gallery holds at most {} attachments ({current} present, {requested} requested)",
                gallery_spec.cap
            )));
        }

        let now = Utc::now();
        let (rows, jobs) = prepare_gallery(kind, owner_id, gallery_spec.slot, uploads, now);

        let mut txn = self.records.begin().await?;
        if let Err(e) = txn.insert_attachments(&rows).await {
            rollback_quietly(txn).await;
            return Err(e);
        }

        // Recheck inside the transaction: the in-process lock cannot see
        // writers in other processes.
        let pending_count = match txn.gallery_count(kind, owner_id).await {
            Ok(n) => n,
            Err(e) => {
                rollback_quietly(txn).await;
                return Err(e);
            }
        };
        if pending_count > gallery_spec.cap {
            rollback_quietly(txn).await;
            return Err(Error::Validation(format!(
                "{kind} gallery holds at most {} attachments",
                gallery_spec.cap
            )));
        }
        debug!(
            subsystem = "saga",
            op = "append_gallery",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_ROW_PENDING,
            batch_size = rows.len(),
            "Gallery rows pending"
        );

        let report = self.upload_phase(kind, owner_id, jobs).await;
        if !report.all_succeeded() {
            return Err(self.abort_upload(txn, &report, "append_gallery").await);
        }

        if let Err(e) = txn.commit().await {
            return Err(self.commit_failed(&report, "append_gallery", e).await);
        }

        info!(
            subsystem = "saga",
            op = "append_gallery",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_COMMITTED,
            batch_size = rows.len(),
            "Gallery appended"
        );
        Ok(rows)
    }

    /// Replace (or clear, with `None`) an owner's primary attachment.
    ///
    /// The previous blob is removed only after the new row state has
    /// committed; that removal is cleanup, not compensation, and its
    /// failure is ledgered rather than surfaced.
    pub async fn replace_primary(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        upload: Option<AttachmentUpload>,
    ) -> Result<OwnerRecord> {
        let slot = kind.spec().primary_slot.ok_or_else(|| {
            Error::Validation(format!("{kind} has no primary attachment slot"))
        })?;

        let _guard = self.locks.lock(kind, owner_id).await;

        let mut owner = self
            .records
            .load_owner(kind, owner_id)
            .await?
            .ok_or(Error::OwnerNotFound { kind, id: owner_id })?;

        // Capture the outgoing path now; after commit the row no longer
        // references it.
        let old = owner.primary.take();

        let (new_meta, new_job) = match upload.map(|u| prepare_one(kind, owner_id, slot, u)) {
            Some((meta, job)) => (Some(meta), Some(job)),
            None => (None, None),
        };

        // One stamp for both the row update and the returned record, so
        // the caller's copy matches what a reload would show.
        let now = Utc::now();
        let mut txn = self.records.begin().await?;
        if let Err(e) = txn.set_primary(kind, owner_id, new_meta.as_ref(), now).await {
            rollback_quietly(txn).await;
            return Err(e);
        }

        let report = self.upload_phase(kind, owner_id, new_job.into_iter().collect()).await;
        if !report.all_succeeded() {
            // The old blob is untouched and still referenced by the
            // rolled-back row state.
            return Err(self.abort_upload(txn, &report, "replace_primary").await);
        }

        if let Err(e) = txn.commit().await {
            return Err(self.commit_failed(&report, "replace_primary", e).await);
        }

        if let Some(old_meta) = &old {
            self.cleanup_blob(old_meta, "replace_primary").await;
        }

        info!(
            subsystem = "saga",
            op = "replace_primary",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_COMMITTED,
            cleared = new_meta.is_none(),
            "Primary attachment replaced"
        );

        owner.primary = new_meta;
        owner.updated_at_utc = now;
        Ok(owner)
    }

    /// Delete an owner, its attachment rows, and (best-effort) its blobs.
    ///
    /// The operation is defined as successful once the row delete
    /// commits; blob removals that fail afterwards are ledgered, never
    /// re-raised. A second delete of the same owner returns
    /// `OwnerNotFound` without touching storage.
    pub async fn delete_owner(&self, kind: OwnerKind, owner_id: Uuid) -> Result<DeleteReceipt> {
        let _guard = self.locks.lock(kind, owner_id).await;

        // Load everything eagerly; after the row delete commits there is
        // nothing left to ask.
        let owner = self
            .records
            .load_owner(kind, owner_id)
            .await?
            .ok_or(Error::OwnerNotFound { kind, id: owner_id })?;
        let attachments = self.records.load_owner_attachments(kind, owner_id).await?;

        let mut txn = self.records.begin().await?;
        let rows_deleted = match txn.delete_owner(kind, owner_id).await {
            Ok(n) => n,
            Err(e) => {
                rollback_quietly(txn).await;
                return Err(e);
            }
        };
        if let Err(e) = txn.commit().await {
            return Err(Error::Transaction(format!(
                "commit failed in delete_owner: {e}"
            )));
        }

        let mut receipt = DeleteReceipt {
            rows_deleted,
            blobs_deleted: 0,
            blobs_ledgered: 0,
        };

        debug!(
            subsystem = "saga",
            op = "delete_owner",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_CLEANUP_PENDING,
            rows_deleted,
            "Owner rows deleted, removing blobs"
        );

        if let Some(primary) = &owner.primary {
            self.tally(self.cleanup_blob(primary, "delete_owner").await, &mut receipt);
        }
        for attachment in &attachments {
            self.tally(
                self.cleanup_blob(&attachment.meta(), "delete_owner").await,
                &mut receipt,
            );
        }

        // Sweep the whole prefix for blobs the rows did not know about
        // (earlier half-compensated failures, manual uploads).
        let prefix = owner_prefix(kind, owner_id);
        match self.blobs.delete_prefix(&prefix).await {
            Ok(n) => receipt.blobs_deleted += n,
            Err(e) => {
                warn!(
                    blob_prefix = %prefix,
                    error = %e,
                    phase = logging::PHASE_CLEANUP_FAILED,
                    "Prefix sweep failed, ledgering"
                );
                if self.ledger_orphan(NewOrphan::prefix(prefix, "delete_owner")).await {
                    receipt.blobs_ledgered += 1;
                }
            }
        }

        info!(
            subsystem = "saga",
            op = "delete_owner",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_CLEANUP_DONE,
            rows_deleted = receipt.rows_deleted,
            deleted_count = receipt.blobs_deleted,
            ledgered_count = receipt.blobs_ledgered,
            "Owner deleted"
        );
        Ok(receipt)
    }

    /// Delete specific gallery attachments of one owner.
    ///
    /// Ids that no longer exist are skipped; if none exist the call
    /// returns `NotFound`. Blob removal follows the same post-commit
    /// best-effort rules as [`delete_owner`](Self::delete_owner).
    pub async fn delete_attachments(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<DeleteReceipt> {
        if ids.is_empty() {
            return Err(Error::Validation("no attachment ids given".to_string()));
        }

        let _guard = self.locks.lock(kind, owner_id).await;

        let rows = self.records.load_attachments(kind, owner_id, ids).await?;
        if rows.is_empty() {
            return Err(Error::NotFound(format!(
                "no matching attachments for {kind} {owner_id}"
            )));
        }
        let row_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let mut txn = self.records.begin().await?;
        let rows_deleted = match txn.delete_attachments(kind, owner_id, &row_ids).await {
            Ok(n) => n,
            Err(e) => {
                rollback_quietly(txn).await;
                return Err(e);
            }
        };
        if let Err(e) = txn.commit().await {
            return Err(Error::Transaction(format!(
                "commit failed in delete_attachments: {e}"
            )));
        }

        let mut receipt = DeleteReceipt {
            rows_deleted,
            blobs_deleted: 0,
            blobs_ledgered: 0,
        };
        for row in &rows {
            self.tally(
                self.cleanup_blob(&row.meta(), "delete_attachments").await,
                &mut receipt,
            );
        }

        info!(
            subsystem = "saga",
            op = "delete_attachments",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_CLEANUP_DONE,
            rows_deleted = receipt.rows_deleted,
            deleted_count = receipt.blobs_deleted,
            ledgered_count = receipt.blobs_ledgered,
            "Attachments deleted"
        );
        Ok(receipt)
    }

    async fn upload_phase(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        jobs: Vec<UploadJob>,
    ) -> BatchReport {
        if jobs.is_empty() {
            return BatchReport {
                outcomes: Vec::new(),
            };
        }
        debug!(
            subsystem = "saga",
            owner_kind = %kind,
            owner_id = %owner_id,
            phase = logging::PHASE_UPLOAD_PENDING,
            batch_size = jobs.len(),
            "Uploading blobs"
        );
        let report = self.executor.upload_all(jobs).await;
        if report.all_succeeded() {
            debug!(
                subsystem = "saga",
                owner_kind = %kind,
                owner_id = %owner_id,
                phase = logging::PHASE_UPLOAD_OK,
                batch_size = report.attempted(),
                "Upload batch landed"
            );
        }
        report
    }

    /// Roll back and compensate after a failed upload phase.
    ///
    /// Compensation targets every key the report says was uploaded, not
    /// only the failures; the whole batch is rejected as a unit.
    async fn abort_upload(
        &self,
        txn: Box<dyn RecordTxn>,
        report: &BatchReport,
        context: &str,
    ) -> Error {
        warn!(
            subsystem = "saga",
            op = context,
            phase = logging::PHASE_UPLOAD_FAILED,
            attempted = report.attempted(),
            failed = report.failed_keys().len(),
            "Upload batch failed, rolling back"
        );

        let rollback_failed = match txn.rollback().await {
            Ok(()) => {
                debug!(
                    subsystem = "saga",
                    op = context,
                    phase = logging::PHASE_ROLLED_BACK,
                    "Transaction rolled back"
                );
                false
            }
            Err(e) => {
                error!(op = context, error = %e, "Rollback failed after upload failure");
                true
            }
        };

        let compensated_keys = self.compensate(report, context).await;
        info!(
            subsystem = "saga",
            op = context,
            phase = logging::PHASE_COMPENSATED,
            compensated = compensated_keys.len(),
            "Uploads compensated"
        );

        if rollback_failed {
            Error::Transaction(format!("rollback failed after upload failure in {context}"))
        } else {
            Error::Upload(UploadFailure {
                attempted: report.attempted(),
                failed_keys: report.failed_keys(),
                compensated_keys,
            })
        }
    }

    /// Roll back and compensate after a database error that struck once
    /// uploads had already landed.
    async fn abort_db(
        &self,
        txn: Box<dyn RecordTxn>,
        report: &BatchReport,
        context: &str,
        cause: Error,
    ) -> Error {
        let rollback_failed = match txn.rollback().await {
            Ok(()) => false,
            Err(e) => {
                error!(op = context, error = %e, "Rollback failed");
                true
            }
        };
        self.compensate(report, context).await;

        if rollback_failed {
            Error::Transaction(format!("rollback failed in {context}"))
        } else {
            cause
        }
    }

    /// The commit itself failed: rows are gone, uploaded blobs are not.
    async fn commit_failed(&self, report: &BatchReport, context: &str, cause: Error) -> Error {
        error!(op = context, error = %cause, "Commit failed, compensating uploads");
        self.compensate(report, context).await;
        Error::Transaction(format!("commit failed in {context}: {cause}"))
    }

    /// Delete every uploaded blob of an aborted batch. Returns the keys
    /// confirmed gone; a key whose delete fails is ledgered instead.
    async fn compensate(&self, report: &BatchReport, context: &str) -> Vec<String> {
        let mut compensated = Vec::new();
        for outcome in report.uploaded() {
            match self.blobs.delete(&outcome.key).await {
                // NotFound still means the blob is gone, which is all
                // compensation promises.
                Ok(_) => compensated.push(outcome.key.clone()),
                Err(e) => {
                    warn!(
                        blob_key = %outcome.key,
                        error = %e,
                        phase = logging::PHASE_COMPENSATING,
                        "Compensation delete failed, ledgering"
                    );
                    let meta = AttachmentMeta {
                        path: outcome.key.clone(),
                        size_bytes: outcome.size_bytes,
                        content_type: outcome.content_type.clone(),
                    };
                    self.ledger_orphan(NewOrphan::blob(&meta, context)).await;
                }
            }
        }
        compensated
    }

    /// Post-commit removal of one no-longer-referenced blob.
    async fn cleanup_blob(&self, meta: &AttachmentMeta, context: &str) -> Cleanup {
        match self.blobs.delete(&meta.path).await {
            Ok(BlobDelete::Deleted) => Cleanup::Deleted,
            Ok(BlobDelete::NotFound) => Cleanup::AlreadyGone,
            Err(e) => {
                warn!(
                    blob_key = %meta.path,
                    error = %e,
                    phase = logging::PHASE_CLEANUP_FAILED,
                    "Cleanup delete failed, ledgering"
                );
                if self.ledger_orphan(NewOrphan::blob(meta, context)).await {
                    Cleanup::Ledgered
                } else {
                    Cleanup::Lost
                }
            }
        }
    }

    fn tally(&self, outcome: Cleanup, receipt: &mut DeleteReceipt) {
        match outcome {
            Cleanup::Deleted => receipt.blobs_deleted += 1,
            Cleanup::AlreadyGone => {}
            Cleanup::Ledgered => receipt.blobs_ledgered += 1,
            Cleanup::Lost => {}
        }
    }

    /// Append to the orphan ledger, swallowing failures. The ledger is
    /// the last line of defense and must never throw past this point.
    async fn ledger_orphan(&self, orphan: NewOrphan) -> bool {
        let path = orphan.path.clone();
        match self.ledger.record(orphan).await {
            Ok(()) => true,
            Err(e) => {
                error!(blob_key = %path, error = %e, "Orphan ledger write failed");
                false
            }
        }
    }
}

fn require_gallery(kind: OwnerKind) -> Result<GallerySpec> {
    kind.gallery()
        .ok_or_else(|| Error::Validation(format!("{kind} has no gallery")))
}

/// Resolve the effective content type and mint the blob key for one
/// incoming upload.
fn prepare_one(
    kind: OwnerKind,
    owner_id: Uuid,
    slot: &str,
    upload: AttachmentUpload,
) -> (AttachmentMeta, UploadJob) {
    let content_type = effective_content_type(&upload.content_type, &upload.bytes);
    let key = blob_key(kind, owner_id, slot, extension_for(&content_type));
    let meta = AttachmentMeta {
        path: key.clone(),
        size_bytes: upload.size_bytes(),
        content_type: content_type.clone(),
    };
    (
        meta,
        UploadJob {
            key,
            bytes: upload.bytes,
            content_type,
        },
    )
}

fn prepare_gallery(
    kind: OwnerKind,
    owner_id: Uuid,
    slot: &str,
    uploads: Vec<AttachmentUpload>,
    now: chrono::DateTime<chrono::Utc>,
) -> (Vec<AttachmentRecord>, Vec<UploadJob>) {
    let mut rows = Vec::with_capacity(uploads.len());
    let mut jobs = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let (meta, job) = prepare_one(kind, owner_id, slot, upload);
        rows.push(AttachmentRecord {
            id: new_v7(),
            owner_id,
            owner_kind: kind,
            path: meta.path,
            size_bytes: meta.size_bytes,
            content_type: meta.content_type,
            created_at_utc: now,
        });
        jobs.push(job);
    }
    (rows, jobs)
}

async fn rollback_quietly(txn: Box<dyn RecordTxn>) {
    if let Err(e) = txn.rollback().await {
        error!(error = %e, "Rollback failed");
    }
}
