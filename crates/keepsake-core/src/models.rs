//! Core data models for keepsake.
//!
//! These types are shared across all keepsake crates and represent the
//! owner/attachment domain entities plus the orphan ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::owner::OwnerKind;

// =============================================================================
// ATTACHMENT TYPES
// =============================================================================

/// Metadata for one stored blob, as folded into owner/attachment rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// Unique blob key, `{prefix}/{owner_id}/{slot}/{stamp}.{ext}`.
    pub path: String,
    pub size_bytes: i64,
    pub content_type: String,
}

/// A committed gallery attachment row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_kind: OwnerKind,
    /// Unique blob key this row references.
    pub path: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub created_at_utc: DateTime<Utc>,
}

impl AttachmentRecord {
    /// The blob metadata view of this row.
    pub fn meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            path: self.path.clone(),
            size_bytes: self.size_bytes,
            content_type: self.content_type.clone(),
        }
    }
}

/// An incoming in-memory binary attachment.
///
/// Size and content type are declared by the (upstream-validated) request;
/// the effective content type is re-resolved from magic bytes before a key
/// is computed.
#[derive(Clone)]
pub struct AttachmentUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
}

impl AttachmentUpload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn size_bytes(&self) -> i64 {
        self.bytes.len() as i64
    }
}

impl std::fmt::Debug for AttachmentUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentUpload")
            .field("size_bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish()
    }
}

// =============================================================================
// OWNER TYPES
// =============================================================================

/// An owner row: the entity that carries attachments.
///
/// Domain field values are opaque JSON to this core; they are validated and
/// interpreted upstream. The primary attachment's metadata is folded into
/// the row itself (not a separate attachment row), matching how thumbnails
/// and covers are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub id: Uuid,
    pub kind: OwnerKind,
    /// Opaque domain fields (title, body, contact info, ...).
    pub fields: JsonValue,
    /// Optional uniqueness key within the kind (e.g. album title slug).
    pub natural_key: Option<String>,
    /// Primary attachment metadata, when the kind has a primary slot.
    pub primary: Option<AttachmentMeta>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl OwnerRecord {
    /// Resource locator for the HTTP layer's Location header.
    pub fn locator(&self) -> String {
        format!("/{}/{}", self.kind.spec().route, self.id.as_hyphenated())
    }
}

/// Command to create an owner, optionally with attachments.
#[derive(Debug, Clone)]
pub struct CreateOwner {
    pub kind: OwnerKind,
    pub fields: JsonValue,
    pub natural_key: Option<String>,
    /// Primary attachment (thumbnail/cover), if the kind has that slot.
    pub primary: Option<AttachmentUpload>,
    /// Gallery attachments, capped by the kind's descriptor.
    pub gallery: Vec<AttachmentUpload>,
}

impl CreateOwner {
    pub fn new(kind: OwnerKind, fields: JsonValue) -> Self {
        Self {
            kind,
            fields,
            natural_key: None,
            primary: None,
            gallery: Vec::new(),
        }
    }

    pub fn with_natural_key(mut self, key: impl Into<String>) -> Self {
        self.natural_key = Some(key.into());
        self
    }

    pub fn with_primary(mut self, upload: AttachmentUpload) -> Self {
        self.primary = Some(upload);
        self
    }

    pub fn with_gallery(mut self, uploads: Vec<AttachmentUpload>) -> Self {
        self.gallery = uploads;
        self
    }
}

/// Result of a successful owner creation.
#[derive(Debug, Clone)]
pub struct OwnerReceipt {
    pub owner: OwnerRecord,
    pub gallery: Vec<AttachmentRecord>,
    /// `/{route}/{id}`, for the HTTP layer's Location header.
    pub locator: String,
}

/// Result of a successful owner/attachment deletion.
///
/// Blob counts are informational: a delete that commits the row side is
/// successful regardless of blob cleanup outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReceipt {
    /// Rows removed inside the transaction.
    pub rows_deleted: u64,
    /// Blobs confirmed gone (deleted now or already absent), including the
    /// prefix sweep on owner deletion.
    pub blobs_deleted: u64,
    /// Cleanup failures that were written to the orphan ledger.
    pub blobs_ledgered: u64,
}

// =============================================================================
// ORPHAN LEDGER TYPES
// =============================================================================

/// A new ledger entry: a blob path whose deletion or compensation is known
/// or suspected to have failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrphan {
    pub path: String,
    /// None for prefix-level entries, where no single blob's size is known.
    pub size_bytes: Option<i64>,
    pub content_type: Option<String>,
    /// What the system was doing when the blob was stranded.
    pub context: String,
}

impl NewOrphan {
    /// Entry for a single blob with known metadata.
    pub fn blob(meta: &AttachmentMeta, context: impl Into<String>) -> Self {
        Self {
            path: meta.path.clone(),
            size_bytes: Some(meta.size_bytes),
            content_type: Some(meta.content_type.clone()),
            context: context.into(),
        }
    }

    /// Entry for a whole key prefix (failed sweep).
    pub fn prefix(prefix: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            path: prefix.into(),
            size_bytes: None,
            content_type: None,
            context: context.into(),
        }
    }
}

/// A durable orphan ledger row, consumed by the out-of-band reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanEntry {
    pub id: Uuid,
    pub path: String,
    pub size_bytes: Option<i64>,
    pub content_type: Option<String>,
    pub context: String,
    pub recorded_at_utc: DateTime<Utc>,
    /// Set once the reconciler has dealt with the path.
    pub resolved_at_utc: Option<DateTime<Utc>>,
}
