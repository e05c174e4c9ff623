//! # keepsake-core
//!
//! Core types, traits, and abstractions for keepsake, the attachment
//! consistency layer that keeps relational records and externally stored
//! binary blobs in agreement without a cross-store transaction coordinator.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the other keepsake crates depend on.

pub mod content;
pub mod error;
pub mod keys;
pub mod logging;
pub mod models;
pub mod owner;
pub mod traits;

// Re-export commonly used types at crate root
pub use content::{effective_content_type, extension_for};
pub use error::{Error, Result, UploadFailure};
pub use keys::{blob_key, new_v7, owner_prefix, parse_blob_key, ParsedKey};
pub use models::{
    AttachmentMeta, AttachmentRecord, AttachmentUpload, CreateOwner, DeleteReceipt, NewOrphan,
    OrphanEntry, OwnerReceipt, OwnerRecord,
};
pub use owner::{GallerySpec, OwnerKind, OwnerKindSpec};
pub use traits::{BlobDelete, BlobStore, OrphanLedger, RecordStore, RecordTxn};
