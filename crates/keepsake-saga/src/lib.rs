//! Attachment consistency saga for Keepsake.
//!
//! Coordinates paired writes across the record store and the blob store:
//! pending rows first, blob uploads before commit, compensating deletes
//! on failure, and ledgered best-effort cleanup after commit. See
//! [`AttachmentCoordinator`] for the operation surface.

pub mod batch;
pub mod coordinator;
pub mod locks;
pub mod retry;

#[cfg(test)]
mod tests;

// Re-export the core vocabulary so saga consumers need one import.
pub use keepsake_core::*;

pub use batch::{BatchReport, BatchUploadExecutor, UploadJob, UploadOutcome};
pub use coordinator::AttachmentCoordinator;
pub use locks::OwnerLockRegistry;
pub use retry::RetryPolicy;
