//! Blob store backends for keepsake.
//!
//! Two implementations of [`keepsake_core::BlobStore`]:
//!
//! - [`FsBlobStore`]: a local directory with atomic writes, the default
//!   backend for single-node deployments
//! - [`MemoryBlobStore`]: process-local storage for development and tests

pub mod fs;
pub mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
