//! Structured logging schema and field name constants for keepsake.
//!
//! All crates use these names for consistent structured logging fields so
//! log aggregation tools can query by standardized field names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, best-effort fallback applied (ledgered cleanup) |
//! | INFO  | Operation completions, pool lifecycle |
//! | DEBUG | Decision points, per-operation phase transitions |
//! | TRACE | Per-blob iteration inside batches |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "saga", "db", "blob"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "coordinator", "batch_upload", "ledger", "pool", "fs"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create_owner", "append_gallery", "replace_primary",
/// "delete_owner", "delete_attachments"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Owner kind being operated on ("album", "inquiry", ...).
pub const OWNER_KIND: &str = "owner_kind";

/// Owner UUID being operated on.
pub const OWNER_ID: &str = "owner_id";

/// Blob key involved in the event.
pub const BLOB_KEY: &str = "blob_key";

/// Blob key prefix (owner sweep).
pub const BLOB_PREFIX: &str = "blob_prefix";

/// Number of attachments in the batch.
pub const BATCH_SIZE: &str = "batch_size";

// ─── Protocol fields ───────────────────────────────────────────────────────

/// Saga phase at the time of the event. Values: the `PHASE_*` constants.
pub const PHASE: &str = "phase";

/// Pending row(s) written inside an open transaction.
pub const PHASE_ROW_PENDING: &str = "row_pending";
/// Blob uploads in flight, transaction still open.
pub const PHASE_UPLOAD_PENDING: &str = "upload_pending";
/// Every upload settled successfully.
pub const PHASE_UPLOAD_OK: &str = "upload_ok";
/// At least one upload settled with a failure.
pub const PHASE_UPLOAD_FAILED: &str = "upload_failed";
/// Transaction committed; rows are durable.
pub const PHASE_COMMITTED: &str = "committed";
/// Transaction rolled back; pending rows revoked.
pub const PHASE_ROLLED_BACK: &str = "rolled_back";
/// Deleting already-uploaded blobs after a rollback.
pub const PHASE_COMPENSATING: &str = "compensating";
/// Compensation finished (failures ledgered).
pub const PHASE_COMPENSATED: &str = "compensated";
/// Post-commit best-effort blob deletion in progress.
pub const PHASE_CLEANUP_PENDING: &str = "cleanup_pending";
/// Post-commit cleanup finished cleanly.
pub const PHASE_CLEANUP_DONE: &str = "cleanup_done";
/// Post-commit cleanup failed somewhere; failures ledgered.
pub const PHASE_CLEANUP_FAILED: &str = "cleanup_failed";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of blobs removed by a sweep or cleanup pass.
pub const DELETED_COUNT: &str = "deleted_count";

/// Number of ledger entries written by an operation.
pub const LEDGERED_COUNT: &str = "ledgered_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
