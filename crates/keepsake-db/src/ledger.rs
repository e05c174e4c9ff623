//! Orphan ledger repository.
//!
//! Every blob the saga knows it failed to remove (or failed to confirm
//! removed) lands here. The reconciler drains the table out of band:
//! list unresolved entries, re-delete the blobs, mark the rows resolved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use keepsake_core::{new_v7, Error, NewOrphan, OrphanEntry, OrphanLedger, Result};

/// PostgreSQL orphan ledger.
#[derive(Clone)]
pub struct PgOrphanLedger {
    pool: Pool<Postgres>,
}

impl PgOrphanLedger {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Unresolved entries, oldest first.
    pub async fn list_unresolved(&self, limit: i64) -> Result<Vec<OrphanEntry>> {
        let rows = sqlx::query(
            "SELECT id, path, size_bytes, content_type, context, recorded_at, resolved_at
             FROM orphan_ledger
             WHERE resolved_at IS NULL
             ORDER BY recorded_at
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(parse_orphan_row).collect())
    }

    /// Mark one entry as resolved (blob confirmed gone).
    pub async fn mark_resolved(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orphan_ledger SET resolved_at = $2 WHERE id = $1 AND resolved_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("unresolved ledger entry: {id}")));
        }
        Ok(())
    }

    /// Drop resolved entries older than the cutoff; returns rows removed.
    pub async fn purge_resolved(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM orphan_ledger WHERE resolved_at IS NOT NULL AND resolved_at < $1")
                .bind(older_than)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}

fn parse_orphan_row(r: &PgRow) -> OrphanEntry {
    OrphanEntry {
        id: r.get("id"),
        path: r.get("path"),
        size_bytes: r.get("size_bytes"),
        content_type: r.get("content_type"),
        context: r.get("context"),
        recorded_at_utc: r.get("recorded_at"),
        resolved_at_utc: r.get("resolved_at"),
    }
}

#[async_trait]
impl OrphanLedger for PgOrphanLedger {
    async fn record(&self, orphan: NewOrphan) -> Result<()> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO orphan_ledger (id, path, size_bytes, content_type, context, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&orphan.path)
        .bind(orphan.size_bytes)
        .bind(&orphan.content_type)
        .bind(&orphan.context)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "orphan_ledger",
            blob_key = %orphan.path,
            context = %orphan.context,
            "Orphan recorded"
        );
        Ok(())
    }
}
