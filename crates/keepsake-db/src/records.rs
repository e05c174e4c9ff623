//! Owner and attachment row repository.
//!
//! The `attachment_owner` table carries the owner's domain fields plus the
//! folded-in primary attachment metadata; the `attachment` table carries one
//! row per gallery blob. Every saga write goes through [`PgRecordTxn`] so the
//! rows land (or vanish) as a unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use keepsake_core::{
    AttachmentMeta, AttachmentRecord, Error, OwnerKind, OwnerRecord, RecordStore, RecordTxn,
    Result,
};

/// PostgreSQL record store.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool<Postgres>,
}

impl PgRecordStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn parse_owner_row(r: &PgRow) -> Result<OwnerRecord> {
    let kind_str: String = r.get("kind");
    let kind = OwnerKind::parse(&kind_str)
        .ok_or_else(|| Error::Internal(format!("unknown owner kind in row: {kind_str}")))?;

    let primary_path: Option<String> = r.get("primary_path");
    let primary_size: Option<i64> = r.get("primary_size_bytes");
    let primary_type: Option<String> = r.get("primary_content_type");
    let primary = match (primary_path, primary_size, primary_type) {
        (Some(path), Some(size_bytes), Some(content_type)) => Some(AttachmentMeta {
            path,
            size_bytes,
            content_type,
        }),
        _ => None,
    };

    Ok(OwnerRecord {
        id: r.get("id"),
        kind,
        fields: r.get("fields"),
        natural_key: r.get("natural_key"),
        primary,
        created_at_utc: r.get("created_at"),
        updated_at_utc: r.get("updated_at"),
    })
}

fn parse_attachment_row(r: &PgRow) -> Result<AttachmentRecord> {
    let kind_str: String = r.get("owner_kind");
    let owner_kind = OwnerKind::parse(&kind_str)
        .ok_or_else(|| Error::Internal(format!("unknown owner kind in row: {kind_str}")))?;

    Ok(AttachmentRecord {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        owner_kind,
        path: r.get("path"),
        size_bytes: r.get("size_bytes"),
        content_type: r.get("content_type"),
        created_at_utc: r.get("created_at"),
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn begin(&self) -> Result<Box<dyn RecordTxn>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PgRecordTxn { tx }))
    }

    async fn load_owner(&self, kind: OwnerKind, id: Uuid) -> Result<Option<OwnerRecord>> {
        let row = sqlx::query(
            "SELECT id, kind, natural_key, fields, primary_path, primary_size_bytes,
                    primary_content_type, created_at, updated_at
             FROM attachment_owner WHERE kind = $1 AND id = $2",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(parse_owner_row).transpose()
    }

    async fn load_owner_attachments(
        &self,
        kind: OwnerKind,
        id: Uuid,
    ) -> Result<Vec<AttachmentRecord>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, owner_kind, path, size_bytes, content_type, created_at
             FROM attachment
             WHERE owner_kind = $1 AND owner_id = $2
             ORDER BY created_at, id",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(parse_attachment_row).collect()
    }

    async fn load_attachments(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<AttachmentRecord>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, owner_kind, path, size_bytes, content_type, created_at
             FROM attachment
             WHERE owner_kind = $1 AND owner_id = $2 AND id = ANY($3)
             ORDER BY created_at, id",
        )
        .bind(kind.as_str())
        .bind(owner_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(parse_attachment_row).collect()
    }

    async fn find_by_natural_key(
        &self,
        kind: OwnerKind,
        natural_key: &str,
    ) -> Result<Option<Uuid>> {
        sqlx::query_scalar("SELECT id FROM attachment_owner WHERE kind = $1 AND natural_key = $2")
            .bind(kind.as_str())
            .bind(natural_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn gallery_count(&self, kind: OwnerKind, id: Uuid) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attachment WHERE owner_kind = $1 AND owner_id = $2",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count as u32)
    }
}

/// One open PostgreSQL transaction.
///
/// Dropping the value without calling [`RecordTxn::commit`] rolls the
/// transaction back (sqlx behavior), which is exactly what the saga relies
/// on when an upload phase fails.
pub struct PgRecordTxn {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RecordTxn for PgRecordTxn {
    async fn insert_owner(&mut self, owner: &OwnerRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO attachment_owner
                 (id, kind, natural_key, fields, primary_path, primary_size_bytes,
                  primary_content_type, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(owner.id)
        .bind(owner.kind.as_str())
        .bind(&owner.natural_key)
        .bind(&owner.fields)
        .bind(owner.primary.as_ref().map(|p| p.path.as_str()))
        .bind(owner.primary.as_ref().map(|p| p.size_bytes))
        .bind(owner.primary.as_ref().map(|p| p.content_type.as_str()))
        .bind(owner.created_at_utc)
        .bind(owner.updated_at_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            // The coordinator pre-checks natural keys, but a concurrent
            // insert can still trip the unique index.
            if is_unique_violation(&e) {
                Error::Conflict(format!(
                    "{} natural key already exists: {:?}",
                    owner.kind, owner.natural_key
                ))
            } else {
                Error::Database(e)
            }
        })?;
        Ok(())
    }

    async fn insert_attachments(&mut self, rows: &[AttachmentRecord]) -> Result<()> {
        for row in rows {
            sqlx::query(
                "INSERT INTO attachment
                     (id, owner_id, owner_kind, path, size_bytes, content_type, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(row.id)
            .bind(row.owner_id)
            .bind(row.owner_kind.as_str())
            .bind(&row.path)
            .bind(row.size_bytes)
            .bind(&row.content_type)
            .bind(row.created_at_utc)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    async fn set_primary(
        &mut self,
        kind: OwnerKind,
        id: Uuid,
        meta: Option<&AttachmentMeta>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE attachment_owner
             SET primary_path = $3, primary_size_bytes = $4, primary_content_type = $5,
                 updated_at = $6
             WHERE kind = $1 AND id = $2",
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(meta.map(|m| m.path.as_str()))
        .bind(meta.map(|m| m.size_bytes))
        .bind(meta.map(|m| m.content_type.as_str()))
        .bind(updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::OwnerNotFound { kind, id });
        }
        Ok(())
    }

    async fn delete_owner(&mut self, kind: OwnerKind, id: Uuid) -> Result<u64> {
        // Delete children explicitly so the returned count covers them;
        // the FK cascade is only a backstop.
        let attachments = sqlx::query("DELETE FROM attachment WHERE owner_kind = $1 AND owner_id = $2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        let owners = sqlx::query("DELETE FROM attachment_owner WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        if owners == 0 {
            return Err(Error::OwnerNotFound { kind, id });
        }
        Ok(attachments + owners)
    }

    async fn delete_attachments(
        &mut self,
        kind: OwnerKind,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM attachment WHERE owner_kind = $1 AND owner_id = $2 AND id = ANY($3)",
        )
        .bind(kind.as_str())
        .bind(owner_id)
        .bind(ids)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn gallery_count(&mut self, kind: OwnerKind, id: Uuid) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attachment WHERE owner_kind = $1 AND owner_id = $2",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(count as u32)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(Error::Database)
    }
}
