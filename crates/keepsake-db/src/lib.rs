//! # keepsake-db
//!
//! PostgreSQL persistence layer for keepsake.
//!
//! This crate provides:
//! - Connection pool management
//! - The owner/attachment record store behind [`keepsake_core::RecordStore`]
//! - The orphan ledger behind [`keepsake_core::OrphanLedger`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use keepsake_db::Database;
//! use keepsake_core::{OwnerKind, RecordStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/keepsake").await?;
//!     db.migrate().await?;
//!
//!     let album_id = uuid::Uuid::now_v7();
//!     let owner = db.records.load_owner(OwnerKind::Album, album_id).await?;
//!     println!("{owner:?}");
//!     Ok(())
//! }
//! ```

pub mod ledger;
pub mod pool;
pub mod records;

#[cfg(test)]
mod tests;

// Test fixtures for integration tests.
// Note: Always compiled so integration tests can use DEFAULT_TEST_DATABASE_URL.
pub mod test_fixtures;

// Re-export core types
pub use keepsake_core::*;

pub use ledger::PgOrphanLedger;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use records::{PgRecordStore, PgRecordTxn};

/// Combined database context with the record store and orphan ledger.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Owner and attachment row store.
    pub records: PgRecordStore,
    /// Orphan ledger for failed blob deletions.
    pub ledger: PgOrphanLedger,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            records: PgRecordStore::new(pool.clone()),
            ledger: PgOrphanLedger::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
