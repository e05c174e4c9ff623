//! PostgreSQL connection pooling.
//!
//! Pool sizing is config-driven so embedding services can tune it per
//! deployment without code changes.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use keepsake_core::{Error, Result};

/// Connection pool tuning knobs.
///
/// The defaults suit a single small service instance. Override via the
/// builder methods or [`PoolConfig::from_env`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long an `acquire` waits for a free connection before failing.
    pub acquire_timeout: Duration,
    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,
    /// Connections are recycled after this long regardless of activity.
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl PoolConfig {
    /// Read overrides from `KEEPSAKE_DB_*` environment variables.
    ///
    /// Recognized variables, all optional:
    /// `KEEPSAKE_DB_MAX_CONNECTIONS`, `KEEPSAKE_DB_MIN_CONNECTIONS`,
    /// `KEEPSAKE_DB_ACQUIRE_TIMEOUT_SECS`, `KEEPSAKE_DB_IDLE_TIMEOUT_SECS`.
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        let base = Self::default();
        Self {
            max_connections: var("KEEPSAKE_DB_MAX_CONNECTIONS")
                .unwrap_or(base.max_connections)
                .max(1),
            min_connections: var("KEEPSAKE_DB_MIN_CONNECTIONS")
                .unwrap_or(base.min_connections),
            acquire_timeout: var("KEEPSAKE_DB_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.acquire_timeout),
            idle_timeout: var("KEEPSAKE_DB_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.idle_timeout),
            max_lifetime: base.max_lifetime,
        }
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open a pool against `database_url` with default tuning.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Open a pool against `database_url` with explicit tuning.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let started = Instant::now();

    debug!(
        subsystem = "db",
        component = "pool",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Opening connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Connection pool ready"
    );
    Ok(pool)
}

/// Emit pool occupancy at debug level; warn when no connection is idle.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "db",
        component = "pool",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections"
        );
    }
}
