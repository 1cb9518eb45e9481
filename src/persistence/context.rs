//! Database context: the shared MySQL pool and schema management.

use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

use crate::config::{DatabaseConfig, EnvConfig};
use crate::persistence::unit_of_work::UnitOfWork;
use crate::persistence::PersistenceError;

/// DDL applied by [`DbContext::ensure_created`]. Every statement is idempotent.
const SCHEMA: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS orders (
    id          CHAR(36)     NOT NULL PRIMARY KEY,
    name        VARCHAR(100) NOT NULL,
    count       INT          NOT NULL,
    paid        TINYINT(1)   NOT NULL DEFAULT 0,
    created_at  DATETIME(6)  NOT NULL,
    version     INT          NOT NULL DEFAULT 0,
    INDEX ix_orders_created_at (created_at)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
"#];

/// Tables that must exist for the schema to count as created.
const REQUIRED_TABLES: &[&str] = &["orders"];

/// Owner of the relational connection pool.
///
/// Cheap to clone; all clones share one pool.
#[derive(Clone, Debug)]
pub struct DbContext {
    pool: MySqlPool,
}

impl DbContext {
    /// Build the pool without opening a connection.
    ///
    /// The URL is parsed eagerly, so a malformed connection string fails here
    /// rather than on the first request.
    pub fn connect_lazy(url: &str, config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Open a transaction.
    pub async fn begin(&self) -> Result<UnitOfWork, PersistenceError> {
        Ok(UnitOfWork::new(self.pool.begin().await?))
    }

    /// Materialize the schema. Safe to call repeatedly.
    pub async fn ensure_created(&self) -> Result<(), PersistenceError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(tables = ?REQUIRED_TABLES, "Database schema ensured");
        Ok(())
    }

    /// Whether every required table exists in the current database.
    pub async fn schema_exists(&self) -> Result<bool, PersistenceError> {
        for table in REQUIRED_TABLES {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?",
            )
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
            if count == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Only development hosts create the schema on startup; everywhere else it
/// is owned by migrations run out of band.
pub fn should_ensure_schema(env: &EnvConfig) -> bool {
    env.is_development()
}
