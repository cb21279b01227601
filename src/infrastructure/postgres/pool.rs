//! PostgreSQL connection pool.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Errors that can occur with the PostgreSQL pool.
#[derive(Debug, Error)]
pub enum PostgresPoolError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// PostgreSQL connection pool shared by the template store and the ledger.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,

    /// Database URL (for logging purposes)
    database_url: String,
}

impl PostgresPool {
    /// Create a new PostgreSQL pool from configuration.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, PostgresPoolError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
            .connect(&config.url)
            .await?;

        let pool = Self {
            pool,
            database_url: config.url.clone(),
        };

        tracing::info!(
            pool_size = config.pool_size,
            url = %pool.database_url_masked(),
            "PostgreSQL connection pool created"
        );

        Ok(pool)
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), PostgresPoolError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("PostgreSQL migrations applied");
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Get the database URL (masked for logging).
    pub fn database_url_masked(&self) -> String {
        mask_url(&self.database_url)
    }

    /// Close the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

/// Replace the password part of a connection URL with `***`
fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // `postgres://host@...` has its only colon in the scheme
            if url[..colon_pos].ends_with("postgres") || url[..colon_pos].ends_with("postgresql") {
                return url.to_string();
            }
            let prefix = &url[..colon_pos + 1];
            let suffix = &url[at_pos..];
            return format!("{}***{}", prefix, suffix);
        }
    }
    url.to_string()
}
