use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;

use crate::error::StoreResult;

/// Maximum number of pooled connections.
const MAX_POOL_SIZE: usize = 32;

/// Schema for license records and the tombstones of deleted keys.
const SCHEMA: &str = include_str!("../migrations/0001_licenses.sql");

/// Creates a new database connection pool.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
///
/// # Returns
///
/// A `Result` containing the `Pool`.
pub fn create_pool(database_url: &str) -> StoreResult<Pool> {
    // Reject malformed URLs here rather than on first checkout.
    let _: tokio_postgres::Config = database_url.parse()?;

    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let mut pool_cfg = PoolConfig::new(MAX_POOL_SIZE);
    pool_cfg.timeouts.wait = Some(Duration::from_secs(5));
    pool_cfg.timeouts.create = Some(Duration::from_secs(2));
    pool_cfg.timeouts.recycle = Some(Duration::from_secs(1));
    cfg.pool = Some(pool_cfg);

    Ok(cfg.create_pool(Some(Runtime::Tokio1), NoTls)?)
}

/// Applies the schema. Every statement is idempotent.
pub async fn migrate(pool: &Pool) -> StoreResult<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    tracing::info!("✅ Database schema is up to date");
    Ok(())
}
