use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::net::IpAddr;
use tokio_postgres::Row;

use crate::{
    error::{StoreError, StoreResult},
    models::license::{LicenseRecord, LicenseStatus},
};

/// Point operations over the table of license records.
///
/// Every method is a single request/response against the backend. The
/// store guarantees per-record atomicity and nothing more: a read followed
/// by a write is not a transaction.
#[async_trait]
pub trait LicenseStore: Send + Sync + 'static {
    /// Looks up a record by key.
    async fn find(&self, key: &str) -> StoreResult<Option<LicenseRecord>>;

    /// Issues a new active, unbound key.
    ///
    /// Fails with [`StoreError::Duplicate`] if the key exists or was ever
    /// deleted.
    async fn insert(&self, key: &str, now: DateTime<Utc>) -> StoreResult<LicenseRecord>;

    /// Returns every record, oldest first.
    async fn list(&self) -> StoreResult<Vec<LicenseRecord>>;

    /// Binds the session to `address` and stamps `last_seen_at`.
    ///
    /// Returns `false` when no record matched.
    async fn bind_session(&self, key: &str, address: IpAddr, now: DateTime<Utc>)
    -> StoreResult<bool>;

    /// Refreshes `last_seen_at` only.
    async fn touch(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn set_status(&self, key: &str, status: &LicenseStatus) -> StoreResult<bool>;

    /// Clears both the bound address and `last_seen_at`.
    async fn clear_session(&self, key: &str) -> StoreResult<bool>;

    /// Removes the record for good. The key can never be issued again.
    async fn delete(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Unbinds every session last seen at or before `cutoff`.
    async fn clear_expired_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;
}

const SELECT_COLUMNS: &str = "key, status, bound_address, last_seen_at, created_at";

/// A helper function to map a `tokio_postgres::Row` to a `LicenseRecord`.
fn row_to_license(row: &Row) -> StoreResult<LicenseRecord> {
    let status: String = row
        .try_get("status")
        .map_err(|_| StoreError::MissingData("status".to_string()))?;

    Ok(LicenseRecord {
        key: row.try_get("key").map_err(|_| StoreError::MissingData("key".to_string()))?,
        status: LicenseStatus::from(status),
        bound_address: row
            .try_get("bound_address")
            .map_err(|_| StoreError::MissingData("bound_address".to_string()))?,
        last_seen_at: row
            .try_get("last_seen_at")
            .map_err(|_| StoreError::MissingData("last_seen_at".to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|_| StoreError::MissingData("created_at".to_string()))?,
    })
}

/// License records kept in PostgreSQL.
#[derive(Clone)]
pub struct PgLicenseStore {
    pool: Pool,
}

impl PgLicenseStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LicenseStore for PgLicenseStore {
    async fn find(&self, key: &str) -> StoreResult<Option<LicenseRecord>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {SELECT_COLUMNS} FROM licenses WHERE key = $1");
        let statement = client.prepare_cached(&query).await?;
        let row = client.query_opt(&statement, &[&key]).await?;
        row.map(|r| row_to_license(&r)).transpose()
    }

    async fn insert(&self, key: &str, now: DateTime<Utc>) -> StoreResult<LicenseRecord> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO licenses (key, status, created_at)
            SELECT $1::text, 'active', $2::timestamptz
            WHERE NOT EXISTS (SELECT 1 FROM license_tombstones WHERE key = $1::text)
            ON CONFLICT (key) DO NOTHING
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let statement = client.prepare_cached(&query).await?;
        let row = client
            .query_opt(&statement, &[&key, &now])
            .await?
            .ok_or_else(|| StoreError::Duplicate(key.to_string()))?;
        row_to_license(&row)
    }

    async fn list(&self) -> StoreResult<Vec<LicenseRecord>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {SELECT_COLUMNS} FROM licenses ORDER BY created_at, key");
        let statement = client.prepare_cached(&query).await?;
        let rows = client.query(&statement, &[]).await?;
        rows.iter().map(row_to_license).collect()
    }

    async fn bind_session(
        &self,
        key: &str,
        address: IpAddr,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                UPDATE licenses
                SET bound_address = $2, last_seen_at = $3
                WHERE key = $1
                "#,
            )
            .await?;
        let updated = client.execute(&statement, &[&key, &address, &now]).await?;
        Ok(updated > 0)
    }

    async fn touch(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached("UPDATE licenses SET last_seen_at = $2 WHERE key = $1")
            .await?;
        let updated = client.execute(&statement, &[&key, &now]).await?;
        Ok(updated > 0)
    }

    async fn set_status(&self, key: &str, status: &LicenseStatus) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached("UPDATE licenses SET status = $2 WHERE key = $1")
            .await?;
        let updated = client
            .execute(&statement, &[&key, &status.as_str()])
            .await?;
        Ok(updated > 0)
    }

    async fn clear_session(&self, key: &str) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                "UPDATE licenses SET bound_address = NULL, last_seen_at = NULL WHERE key = $1",
            )
            .await?;
        let updated = client.execute(&statement, &[&key]).await?;
        Ok(updated > 0)
    }

    async fn delete(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        let deleted = transaction
            .execute("DELETE FROM licenses WHERE key = $1", &[&key])
            .await?;

        if deleted > 0 {
            transaction
                .execute(
                    r#"
                    INSERT INTO license_tombstones (key, deleted_at)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO NOTHING
                    "#,
                    &[&key, &now],
                )
                .await?;
        }

        transaction.commit().await?;
        Ok(deleted > 0)
    }

    async fn clear_expired_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                UPDATE licenses
                SET bound_address = NULL
                WHERE bound_address IS NOT NULL
                  AND (last_seen_at IS NULL OR last_seen_at <= $1)
                "#,
            )
            .await?;
        Ok(client.execute(&statement, &[&cutoff]).await?)
    }

    async fn ping(&self) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
