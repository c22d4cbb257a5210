use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use tokio::sync::RwLock;

use crate::{
    error::{StoreError, StoreResult},
    models::license::{LicenseRecord, LicenseStatus},
    repositories::license::LicenseStore,
};

#[derive(Default)]
struct Tables {
    licenses: HashMap<String, LicenseRecord>,
    tombstones: HashSet<String>,
}

/// A process-local store for development runs and tests.
#[derive(Default)]
pub struct MemoryLicenseStore {
    tables: RwLock<Tables>,
}

impl MemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record as-is, bypassing issuance rules.
    pub async fn put(&self, record: LicenseRecord) {
        let mut tables = self.tables.write().await;
        tables.licenses.insert(record.key.clone(), record);
    }

    async fn update<F>(&self, key: &str, apply: F) -> bool
    where
        F: FnOnce(&mut LicenseRecord),
    {
        let mut tables = self.tables.write().await;
        match tables.licenses.get_mut(key) {
            Some(record) => {
                apply(record);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl LicenseStore for MemoryLicenseStore {
    async fn find(&self, key: &str) -> StoreResult<Option<LicenseRecord>> {
        Ok(self.tables.read().await.licenses.get(key).cloned())
    }

    async fn insert(&self, key: &str, now: DateTime<Utc>) -> StoreResult<LicenseRecord> {
        let mut tables = self.tables.write().await;
        if tables.tombstones.contains(key) || tables.licenses.contains_key(key) {
            return Err(StoreError::Duplicate(key.to_string()));
        }

        let record = LicenseRecord::issue(key.to_string(), now);
        tables.licenses.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn list(&self) -> StoreResult<Vec<LicenseRecord>> {
        let mut records: Vec<LicenseRecord> =
            self.tables.read().await.licenses.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(records)
    }

    async fn bind_session(
        &self,
        key: &str,
        address: IpAddr,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(self
            .update(key, |record| {
                record.bound_address = Some(address);
                record.last_seen_at = Some(now);
            })
            .await)
    }

    async fn touch(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.update(key, |record| record.last_seen_at = Some(now)).await)
    }

    async fn set_status(&self, key: &str, status: &LicenseStatus) -> StoreResult<bool> {
        Ok(self.update(key, |record| record.status = status.clone()).await)
    }

    async fn clear_session(&self, key: &str) -> StoreResult<bool> {
        Ok(self
            .update(key, |record| {
                record.bound_address = None;
                record.last_seen_at = None;
            })
            .await)
    }

    async fn delete(&self, key: &str, _now: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.licenses.remove(key).is_some();
        if removed {
            tables.tombstones.insert(key.to_string());
        }
        Ok(removed)
    }

    async fn clear_expired_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut cleared = 0;
        for record in tables.licenses.values_mut() {
            let expired = record.last_seen_at.is_none_or(|seen| seen <= cutoff);
            if record.bound_address.is_some() && expired {
                record.bound_address = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
