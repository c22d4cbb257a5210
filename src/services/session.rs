//! Session binding: decides whether a validation succeeds, rebinds the
//! session, or is refused because another address holds a live session.
//!
//! The lookup and the write in [`validate`] are separate store calls. Two
//! concurrent validations of an unbound key from different addresses can
//! both pass the liveness check; the later write wins the binding.

use chrono::{DateTime, Duration, Utc};
use std::net::IpAddr;

use crate::{
    error::{StoreResult, ValidationFailure},
    models::license::key_fingerprint,
    repositories::license::LicenseStore,
};

/// How long a session stays live without activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub timeout: Duration,
}

impl SessionPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(60))
    }
}

/// A granted validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGrant {
    /// The key had no live session; `address` now holds it.
    Claimed,
    /// The live session already belonged to `address` and was refreshed.
    Refreshed,
}

/// What a heartbeat did. Callers answer success regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Refreshed,
    UnknownKey,
    StoreFault,
}

/// Validates `key` for a client at `address` and binds the session to it.
pub async fn validate(
    store: &dyn LicenseStore,
    policy: &SessionPolicy,
    key: &str,
    address: IpAddr,
    now: DateTime<Utc>,
) -> Result<SessionGrant, ValidationFailure> {
    let fingerprint = key_fingerprint(key);

    let record = store
        .find(key)
        .await
        .map_err(ValidationFailure::Persistence)?
        .ok_or_else(|| {
            tracing::info!(key = %fingerprint, "Validation failed: key not found");
            ValidationFailure::NotFound
        })?;

    if !record.status.is_active() {
        tracing::info!(
            key = %fingerprint,
            status = %record.status,
            "Validation failed: key inactive"
        );
        return Err(ValidationFailure::Inactive(record.status));
    }

    let grant = match record.live_holder(now, policy.timeout) {
        Some(holder) if holder != address => {
            tracing::warn!(
                key = %fingerprint,
                %holder,
                requester = %address,
                "Validation refused: session live on another network"
            );
            return Err(ValidationFailure::SessionConflict);
        }
        Some(_) => SessionGrant::Refreshed,
        None => SessionGrant::Claimed,
    };

    let bound = store
        .bind_session(key, address, now)
        .await
        .map_err(ValidationFailure::Persistence)?;

    // Deleted between the lookup and the write.
    if !bound {
        return Err(ValidationFailure::NotFound);
    }

    tracing::info!(key = %fingerprint, %address, ?grant, "Validation successful");
    Ok(grant)
}

/// Refreshes session recency for `key`. Never checks status or address.
pub async fn heartbeat(
    store: &dyn LicenseStore,
    key: &str,
    now: DateTime<Utc>,
) -> HeartbeatOutcome {
    match store.touch(key, now).await {
        Ok(true) => HeartbeatOutcome::Refreshed,
        Ok(false) => {
            tracing::debug!(key = %key_fingerprint(key), "Heartbeat for unknown key");
            HeartbeatOutcome::UnknownKey
        }
        Err(e) => {
            tracing::warn!(key = %key_fingerprint(key), "Heartbeat not recorded: {}", e);
            HeartbeatOutcome::StoreFault
        }
    }
}

/// Unbinds sessions that can no longer be live at `now`.
pub async fn sweep_expired_sessions(
    store: &dyn LicenseStore,
    policy: &SessionPolicy,
    now: DateTime<Utc>,
) -> StoreResult<u64> {
    store.clear_expired_sessions(now - policy.timeout).await
}
