use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// The status of a license key.
///
/// Operators may assign any string. Only [`LicenseStatus::Active`] lets a
/// validation succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LicenseStatus {
    Active,
    Inactive,
    Other(String),
}

impl LicenseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Inactive => "inactive",
            LicenseStatus::Other(status) => status,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LicenseStatus::Active)
    }
}

impl From<&str> for LicenseStatus {
    fn from(value: &str) -> Self {
        match value {
            "active" => LicenseStatus::Active,
            "inactive" => LicenseStatus::Inactive,
            other => LicenseStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for LicenseStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => LicenseStatus::Active,
            "inactive" => LicenseStatus::Inactive,
            _ => LicenseStatus::Other(value),
        }
    }
}

impl From<LicenseStatus> for String {
    fn from(value: LicenseStatus) -> Self {
        match value {
            LicenseStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A license key together with its current session binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// The license key itself. Immutable once issued.
    pub key: String,
    /// The operator-assigned status.
    pub status: LicenseStatus,
    /// The network address currently holding the session, if any.
    pub bound_address: Option<IpAddr>,
    /// The last successful validation or heartbeat.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// When the key was issued.
    pub created_at: DateTime<Utc>,
}

impl LicenseRecord {
    /// A freshly issued key: active and unbound.
    pub fn issue(key: String, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            status: LicenseStatus::Active,
            bound_address: None,
            last_seen_at: None,
            created_at,
        }
    }

    /// Returns the holder of the session if it is still live at `now`.
    ///
    /// A binding without a recorded `last_seen_at` never counts as live.
    pub fn live_holder(&self, now: DateTime<Utc>, timeout: Duration) -> Option<IpAddr> {
        let address = self.bound_address?;
        let last_seen = self.last_seen_at?;
        (now - last_seen < timeout).then_some(address)
    }

    pub fn has_live_session(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.live_holder(now, timeout).is_some()
    }
}

/// A short, stable fingerprint of a license key, safe to write to logs.
pub fn key_fingerprint(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    hash.to_hex().as_str()[..12].to_string()
}
