//! Operator commands received over the admin chat.
//!
//! Commands mutate the store directly and never go through the session
//! engine's conflict checks.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use uuid::Uuid;

use crate::{
    error::{AppError, Result, StoreError},
    models::{
        license::{LicenseRecord, LicenseStatus, key_fingerprint},
        telegram::ReplyFormat,
    },
    repositories::license::LicenseStore,
    services::session::SessionPolicy,
    validation::license::validate_status,
};

/// Attempts at drawing a fresh key before giving up.
const MAX_CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Create,
    List,
    SetStatus { key: String, status: String },
    ResetSession { key: String },
    Delete { key: String },
}

/// Why a message could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown,
    Usage(&'static str),
}

impl AdminCommand {
    /// Parses a chat message such as `/status <key> <status>`.
    ///
    /// A `@botname` suffix on the command, as Telegram adds in group chats,
    /// is ignored.
    pub fn parse(text: &str) -> std::result::Result<Self, ParseError> {
        let mut parts = text.split_whitespace();
        let command = parts.next().ok_or(ParseError::Unknown)?;
        let command = command.split('@').next().unwrap_or(command);
        let args: Vec<&str> = parts.collect();

        match (command, args.as_slice()) {
            ("/create", _) => Ok(AdminCommand::Create),
            ("/list", _) => Ok(AdminCommand::List),
            ("/status", [key, status]) => Ok(AdminCommand::SetStatus {
                key: key.to_string(),
                status: status.to_string(),
            }),
            ("/status", _) => Err(ParseError::Usage("/status <key> <status>")),
            ("/reset_session", [key]) => Ok(AdminCommand::ResetSession {
                key: key.to_string(),
            }),
            ("/reset_session", _) => Err(ParseError::Usage("/reset_session <key>")),
            ("/delete", [key]) => Ok(AdminCommand::Delete {
                key: key.to_string(),
            }),
            ("/delete", _) => Err(ParseError::Usage("/delete <key>")),
            _ => Err(ParseError::Unknown),
        }
    }
}

/// A reply to be sent back over the admin chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReply {
    pub chat_id: i64,
    pub text: String,
    pub format: ReplyFormat,
}

/// Rejects any caller other than the configured administrator.
pub fn authorize(admin_chat_id: i64, caller_chat_id: i64) -> Result<()> {
    if caller_chat_id == admin_chat_id {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

/// Handles one admin chat message end to end and produces the reply.
///
/// The identity check runs before the text is even parsed, so an
/// unauthorized caller cannot cause any store access.
pub async fn handle_message(
    store: &dyn LicenseStore,
    policy: &SessionPolicy,
    admin_chat_id: i64,
    caller_chat_id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> AdminReply {
    if let Err(e) = authorize(admin_chat_id, caller_chat_id) {
        tracing::warn!("🚫 Admin command from unauthorized chat {}", caller_chat_id);
        return AdminReply {
            chat_id: caller_chat_id,
            text: e.to_string(),
            format: ReplyFormat::PlainText,
        };
    }

    let (text, format) = match AdminCommand::parse(text) {
        Ok(command) => {
            tracing::info!("🛠️ Admin command: {:?}", command);
            match execute(store, policy, command, now).await {
                Ok(text) => (text, ReplyFormat::Markdown),
                Err(e) => {
                    tracing::error!("❌ Admin command failed: {}", e);
                    (format!("Error: {}", e), ReplyFormat::PlainText)
                }
            }
        }
        Err(ParseError::Usage(usage)) => (format!("Usage: {}", usage), ReplyFormat::PlainText),
        Err(ParseError::Unknown) => ("Unknown command.".to_string(), ReplyFormat::PlainText),
    };

    AdminReply {
        chat_id: admin_chat_id,
        text,
        format,
    }
}

/// Runs an authorized command against the store.
pub async fn execute(
    store: &dyn LicenseStore,
    policy: &SessionPolicy,
    command: AdminCommand,
    now: DateTime<Utc>,
) -> Result<String> {
    match command {
        AdminCommand::Create => create_key(store, now).await,
        AdminCommand::List => list_keys(store, policy, now).await,
        AdminCommand::SetStatus { key, status } => set_status(store, &key, &status).await,
        AdminCommand::ResetSession { key } => reset_session(store, &key).await,
        AdminCommand::Delete { key } => delete_key(store, &key, now).await,
    }
}

async fn create_key(store: &dyn LicenseStore, now: DateTime<Utc>) -> Result<String> {
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let key = Uuid::new_v4().to_string();
        match store.insert(&key, now).await {
            Ok(record) => {
                tracing::info!("✅ License key issued: {}", key_fingerprint(&record.key));
                return Ok(format!("New key created successfully:\n\n`{}`", record.key));
            }
            Err(StoreError::Duplicate(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal("could not draw an unused key".to_string()))
}

async fn list_keys(
    store: &dyn LicenseStore,
    policy: &SessionPolicy,
    now: DateTime<Utc>,
) -> Result<String> {
    let records = store.list().await?;
    Ok(format_listing(&records, policy, now))
}

async fn set_status(store: &dyn LicenseStore, key: &str, status: &str) -> Result<String> {
    validate_status(status)?;
    let status = LicenseStatus::from(status);

    if !store.set_status(key, &status).await? {
        return Ok(not_found(key));
    }

    tracing::info!("✅ Status of {} set to {}", key_fingerprint(key), status);
    Ok(format!("Key `{}` status updated to `{}`.", key, status))
}

async fn reset_session(store: &dyn LicenseStore, key: &str) -> Result<String> {
    if !store.clear_session(key).await? {
        return Ok(not_found(key));
    }

    tracing::info!("✅ Session reset for {}", key_fingerprint(key));
    Ok(format!("Session for key `{}` has been reset.", key))
}

async fn delete_key(store: &dyn LicenseStore, key: &str, now: DateTime<Utc>) -> Result<String> {
    if !store.delete(key, now).await? {
        return Ok(not_found(key));
    }

    tracing::info!("🗑️ License key deleted: {}", key_fingerprint(key));
    Ok(format!("Key `{}` has been deleted.", key))
}

fn not_found(key: &str) -> String {
    format!("Key `{}` not found.", key)
}

/// Renders the `/list` reply.
pub fn format_listing(
    records: &[LicenseRecord],
    policy: &SessionPolicy,
    now: DateTime<Utc>,
) -> String {
    let mut response = String::from("📜 *License List* 📜\n\n");

    if records.is_empty() {
        response.push_str("No licenses found.");
        return response;
    }

    for record in records {
        let _ = writeln!(response, "Key: `{}`", record.key);
        let _ = writeln!(response, "Status: `{}`", record.status);

        match (record.bound_address, record.last_seen_at) {
            (Some(address), Some(seen)) => {
                let state = if record.has_live_session(now, policy.timeout) {
                    "live"
                } else {
                    "expired"
                };
                let _ = writeln!(
                    response,
                    "Session: `{}` ({}, last seen {})",
                    address,
                    state,
                    seen.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            (Some(address), None) => {
                let _ = writeln!(response, "Session: `{}` (expired)", address);
            }
            (None, Some(seen)) => {
                let _ = writeln!(
                    response,
                    "Session: none (last seen {})",
                    seen.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            (None, None) => {
                let _ = writeln!(response, "Session: none");
            }
        }

        response.push('\n');
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryLicenseStore;
    use chrono::Duration;

    const ADMIN: i64 = 424242;

    #[test]
    fn test_parse_commands() {
        assert_eq!(AdminCommand::parse("/create"), Ok(AdminCommand::Create));
        assert_eq!(AdminCommand::parse("/list@license_bot"), Ok(AdminCommand::List));
        assert_eq!(
            AdminCommand::parse("/status abc inactive"),
            Ok(AdminCommand::SetStatus {
                key: "abc".into(),
                status: "inactive".into()
            })
        );
        assert_eq!(
            AdminCommand::parse("  /reset_session   abc "),
            Ok(AdminCommand::ResetSession { key: "abc".into() })
        );
        assert_eq!(
            AdminCommand::parse("/delete abc"),
            Ok(AdminCommand::Delete { key: "abc".into() })
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(AdminCommand::parse("hello"), Err(ParseError::Unknown));
        assert_eq!(AdminCommand::parse(""), Err(ParseError::Unknown));
        assert_eq!(AdminCommand::parse("/creates"), Err(ParseError::Unknown));
        assert!(matches!(AdminCommand::parse("/status abc"), Err(ParseError::Usage(_))));
        assert!(matches!(AdminCommand::parse("/delete"), Err(ParseError::Usage(_))));
        assert!(matches!(AdminCommand::parse("/delete a b"), Err(ParseError::Usage(_))));
    }

    #[tokio::test]
    async fn test_unauthorized_caller_cannot_mutate() {
        let store = MemoryLicenseStore::new();
        let policy = SessionPolicy::default();

        let reply = handle_message(&store, &policy, ADMIN, 7, "/create", Utc::now()).await;

        assert_eq!(reply.chat_id, 7);
        assert_eq!(reply.text, "You are not authorized.");
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_issues_active_unbound_key() {
        let store = MemoryLicenseStore::new();
        let policy = SessionPolicy::default();

        let reply = handle_message(&store, &policy, ADMIN, ADMIN, "/create", Utc::now()).await;

        assert!(reply.text.starts_with("New key created successfully"));
        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(reply.text.contains(&records[0].key));
        assert!(records[0].status.is_active());
        assert_eq!(records[0].bound_address, None);
        assert_eq!(records[0].last_seen_at, None);
    }

    #[tokio::test]
    async fn test_status_and_delete_report_unknown_keys() {
        let store = MemoryLicenseStore::new();
        let policy = SessionPolicy::default();
        let now = Utc::now();

        let reply =
            handle_message(&store, &policy, ADMIN, ADMIN, "/status nope inactive", now).await;
        assert_eq!(reply.text, "Key `nope` not found.");

        let reply = handle_message(&store, &policy, ADMIN, ADMIN, "/delete nope", now).await;
        assert_eq!(reply.text, "Key `nope` not found.");
    }

    #[tokio::test]
    async fn test_invalid_status_is_reported() {
        let store = MemoryLicenseStore::new();
        let policy = SessionPolicy::default();
        let now = Utc::now();
        store.insert("k1", now).await.unwrap();

        let long = format!("/status k1 {}", "x".repeat(40));
        let reply = handle_message(&store, &policy, ADMIN, ADMIN, &long, now).await;

        assert!(reply.text.starts_with("Error: "));
        assert!(store.find("k1").await.unwrap().unwrap().status.is_active());
    }

    #[tokio::test]
    async fn test_unknown_command_reply() {
        let store = MemoryLicenseStore::new();
        let policy = SessionPolicy::default();

        let reply = handle_message(&store, &policy, ADMIN, ADMIN, "/frobnicate", Utc::now()).await;

        assert_eq!(reply.text, "Unknown command.");
        assert_eq!(reply.format, ReplyFormat::PlainText);
    }

    #[tokio::test]
    async fn test_usage_and_errors_are_plain_text() {
        let store = MemoryLicenseStore::new();
        let policy = SessionPolicy::default();
        let now = Utc::now();

        let reply = handle_message(&store, &policy, ADMIN, ADMIN, "/reset_session", now).await;
        assert_eq!(reply.text, "Usage: /reset_session <key>");
        assert_eq!(reply.format, ReplyFormat::PlainText);

        let reply =
            handle_message(&store, &policy, ADMIN, ADMIN, "/status k1 two_words!", now).await;
        assert!(reply.text.starts_with("Error: "));
        assert_eq!(reply.format, ReplyFormat::PlainText);

        let reply = handle_message(&store, &policy, ADMIN, 7, "/list", now).await;
        assert_eq!(reply.format, ReplyFormat::PlainText);

        let reply = handle_message(&store, &policy, ADMIN, ADMIN, "/create", now).await;
        assert_eq!(reply.format, ReplyFormat::Markdown);
    }

    #[test]
    fn test_listing_marks_live_and_expired_sessions() {
        let now = Utc::now();
        let policy = SessionPolicy::default();
        let live = LicenseRecord {
            bound_address: Some("1.2.3.4".parse().unwrap()),
            last_seen_at: Some(now - Duration::minutes(5)),
            ..LicenseRecord::issue("live-key".into(), now)
        };
        let stale = LicenseRecord {
            bound_address: Some("5.6.7.8".parse().unwrap()),
            last_seen_at: Some(now - Duration::minutes(90)),
            status: LicenseStatus::Inactive,
            ..LicenseRecord::issue("stale-key".into(), now)
        };
        let fresh = LicenseRecord::issue("fresh-key".into(), now);

        let text = format_listing(&[live, stale, fresh], &policy, now);

        assert!(text.contains("Key: `live-key`\nStatus: `active`\nSession: `1.2.3.4` (live"));
        assert!(text.contains("Status: `inactive`\nSession: `5.6.7.8` (expired"));
        assert!(text.contains("Key: `fresh-key`\nStatus: `active`\nSession: none"));
    }

    #[test]
    fn test_empty_listing() {
        let text = format_listing(&[], &SessionPolicy::default(), Utc::now());
        assert!(text.ends_with("No licenses found."));
    }
}
