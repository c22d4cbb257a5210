mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::json;

use common::{ADMIN_CHAT_ID, TestApp, WEBHOOK_SECRET, test_config};
use license_server::{
    models::{
        license::{LicenseRecord, LicenseStatus},
        telegram::ReplyFormat,
    },
    repositories::license::LicenseStore,
};

#[tokio::test]
async fn test_root_reports_running() {
    let app = TestApp::new();
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "License Server is running.");
}

#[tokio::test]
async fn test_health_reports_store() {
    let app = TestApp::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn test_validate_requires_key() {
    let app = TestApp::new();

    let (status, body) = app.post_json("/api/validate", "1.2.3.4", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "License key is required.");

    let (status, _) = app.post_json("/validate", "1.2.3.4", json!({ "licenseKey": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/validate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_key_is_404() {
    let app = TestApp::new();

    let (status, body) = app.validate("no-such-key", "1.2.3.4").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "License key not found.");
}

#[tokio::test]
async fn test_long_and_blank_keys_are_looked_up() {
    let app = TestApp::new();
    let long = "k".repeat(200);

    for key in [long.as_str(), "   "] {
        let (status, body) = app.validate(key, "1.2.3.4").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "License key not found.");

        let (status, body) = app
            .post_json("/api/heartbeat", "1.2.3.4", json!({ "licenseKey": key }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
}

#[tokio::test]
async fn test_session_binding_over_http() {
    let app = TestApp::new();
    let key = app.create_key().await;

    let (status, body) = app.validate(&key, "1.2.3.4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": true }));

    let (status, body) = app.validate(&key, "9.9.9.9").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "License key is already in use on another network.");

    let (status, _) = app.validate(&key, "1.2.3.4").await;
    assert_eq!(status, StatusCode::OK);

    let record = app.store.find(&key).await.unwrap().unwrap();
    assert_eq!(record.bound_address, Some("1.2.3.4".parse().unwrap()));
}

#[tokio::test]
async fn test_expired_session_can_be_claimed() {
    let app = TestApp::new();
    let now = Utc::now();
    app.store
        .put(LicenseRecord {
            bound_address: Some("1.2.3.4".parse().unwrap()),
            last_seen_at: Some(now - Duration::minutes(61)),
            ..LicenseRecord::issue("expired-key".to_string(), now - Duration::days(1))
        })
        .await;

    let (status, _) = app.validate("expired-key", "9.9.9.9").await;
    assert_eq!(status, StatusCode::OK);

    let record = app.store.find("expired-key").await.unwrap().unwrap();
    assert_eq!(record.bound_address, Some("9.9.9.9".parse().unwrap()));
}

#[tokio::test]
async fn test_configured_timeout_is_honoured() {
    let app = TestApp::with_config(test_config(&[("SESSION_TIMEOUT_MINUTES", "5")]));
    let now = Utc::now();
    app.store
        .put(LicenseRecord {
            bound_address: Some("1.2.3.4".parse().unwrap()),
            last_seen_at: Some(now - Duration::minutes(6)),
            ..LicenseRecord::issue("short-key".to_string(), now)
        })
        .await;

    let (status, _) = app.validate("short-key", "9.9.9.9").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_inactive_key_is_403_with_status() {
    let app = TestApp::new();
    let key = app.create_key().await;
    app.validate(&key, "1.2.3.4").await;

    let reply = app.admin(&format!("/status {} inactive", key)).await;
    assert_eq!(reply, format!("Key `{}` status updated to `inactive`.", key));

    let (status, body) = app.validate(&key, "1.2.3.4").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "License key is inactive (status: inactive).");
}

#[tokio::test]
async fn test_reset_session_unblocks_other_address() {
    let app = TestApp::new();
    let key = app.create_key().await;
    app.validate(&key, "1.2.3.4").await;

    let reply = app.admin(&format!("/reset_session {}", key)).await;
    assert_eq!(reply, format!("Session for key `{}` has been reset.", key));

    let (status, _) = app.validate(&key, "9.9.9.9").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_deleted_key_is_gone_for_good() {
    let app = TestApp::new();
    let key = app.create_key().await;
    app.validate(&key, "1.2.3.4").await;

    let reply = app.admin(&format!("/delete {}", key)).await;
    assert_eq!(reply, format!("Key `{}` has been deleted.", key));

    let (status, _) = app.validate(&key, "1.2.3.4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Heartbeats for the deleted key are still accepted and change nothing.
    let (status, _) = app
        .post_json("/api/heartbeat", "1.2.3.4", json!({ "licenseKey": key }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.store.find(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_heartbeat_refreshes_last_seen_only() {
    let app = TestApp::new();
    let then = Utc::now() - Duration::minutes(30);
    app.store
        .put(LicenseRecord {
            status: LicenseStatus::Inactive,
            bound_address: Some("1.2.3.4".parse().unwrap()),
            last_seen_at: Some(then),
            ..LicenseRecord::issue("hb-key".to_string(), then)
        })
        .await;

    let (status, body) = app
        .post_json("/heartbeat", "5.5.5.5", json!({ "licenseKey": "hb-key" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let record = app.store.find("hb-key").await.unwrap().unwrap();
    assert!(record.last_seen_at.unwrap() > then);
    assert_eq!(record.bound_address, Some("1.2.3.4".parse().unwrap()));
    assert_eq!(record.status, LicenseStatus::Inactive);
}

#[tokio::test]
async fn test_heartbeat_requires_key() {
    let app = TestApp::new();

    let (status, _) = app.post_json("/api/heartbeat", "1.2.3.4", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json("/api/heartbeat", "1.2.3.4", json!({ "licenseKey": "unknown" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_list_shows_sessions() {
    let app = TestApp::new();
    let first = app.create_key().await;
    let second = app.create_key().await;
    app.validate(&first, "1.2.3.4").await;

    let reply = app.admin("/list").await;

    assert!(reply.starts_with("📜 *License List* 📜"));
    assert!(reply.contains(&format!("Key: `{}`", first)));
    assert!(reply.contains(&format!("Key: `{}`", second)));
    assert!(reply.contains("Session: `1.2.3.4` (live"));
    assert!(reply.contains("Session: none"));
}

#[tokio::test]
async fn test_non_admin_is_rejected_without_mutation() {
    let app = TestApp::new();
    let key = app.create_key().await;

    let (chat, reply) = app.admin_from(12345, &format!("/delete {}", key)).await;

    assert_eq!(chat, 12345);
    assert_eq!(reply, "You are not authorized.");
    assert!(app.store.find(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_admin_command() {
    let app = TestApp::new();
    assert_eq!(app.admin("/frobnicate now").await, "Unknown command.");
    assert_eq!(app.admin("/status only-a-key").await, "Usage: /status <key> <status>");
}

#[tokio::test]
async fn test_usage_reply_is_sent_as_plain_text() {
    let app = TestApp::new();

    assert_eq!(app.admin("/reset_session").await, "Usage: /reset_session <key>");
    let (_, _, format) = app.replier.last().await;
    assert_eq!(format, ReplyFormat::PlainText);

    app.create_key().await;
    let (_, _, format) = app.replier.last().await;
    assert_eq!(format, ReplyFormat::Markdown);
}

#[tokio::test]
async fn test_webhook_secret_is_enforced() {
    let app = TestApp::with_config(test_config(&[("TELEGRAM_WEBHOOK_SECRET", WEBHOOK_SECRET)]));
    let update = json!({
        "update_id": 5,
        "message": { "chat": { "id": ADMIN_CHAT_ID }, "text": "/create" }
    });

    let (status, _) = app.post_json("/api/webhook", "149.154.167.200", update.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.store.list().await.unwrap().is_empty());
    assert!(app.replier.sent.lock().await.is_empty());

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json")
        .header("x-telegram-bot-api-secret-token", WEBHOOK_SECRET)
        .body(Body::from(update.to_string()))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_webhook_acknowledges_updates_without_text() {
    let app = TestApp::new();

    let (status, _) = app
        .post_json("/api/webhook", "149.154.167.200", json!({ "update_id": 9 }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.replier.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_peer_address_used_when_proxy_untrusted() {
    let app = TestApp::with_config(test_config(&[("TRUST_PROXY_HEADERS", "false")]));
    let key = app.create_key().await;

    // Both requests come from the same peer, whatever the header claims.
    let (status, _) = app.validate(&key, "1.2.3.4").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.validate(&key, "9.9.9.9").await;
    assert_eq!(status, StatusCode::OK);

    let record = app.store.find(&key).await.unwrap().unwrap();
    assert_eq!(record.bound_address, Some("127.0.0.1".parse().unwrap()));
}
