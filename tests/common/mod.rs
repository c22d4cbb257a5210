#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Extension, Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

use license_server::{
    config::Config,
    error::Result,
    models::telegram::ReplyFormat,
    repositories::memory::MemoryLicenseStore,
    router::build_router,
    services::telegram::ChatReplier,
    state::AppState,
};

pub const ADMIN_CHAT_ID: i64 = 777000;
pub const WEBHOOK_SECRET: &str = "s3cr3t-token";

/// Captures admin replies instead of calling Telegram.
#[derive(Default)]
pub struct RecordingReplier {
    pub sent: Mutex<Vec<(i64, String, ReplyFormat)>>,
}

#[async_trait]
impl ChatReplier for RecordingReplier {
    async fn send_message(&self, chat_id: i64, text: &str, format: ReplyFormat) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((chat_id, text.to_string(), format));
        Ok(())
    }
}

impl RecordingReplier {
    pub async fn last(&self) -> (i64, String, ReplyFormat) {
        self.sent.lock().await.last().cloned().expect("no reply was sent")
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryLicenseStore>,
    pub replier: Arc<RecordingReplier>,
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("STORE_BACKEND", "memory"),
        ("TELEGRAM_BOT_TOKEN", "123456:TEST"),
        ("TELEGRAM_ADMIN_CHAT_ID", "777000"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|name| vars.get(name).cloned()).expect("test config is valid")
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryLicenseStore::new());
        let replier = Arc::new(RecordingReplier::default());
        let state = AppState::with_parts(config, store.clone(), None, replier.clone());
        let router = build_router(state)
            .expect("router builds")
            .layer(Extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))));

        Self {
            router,
            store,
            replier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn post_json(&self, path: &str, from: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-forwarded-for", from)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn validate(&self, key: &str, from: &str) -> (StatusCode, Value) {
        self.post_json("/api/validate", from, serde_json::json!({ "licenseKey": key }))
            .await
    }

    pub async fn admin(&self, text: &str) -> String {
        self.admin_from(ADMIN_CHAT_ID, text).await.1
    }

    pub async fn admin_from(&self, chat_id: i64, text: &str) -> (i64, String) {
        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "chat": { "id": chat_id, "type": "private" },
                "text": text
            }
        });
        let (status, _) = self.post_json("/api/webhook", "149.154.167.200", update).await;
        assert_eq!(status, StatusCode::OK);
        let (chat_id, text, _) = self.replier.last().await;
        (chat_id, text)
    }

    /// Issues a key through the admin channel and returns it.
    pub async fn create_key(&self) -> String {
        let reply = self.admin("/create").await;
        reply
            .split('`')
            .nth(1)
            .expect("reply contains the key")
            .to_string()
    }
}
