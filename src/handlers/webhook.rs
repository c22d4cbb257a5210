use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::{
    error::{AppError, Result},
    models::telegram::Update,
    services::admin as admin_service,
    state::AppState,
};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Checks the webhook secret Telegram echoes on every delivery.
fn verify_secret(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.config.telegram_webhook_secret.as_ref() else {
        return Ok(());
    };

    let provided = headers
        .get(SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();

    if bool::from(provided.ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Authentication("Invalid webhook secret".to_string()))
    }
}

/// Receives admin commands from the Telegram bot webhook.
///
/// Telegram redelivers anything not acknowledged with a 2xx, so once the
/// secret checks out the update is always acknowledged, even when the
/// command or the reply fails.
#[axum::debug_handler(state = AppState)]
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<Update>, JsonRejection>,
) -> Result<StatusCode> {
    verify_secret(&state, &headers)?;

    let update = match payload {
        Ok(Json(update)) => update,
        Err(rejection) => {
            tracing::warn!("⚠️ Ignoring unreadable webhook update: {}", rejection);
            return Ok(StatusCode::OK);
        }
    };

    let Some(message) = update.message else {
        tracing::debug!("Ignoring update {} without a message", update.update_id);
        return Ok(StatusCode::OK);
    };
    let Some(text) = message.text.as_deref() else {
        return Ok(StatusCode::OK);
    };

    let reply = admin_service::handle_message(
        state.store.as_ref(),
        &state.policy,
        state.config.telegram_admin_chat_id,
        message.chat.id,
        text,
        Utc::now(),
    )
    .await;

    if let Err(e) = state
        .replier
        .send_message(reply.chat_id, &reply.text, reply.format)
        .await
    {
        tracing::error!("❌ Failed to deliver admin reply: {}", e);
    }

    Ok(StatusCode::OK)
}
