use async_trait::async_trait;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::{
    error::{AppError, Result},
    models::telegram::{ReplyFormat, SendMessage},
};

/// Telegram rejects messages longer than this.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Delivers admin replies back to a chat.
#[async_trait]
pub trait ChatReplier: Send + Sync + 'static {
    async fn send_message(&self, chat_id: i64, text: &str, format: ReplyFormat) -> Result<()>;
}

/// A client for the Telegram Bot API `sendMessage` method.
pub struct TelegramClient {
    http: reqwest::Client,
    send_message_url: Zeroizing<String>,
}

impl TelegramClient {
    /// Creates a new `TelegramClient`.
    ///
    /// # Arguments
    ///
    /// * `api_base` - The Bot API base URL, e.g. `https://api.telegram.org`.
    /// * `bot_token` - The bot token issued by BotFather.
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            send_message_url: Zeroizing::new(format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            )),
        })
    }
}

#[async_trait]
impl ChatReplier for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str, format: ReplyFormat) -> Result<()> {
        for chunk in chunk_message(text, MAX_MESSAGE_LEN) {
            let body = SendMessage {
                chat_id,
                text: &chunk,
                parse_mode: format.parse_mode(),
            };

            // The URL carries the bot token; strip it before the error is logged.
            self.http
                .post(self.send_message_url.as_str())
                .json(&body)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| {
                    let e = e.without_url();
                    tracing::error!("❌ sendMessage to chat {} failed: {}", chat_id, e);
                    AppError::Telegram(e)
                })?;
        }

        tracing::debug!("✅ Reply delivered to chat {}", chat_id);
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` bytes.
///
/// Breaks at blank lines where possible so listing entries stay whole, and
/// falls back to single lines and then raw character boundaries.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for block in text.split_inclusive("\n\n") {
        if current.len() + block.len() > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if block.len() <= limit {
            current.push_str(block);
            continue;
        }

        for line in block.split_inclusive('\n') {
            if current.len() + line.len() > limit && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            for ch in line.chars() {
                if current.len() + ch.len_utf8() > limit {
                    chunks.push(std::mem::take(&mut current));
                }
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
