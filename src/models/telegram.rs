use serde::{Deserialize, Serialize};

/// An incoming update delivered to the bot webhook.
///
/// Only the fields the admin channel reads are modelled; everything else
/// Telegram sends is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// How Telegram should render a reply.
///
/// Error, usage and authorization texts carry raw input such as
/// `/reset_session`, which legacy Markdown rejects as an unclosed entity,
/// so those go out as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Markdown,
    PlainText,
}

impl ReplyFormat {
    pub fn parse_mode(self) -> Option<&'static str> {
        match self {
            ReplyFormat::Markdown => Some("Markdown"),
            ReplyFormat::PlainText => None,
        }
    }
}

/// Body of a `sendMessage` Bot API call.
#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
}
