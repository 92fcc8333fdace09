pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::models::{Message, Sender};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl From<Sender> for Role {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => Role::User,
            Sender::Bot => Role::Model,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Part {
    pub text: String,
}

/// A role-tagged conversation turn, in the shape the reply service expects.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Turn {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }
}

impl From<&Message> for Turn {
    fn from(message: &Message) -> Self {
        Turn::text(message.sender.into(), message.text.clone())
    }
}

/// Something that turns a conversation into reply text.
///
/// Implementations return the raw joined reply, which may be empty when the
/// service answered without usable content.
#[async_trait]
pub trait ReplyService: Send + Sync {
    async fn reply(&self, turns: &[Turn]) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Gemini API key not configured")]
    MissingApiKey,
}

impl Serialize for LlmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
