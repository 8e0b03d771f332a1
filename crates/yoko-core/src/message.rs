//! Chat messages as they appear in the shared log.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct RawMessage {
    text: String,
    sender: Sender,
}

/// A finalized utterance or reply. Text is never blank; there is no way to edit one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    text: String,
    sender: Sender,
}

impl Message {
    /// Build a message, rejecting text that is empty after trimming.
    pub fn new(text: impl Into<String>, sender: Sender) -> CoreResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::EmptyMessage);
        }
        Ok(Self { text, sender })
    }

    pub fn user(text: impl Into<String>) -> CoreResult<Self> {
        Self::new(text, Sender::User)
    }

    pub fn ai(text: impl Into<String>) -> CoreResult<Self> {
        Self::new(text, Sender::Ai)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = CoreError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        Message::new(raw.text, raw.sender)
    }
}

/// A message as stored in the log: publish key plus the message itself.
///
/// `key` is the only ordering; `published_at` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: u64,
    #[serde(flatten)]
    pub message: Message,
    pub published_at: DateTime<Utc>,
}
