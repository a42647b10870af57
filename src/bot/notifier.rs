// Outbound chat capability
//
// The orchestrator only talks to users through this trait. The Telegram
// client implements it for production; tests use an in-memory recorder.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub type ChatId = i64;
pub type MessageId = i64;

/// One selectable option; `payload` is an encoded request token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub payload: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    /// Remote image the transport fetches itself (thumbnails)
    Url(String),
    /// Local artifact uploaded from disk
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str, choices: &[Choice]) -> Result<MessageId, NotifyError>;

    async fn send_photo(
        &self,
        chat: ChatId,
        photo: &PhotoSource,
        caption: Option<&str>,
        choices: &[Choice],
    ) -> Result<MessageId, NotifyError>;

    async fn send_video(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<MessageId, NotifyError>;

    async fn send_audio(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<MessageId, NotifyError>;

    async fn edit_message(&self, chat: ChatId, message: MessageId, text: &str) -> Result<(), NotifyError>;

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), NotifyError>;
}
