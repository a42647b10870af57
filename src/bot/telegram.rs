// Telegram transport
//
// `TelegramClient` implements `Notifier` over a teloxide `Bot`; files go up
// with `InputFile::file`. Updates are driven by teloxide's polling dispatcher
// and every event is handed to the orchestrator on its own task.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId as TgChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId as TgMessageId,
};
use teloxide::{Bot, RequestError};
use tracing::{debug, info, warn};

use super::messages;
use super::notifier::{ChatId, Choice, MessageId, Notifier, NotifyError, PhotoSource};
use super::orchestrator::{Inbound, RequestOrchestrator};
use crate::downloader::models::NetworkConfig;
use crate::downloader::utils::http_client;

/// Budget for one API call, uploads included
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

const CAPTION_LIMIT: usize = 1024;
const TEXT_LIMIT: usize = 4096;

impl From<RequestError> for NotifyError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Api(api) => NotifyError::Api(api.to_string()),
            RequestError::Io(io) => NotifyError::Io(io),
            other => NotifyError::Transport(other.to_string()),
        }
    }
}

pub fn keyboard(choices: &[Choice]) -> InlineKeyboardMarkup {
    let row: Vec<InlineKeyboardButton> = choices
        .iter()
        .map(|c| InlineKeyboardButton::callback(c.label.clone(), c.payload.clone()))
        .collect();
    InlineKeyboardMarkup::new(vec![row])
}

/// Cut to at most `limit` characters
fn clip(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn message_id(id: MessageId) -> Result<TgMessageId, NotifyError> {
    i32::try_from(id)
        .map(TgMessageId)
        .map_err(|_| NotifyError::Transport(format!("message id out of range: {}", id)))
}

/// Text messages become analysis requests; other content is ignored
pub fn message_event(message: &Message) -> Option<Inbound> {
    Some(Inbound::Text {
        chat: message.chat.id.0,
        text: message.text()?.to_string(),
    })
}

/// Button presses become selections on the message that carried them
pub fn callback_event(query: &CallbackQuery) -> Option<Inbound> {
    let message = query.message.as_ref()?;
    Some(Inbound::Selection {
        chat: message.chat.id.0,
        message: Some(i64::from(message.id.0)),
        payload: query.data.clone().unwrap_or_default(),
    })
}

pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, network: &NetworkConfig) -> Result<Self, NotifyError> {
        let http = http_client(network, REQUEST_TIMEOUT_SECS).map_err(|e| NotifyError::Transport(e.to_string()))?;
        let api = url::Url::parse(api_url)
            .map_err(|e| NotifyError::Transport(format!("invalid API URL {}: {}", api_url, e)))?;
        Ok(Self {
            bot: Bot::with_client(token, http).set_api_url(api),
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_text(&self, chat: ChatId, text: &str, choices: &[Choice]) -> Result<MessageId, NotifyError> {
        let mut request = self
            .bot
            .send_message(TgChatId(chat), clip(text, TEXT_LIMIT))
            .disable_web_page_preview(true);
        if !choices.is_empty() {
            request = request.reply_markup(keyboard(choices));
        }
        let message = request.await?;
        Ok(i64::from(message.id.0))
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        photo: &PhotoSource,
        caption: Option<&str>,
        choices: &[Choice],
    ) -> Result<MessageId, NotifyError> {
        let input = match photo {
            PhotoSource::Url(url) => {
                let url = url::Url::parse(url).map_err(|e| NotifyError::Transport(format!("bad photo URL: {}", e)))?;
                InputFile::url(url)
            }
            PhotoSource::File(path) => InputFile::file(path),
        };

        let mut request = self.bot.send_photo(TgChatId(chat), input);
        if let Some(caption) = caption {
            request = request.caption(clip(caption, CAPTION_LIMIT));
        }
        if !choices.is_empty() {
            request = request.reply_markup(keyboard(choices));
        }
        let message = request.await?;
        Ok(i64::from(message.id.0))
    }

    async fn send_video(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<MessageId, NotifyError> {
        debug!(target: "telegram", path = %path.display(), "uploading video");
        let mut request = self
            .bot
            .send_video(TgChatId(chat), InputFile::file(path))
            .supports_streaming(true);
        if let Some(caption) = caption {
            request = request.caption(clip(caption, CAPTION_LIMIT));
        }
        let message = request.await?;
        Ok(i64::from(message.id.0))
    }

    async fn send_audio(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<MessageId, NotifyError> {
        debug!(target: "telegram", path = %path.display(), "uploading audio");
        let mut request = self.bot.send_audio(TgChatId(chat), InputFile::file(path));
        if let Some(caption) = caption {
            request = request.caption(clip(caption, CAPTION_LIMIT));
        }
        let message = request.await?;
        Ok(i64::from(message.id.0))
    }

    async fn edit_message(&self, chat: ChatId, message: MessageId, text: &str) -> Result<(), NotifyError> {
        self.bot
            .edit_message_text(TgChatId(chat), message_id(message)?, clip(text, TEXT_LIMIT))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), NotifyError> {
        self.bot.delete_message(TgChatId(chat), message_id(message)?).await?;
        Ok(())
    }
}

fn spawn_request(orchestrator: Arc<RequestOrchestrator>, event: Inbound) {
    // The dispatcher queues per chat; requests must not wait on each other
    tokio::spawn(async move {
        orchestrator.dispatch(event).await;
    });
}

async fn on_message(message: Message, orchestrator: Arc<RequestOrchestrator>) -> ResponseResult<()> {
    if let Some(event) = message_event(&message) {
        spawn_request(orchestrator, event);
    }
    Ok(())
}

async fn on_callback(bot: Bot, query: CallbackQuery, orchestrator: Arc<RequestOrchestrator>) -> ResponseResult<()> {
    if let Err(e) = bot.answer_callback_query(query.id.clone()).text(messages::PROCESSING).await {
        debug!(target: "telegram", error = %e, "answerCallbackQuery failed");
    }
    if let Some(event) = callback_event(&query) {
        spawn_request(orchestrator, event);
    }
    Ok(())
}

/// Stop the dispatcher on SIGTERM; Ctrl-C is handled by teloxide itself
#[cfg(unix)]
fn shutdown_on_sigterm(token: ShutdownToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(target: "telegram", error = %e, "cannot listen for SIGTERM");
                return;
            }
        };
        term.recv().await;
        info!(target: "telegram", "SIGTERM received, shutting down");
        match token.shutdown() {
            Ok(done) => done.await,
            Err(e) => debug!(target: "telegram", error = %e, "dispatcher was not running"),
        }
    });
}

#[cfg(not(unix))]
fn shutdown_on_sigterm(_token: ShutdownToken) {}

/// Long-poll until Ctrl-C or SIGTERM
pub async fn run_polling(client: Arc<TelegramClient>, orchestrator: Arc<RequestOrchestrator>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    let mut dispatcher = Dispatcher::builder(client.bot().clone(), handler)
        .dependencies(dptree::deps![orchestrator])
        .default_handler(|update| async move {
            debug!(target: "telegram", update_id = update.id, "ignoring update");
        })
        .enable_ctrlc_handler()
        .build();

    shutdown_on_sigterm(dispatcher.shutdown_token());
    info!(target: "telegram", "polling for updates");
    dispatcher.dispatch().await;
    info!(target: "telegram", "dispatcher stopped");
}
