// Request orchestration
//
// Two stateless phases share nothing but the request token:
//   text      IDLE -> ANALYZING -> OPTIONS_PRESENTED
//   selection OPTIONS_PRESENTED -> DOWNLOADING -> SENDING -> DONE
// with FAILED reachable from every active state. Every download phase owns a
// TempSlot, so files are swept however the phase ends.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::messages;
use super::notifier::{ChatId, Choice, MessageId, Notifier, PhotoSource};
use crate::config::Config;
use crate::downloader::classifier::{self, ClassifyError};
use crate::downloader::diagnostics::{diagnose, diagnose_error};
use crate::downloader::files::{TempFiles, TempSlot};
use crate::downloader::models::{
    Action, DownloadOutcome, MediaArtifact, MediaMetadata, MimeCategory, Platform, Variant,
};
use crate::downloader::orchestrator::ExtractorRegistry;
use crate::downloader::token::{RequestToken, TokenCodec, TokenError};
use crate::downloader::traits::MediaExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Analyzing,
    OptionsPresented,
    Downloading,
    Sending,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("input is not a valid URL")]
    InvalidUrl,

    #[error("URL does not belong to a supported platform")]
    UnsupportedPlatform,

    #[error("request token could not be decoded")]
    InvalidToken,

    #[error("URL too long for a request token")]
    UrlTooLong,

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("file too large: {size_bytes} bytes")]
    FileTooLarge { size_bytes: u64 },

    #[error("transmission failed: {0}")]
    TransmissionFailed(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<ClassifyError> for RequestError {
    fn from(e: ClassifyError) -> Self {
        match e {
            ClassifyError::InvalidUrl => Self::InvalidUrl,
            ClassifyError::UnsupportedPlatform => Self::UnsupportedPlatform,
        }
    }
}

impl From<TokenError> for RequestError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid => Self::InvalidToken,
            TokenError::UrlTooLong { .. } => Self::UrlTooLong,
        }
    }
}

/// One inbound event from the transport
#[derive(Debug, Clone)]
pub enum Inbound {
    Text { chat: ChatId, text: String },
    /// `message` is the option message the selection came from, if known
    Selection {
        chat: ChatId,
        message: Option<MessageId>,
        payload: String,
    },
}

impl Inbound {
    pub fn chat(&self) -> ChatId {
        match self {
            Self::Text { chat, .. } | Self::Selection { chat, .. } => *chat,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Selection { .. } => "selection",
        }
    }
}

/// What happened while handling one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestReport {
    pub trail: Vec<RequestState>,
    pub errors: Vec<RequestError>,
    /// Artifacts the notifier accepted
    pub delivered: usize,
    /// Temp files removed during the request
    pub disposed: usize,
    /// Options offered during analysis
    pub options: Vec<Choice>,
}

impl RequestReport {
    fn starting_at(state: RequestState) -> Self {
        Self {
            trail: vec![state],
            ..Self::default()
        }
    }

    fn enter(&mut self, state: RequestState) {
        debug!(target: "request", ?state, "transition");
        self.trail.push(state);
    }

    fn fail(&mut self, error: RequestError) {
        self.errors.push(error);
        self.enter(RequestState::Failed);
    }

    /// Last state reached
    pub fn state(&self) -> Option<RequestState> {
        self.trail.last().copied()
    }

    pub fn visited(&self, state: RequestState) -> bool {
        self.trail.contains(&state)
    }
}

pub struct RequestOrchestrator {
    registry: ExtractorRegistry,
    files: TempFiles,
    codec: TokenCodec,
    notifier: Arc<dyn Notifier>,
    limit_label: String,
}

impl RequestOrchestrator {
    pub fn new(
        registry: ExtractorRegistry,
        files: TempFiles,
        codec: TokenCodec,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let limit_label = messages::size_label(files.max_bytes());
        Self {
            registry,
            files,
            codec,
            notifier,
            limit_label,
        }
    }

    pub fn from_config(config: &Config, registry: ExtractorRegistry, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            registry,
            TempFiles::new(config.temp_dir.clone(), config.max_file_size),
            TokenCodec::new(config.payload_limit),
            notifier,
        )
    }

    pub fn files(&self) -> &TempFiles {
        &self.files
    }

    /// Top-level entry: runs the event on its own task so a panic degrades to
    /// the generic notice instead of leaving the request unresolved.
    pub async fn dispatch(self: &Arc<Self>, event: Inbound) -> RequestReport {
        let chat = event.chat();
        let span = info_span!("request", chat_id = chat, kind = event.kind());
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.handle(event).await }.instrument(span));

        match handle.await {
            Ok(report) => report,
            Err(e) => {
                error!(target: "request", chat_id = chat, panic = e.is_panic(), error = %e, "request task aborted");
                self.notify(chat, messages::UNEXPECTED).await;
                let mut report = RequestReport::default();
                report.fail(RequestError::Unexpected(e.to_string()));
                report
            }
        }
    }

    pub async fn handle(&self, event: Inbound) -> RequestReport {
        match event {
            Inbound::Text { chat, text } => self.handle_text(chat, &text).await,
            Inbound::Selection { chat, message, payload } => self.handle_selection(chat, message, &payload).await,
        }
    }

    /// Commands, then URL analysis
    pub async fn handle_text(&self, chat: ChatId, text: &str) -> RequestReport {
        let text = text.trim();
        if text.starts_with('/') {
            self.handle_command(chat, text).await;
            return RequestReport::starting_at(RequestState::Idle);
        }
        self.analyze(chat, text).await
    }

    async fn handle_command(&self, chat: ChatId, text: &str) {
        // `/help@SomeBot arg` -> `/help`
        let command = text
            .split_whitespace()
            .next()
            .and_then(|c| c.split('@').next())
            .unwrap_or_default();

        let reply = match command {
            "/start" => messages::welcome(&self.limit_label),
            "/help" => messages::help(&self.limit_label),
            "/support" => messages::SUPPORT.to_string(),
            other => {
                debug!(target: "request", command = other, "ignoring unknown command");
                return;
            }
        };
        self.notify(chat, &reply).await;
    }

    async fn analyze(&self, chat: ChatId, input: &str) -> RequestReport {
        let mut report = RequestReport::starting_at(RequestState::Idle);

        let (url, platform) = match classifier::parse_absolute(input)
            .and_then(|url| classifier::classify_url(&url).map(|p| (url, p)))
        {
            Ok(found) => found,
            Err(e) => {
                let error = RequestError::from(e);
                info!(target: "request", error = %error, "rejected input");
                self.notify(chat, user_message(&error)).await;
                report.fail(error);
                return report;
            }
        };

        report.enter(RequestState::Analyzing);
        let url = classifier::canonicalize(&url);
        info!(target: "request", %platform, url = %url, "analyzing");

        // Mint first: an unencodable URL makes the metadata call pointless
        let mut choices = Vec::new();
        for variant in platform.variants() {
            let token = RequestToken::new(platform, Action::from(*variant), url.clone());
            match self.codec.encode(&token) {
                Ok(payload) => choices.push(Choice::new(messages::option_label(platform, *variant), payload)),
                Err(e) => {
                    warn!(target: "request", error = %e, "cannot mint token");
                    let error = RequestError::from(e);
                    self.notify(chat, user_message(&error)).await;
                    report.fail(error);
                    return report;
                }
            }
        }

        let progress = self.send_progress(chat, &messages::analyzing(platform)).await;
        let meta = self.metadata(platform, &url).await;

        let text = messages::options_text(platform, &meta);
        let presented = match meta.thumbnail_url.as_ref().filter(|_| platform == Platform::YouTube) {
            Some(thumb) => match self
                .notifier
                .send_photo(chat, &PhotoSource::Url(thumb.clone()), Some(&text), &choices)
                .await
            {
                Ok(id) => Ok(id),
                Err(e) => {
                    warn!(target: "request", error = %e, "preview photo rejected, falling back to text");
                    self.notifier.send_text(chat, &text, &choices).await
                }
            },
            None => self.notifier.send_text(chat, &text, &choices).await,
        };

        self.clear_progress(chat, progress).await;

        match presented {
            Ok(_) => {
                report.options = choices;
                report.enter(RequestState::OptionsPresented);
            }
            Err(e) => {
                error!(target: "request", error = %e, "could not present options");
                report.fail(RequestError::TransmissionFailed(e.to_string()));
            }
        }
        report
    }

    /// Best-effort metadata; failures degrade to the sentinel
    async fn metadata(&self, platform: Platform, url: &str) -> MediaMetadata {
        let chain = match self.registry.get(platform) {
            Some(chain) => chain,
            None => return MediaMetadata::unknown(),
        };
        match chain.fetch_metadata(url).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(
                    target: "request",
                    %platform,
                    error = %e,
                    reason = diagnose(&e).description(),
                    "metadata unavailable"
                );
                MediaMetadata::unknown()
            }
        }
    }

    pub async fn handle_selection(&self, chat: ChatId, message: Option<MessageId>, payload: &str) -> RequestReport {
        let mut report = RequestReport::starting_at(RequestState::OptionsPresented);

        // The token is consumed here and never stored
        let token = match self.codec.decode(payload) {
            Ok(token) => token,
            Err(e) => {
                warn!(target: "request", payload_len = payload.len(), error = %e, "rejected token");
                let error = RequestError::InvalidToken;
                self.notify(chat, user_message(&error)).await;
                report.fail(error);
                return report;
            }
        };

        let variant = match token.action.variant() {
            Some(variant) => variant,
            None => return self.analyze(chat, &token.url).await,
        };

        report.enter(RequestState::Downloading);
        self.download(chat, message, token.platform, variant, &token.url, &mut report)
            .await;
        report
    }

    async fn download(
        &self,
        chat: ChatId,
        message: Option<MessageId>,
        platform: Platform,
        variant: Variant,
        url: &str,
        report: &mut RequestReport,
    ) {
        info!(target: "request", %platform, ?variant, url = %url, "downloading");

        let chain = match self.registry.get(platform) {
            Some(chain) => chain,
            None => {
                error!(target: "request", %platform, "no extractor chain registered");
                self.notify(chat, messages::UNEXPECTED).await;
                report.fail(RequestError::Unexpected(format!("no chain for {}", platform)));
                return;
            }
        };

        let slot = match self.files.allocate(platform) {
            Ok(slot) => slot,
            Err(e) => {
                error!(target: "request", error = %e, "temp allocation failed");
                self.notify(chat, messages::UNEXPECTED).await;
                report.fail(RequestError::Unexpected(e.to_string()));
                return;
            }
        };

        let progress = match message {
            Some(id) => match self.notifier.edit_message(chat, id, &messages::downloading(platform)).await {
                Ok(()) => Some(id),
                Err(e) => {
                    debug!(target: "request", error = %e, "could not edit option message");
                    self.send_progress(chat, &messages::downloading(platform)).await
                }
            },
            None => self.send_progress(chat, &messages::downloading(platform)).await,
        };

        match chain.fetch_media(url, variant, &slot).await {
            Err(e) => {
                let reason = diagnose(&e);
                warn!(target: "request", %platform, error = %e, reason = reason.description(), "extraction failed");
                self.notify(chat, &messages::extraction_failed(platform, reason.user_hint()))
                    .await;
                report.fail(RequestError::ExtractionFailed(e.to_string()));
            }
            Ok(download) => {
                report.enter(RequestState::Sending);
                let caption = download.caption().map(str::to_string);
                let total = download.outcomes.len();
                for (i, outcome) in download.outcomes.into_iter().enumerate() {
                    self.deliver(chat, platform, caption.as_deref(), outcome, i + 1, total, report, &slot)
                        .await;
                }
                report.enter(if report.delivered > 0 {
                    RequestState::Done
                } else {
                    RequestState::Failed
                });
            }
        }

        report.disposed += slot.release();
        self.clear_progress(chat, progress).await;
        info!(
            target: "request",
            delivered = report.delivered,
            disposed = report.disposed,
            errors = report.errors.len(),
            state = ?report.state(),
            "request finished"
        );
    }

    #[allow(clippy::too_many_arguments)]
    async fn deliver(
        &self,
        chat: ChatId,
        platform: Platform,
        caption: Option<&str>,
        outcome: DownloadOutcome,
        index: usize,
        total: usize,
        report: &mut RequestReport,
        slot: &TempSlot,
    ) {
        match outcome {
            DownloadOutcome::Success(artifact) => {
                match self.transmit(chat, &artifact, caption).await {
                    Ok(_) => {
                        report.delivered += 1;
                        debug!(target: "request", item = index, size = artifact.size_bytes, "delivered");
                    }
                    Err(e) => {
                        warn!(target: "request", item = index, error = %e, "transmission failed");
                        self.notify(chat, &messages::transmission_failed(platform)).await;
                        report.errors.push(RequestError::TransmissionFailed(e.to_string()));
                    }
                }
                if slot.dispose(&artifact.local_path) {
                    report.disposed += 1;
                }
            }
            DownloadOutcome::TooLarge { path, size_bytes } => {
                info!(target: "request", item = index, size_bytes, "artifact over size limit");
                self.notify(chat, &messages::file_too_large(&self.limit_label)).await;
                report.errors.push(RequestError::FileTooLarge { size_bytes });
                if slot.dispose(&path) {
                    report.disposed += 1;
                }
            }
            DownloadOutcome::Failed { reason } => {
                warn!(target: "request", item = index, reason = %reason, "item failed");
                let text = if total > 1 {
                    messages::item_failed(platform, index, total)
                } else {
                    let hint = diagnose_error(&reason).and_then(|r| r.user_hint());
                    messages::extraction_failed(platform, hint)
                };
                self.notify(chat, &text).await;
                report.errors.push(RequestError::ExtractionFailed(reason));
            }
        }
    }

    async fn transmit(
        &self,
        chat: ChatId,
        artifact: &MediaArtifact,
        caption: Option<&str>,
    ) -> Result<MessageId, super::notifier::NotifyError> {
        let path = artifact.local_path.as_path();
        match artifact.mime_category {
            MimeCategory::Video => self.notifier.send_video(chat, path, caption).await,
            MimeCategory::Audio => self.notifier.send_audio(chat, path, caption).await,
            MimeCategory::Image => {
                self.notifier
                    .send_photo(chat, &PhotoSource::File(path.to_path_buf()), caption, &[])
                    .await
            }
        }
    }

    async fn notify(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.notifier.send_text(chat, text, &[]).await {
            warn!(target: "request", chat_id = chat, error = %e, "could not send notice");
        }
    }

    async fn send_progress(&self, chat: ChatId, text: &str) -> Option<MessageId> {
        match self.notifier.send_text(chat, text, &[]).await {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(target: "request", error = %e, "progress message not sent");
                None
            }
        }
    }

    async fn clear_progress(&self, chat: ChatId, progress: Option<MessageId>) {
        if let Some(id) = progress {
            if let Err(e) = self.notifier.delete_message(chat, id).await {
                debug!(target: "request", error = %e, "progress message not cleared");
            }
        }
    }
}

/// Fixed text for request-level errors
pub fn user_message(error: &RequestError) -> &'static str {
    match error {
        RequestError::InvalidUrl => messages::INVALID_URL,
        RequestError::UnsupportedPlatform => messages::UNSUPPORTED_PLATFORM,
        RequestError::InvalidToken => messages::INVALID_REQUEST,
        RequestError::UrlTooLong => messages::URL_TOO_LONG,
        _ => messages::UNEXPECTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::notifier::NotifyError;
    use crate::downloader::errors::DownloadError;
    use crate::downloader::models::MediaDownload;
    use crate::downloader::orchestrator::ExtractorChain;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        texts: Mutex<Vec<String>>,
        next_id: AtomicI64,
    }

    impl Recorder {
        fn texts(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send_text(&self, _chat: ChatId, text: &str, _choices: &[Choice]) -> Result<MessageId, NotifyError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn send_photo(
            &self,
            _chat: ChatId,
            _photo: &PhotoSource,
            _caption: Option<&str>,
            _choices: &[Choice],
        ) -> Result<MessageId, NotifyError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn send_video(&self, _chat: ChatId, _path: &Path, _caption: Option<&str>) -> Result<MessageId, NotifyError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn send_audio(&self, _chat: ChatId, _path: &Path, _caption: Option<&str>) -> Result<MessageId, NotifyError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn edit_message(&self, _chat: ChatId, _message: MessageId, _text: &str) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn delete_message(&self, _chat: ChatId, _message: MessageId) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    struct Panicking;

    #[async_trait]
    impl MediaExtractor for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn watermark_free(&self) -> bool {
            true
        }

        async fn fetch_metadata(&self, _url: &str) -> Result<MediaMetadata, DownloadError> {
            Err(DownloadError::Unknown("no metadata".to_string()))
        }

        async fn fetch_media(
            &self,
            _url: &str,
            _variant: Variant,
            slot: &TempSlot,
        ) -> Result<MediaDownload, DownloadError> {
            std::fs::write(slot.path_with_ext("mp4"), b"half")?;
            panic!("backend bug");
        }
    }

    fn orchestrator(dir: &Path, registry: ExtractorRegistry) -> (Arc<RequestOrchestrator>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let orch = RequestOrchestrator::new(
            registry,
            TempFiles::new(dir, 50 * 1024 * 1024),
            TokenCodec::default(),
            recorder.clone(),
        );
        (Arc::new(orch), recorder)
    }

    #[tokio::test]
    async fn test_commands_stay_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, recorder) = orchestrator(dir.path(), ExtractorRegistry::new());

        let report = orch.handle_text(1, "/help@linkfetch_bot").await;
        assert_eq!(report.trail, vec![RequestState::Idle]);
        assert!(recorder.texts()[0].contains("Max 50 MB"));

        orch.handle_text(1, "/unknown").await;
        assert_eq!(recorder.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_platform_skips_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, recorder) = orchestrator(dir.path(), ExtractorRegistry::new());

        let report = orch.handle_text(1, "https://example.com/video/1").await;
        assert_eq!(report.trail, vec![RequestState::Idle, RequestState::Failed]);
        assert_eq!(report.errors, vec![RequestError::UnsupportedPlatform]);
        assert_eq!(recorder.texts(), vec![messages::UNSUPPORTED_PLATFORM.to_string()]);
    }

    #[tokio::test]
    async fn test_overlong_url_reports_too_long() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, recorder) = orchestrator(dir.path(), ExtractorRegistry::new());

        let url = format!("https://twitter.com/user/status/{}", "9".repeat(80));
        let report = orch.handle_text(1, &url).await;
        assert_eq!(report.errors, vec![RequestError::UrlTooLong]);
        assert!(report.visited(RequestState::Analyzing));
        assert_eq!(recorder.texts(), vec![messages::URL_TOO_LONG.to_string()]);
    }

    #[tokio::test]
    async fn test_analysis_without_chain_still_offers_options() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(dir.path(), ExtractorRegistry::new());

        let report = orch.handle_text(1, "https://x.com/user/status/123?s=20").await;
        assert_eq!(report.state(), Some(RequestState::OptionsPresented));
        assert_eq!(report.options.len(), 1);

        let token = TokenCodec::default().decode(&report.options[0].payload).unwrap();
        assert_eq!(token.url, "https://x.com/user/status/123");
        assert_eq!(token.action, Action::Download);
    }

    #[tokio::test]
    async fn test_panic_degrades_to_unexpected_notice() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ExtractorChain::new(Platform::TikTok, Duration::from_secs(5), Duration::from_secs(5))
            .with_backend(Box::new(Panicking));
        let (orch, recorder) = orchestrator(dir.path(), ExtractorRegistry::new().with_chain(chain));

        let analysis = orch.handle_text(7, "https://www.tiktok.com/@user/video/123").await;
        let payload = analysis.options[0].payload.clone();

        let report = orch
            .dispatch(Inbound::Selection {
                chat: 7,
                message: None,
                payload,
            })
            .await;
        assert_eq!(report.state(), Some(RequestState::Failed));
        assert!(matches!(report.errors[0], RequestError::Unexpected(_)));
        assert_eq!(recorder.texts().last().map(String::as_str), Some(messages::UNEXPECTED));
        // Unwinding dropped the slot
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
