// End-to-end request flows against in-memory extractors and notifier

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use linkfetch::bot::messages;
use linkfetch::bot::notifier::{ChatId, Choice, MessageId, Notifier, NotifyError, PhotoSource};
use linkfetch::bot::orchestrator::{Inbound, RequestError, RequestOrchestrator, RequestState};
use linkfetch::downloader::errors::DownloadError;
use linkfetch::downloader::files::{TempFiles, TempSlot};
use linkfetch::downloader::models::{DownloadOutcome, MediaDownload, MediaMetadata, Platform, Variant};
use linkfetch::downloader::orchestrator::{ExtractorChain, ExtractorRegistry};
use linkfetch::downloader::token::TokenCodec;
use linkfetch::downloader::traits::MediaExtractor;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(String),
    Photo { source: PhotoSource, caption: Option<String> },
    Video { name: String, caption: Option<String> },
    Audio { name: String },
    Edit(String),
    Delete(MessageId),
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    /// How many upcoming video uploads the transport rejects
    reject_videos: AtomicUsize,
}

impl RecordingNotifier {
    fn rejecting_videos(count: usize) -> Self {
        Self {
            reject_videos: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) -> MessageId {
        self.sent.lock().unwrap().push(sent);
        self.next_id.fetch_add(1, Ordering::SeqCst) + 100
    }
}

fn file_name(path: &Path) -> String {
    // Transmission needs the file on disk
    assert!(path.is_file(), "artifact missing at send time: {}", path.display());
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, _chat: ChatId, text: &str, _choices: &[Choice]) -> Result<MessageId, NotifyError> {
        Ok(self.record(Sent::Text(text.to_string())))
    }

    async fn send_photo(
        &self,
        _chat: ChatId,
        photo: &PhotoSource,
        caption: Option<&str>,
        _choices: &[Choice],
    ) -> Result<MessageId, NotifyError> {
        if let PhotoSource::File(path) = photo {
            file_name(path);
        }
        Ok(self.record(Sent::Photo {
            source: photo.clone(),
            caption: caption.map(str::to_string),
        }))
    }

    async fn send_video(&self, _chat: ChatId, path: &Path, caption: Option<&str>) -> Result<MessageId, NotifyError> {
        let rejected = self
            .reject_videos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(NotifyError::Api("Bad Request: wrong file identifier".to_string()));
        }
        Ok(self.record(Sent::Video {
            name: file_name(path),
            caption: caption.map(str::to_string),
        }))
    }

    async fn send_audio(&self, _chat: ChatId, path: &Path, _caption: Option<&str>) -> Result<MessageId, NotifyError> {
        Ok(self.record(Sent::Audio { name: file_name(path) }))
    }

    async fn edit_message(&self, _chat: ChatId, _message: MessageId, text: &str) -> Result<(), NotifyError> {
        self.record(Sent::Edit(text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, _chat: ChatId, message: MessageId) -> Result<(), NotifyError> {
        self.record(Sent::Delete(message));
        Ok(())
    }
}

type MediaScript = dyn Fn(Variant, &TempSlot) -> Result<Vec<DownloadOutcome>, DownloadError> + Send + Sync;

/// Extractor driven by a closure; counts calls
struct FakeExtractor {
    name: &'static str,
    metadata: Option<MediaMetadata>,
    media: Box<MediaScript>,
    media_calls: Arc<AtomicUsize>,
    variants: Arc<Mutex<Vec<Variant>>>,
}

impl FakeExtractor {
    fn new<F>(name: &'static str, metadata: Option<MediaMetadata>, media: F) -> Self
    where
        F: Fn(Variant, &TempSlot) -> Result<Vec<DownloadOutcome>, DownloadError> + Send + Sync + 'static,
    {
        Self {
            name,
            metadata,
            media: Box::new(media),
            media_calls: Arc::new(AtomicUsize::new(0)),
            variants: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn watermark_free(&self) -> bool {
        true
    }

    async fn fetch_metadata(&self, _url: &str) -> Result<MediaMetadata, DownloadError> {
        self.metadata
            .clone()
            .ok_or_else(|| DownloadError::Unavailable("metadata endpoint down".to_string()))
    }

    async fn fetch_media(
        &self,
        _url: &str,
        variant: Variant,
        slot: &TempSlot,
    ) -> Result<MediaDownload, DownloadError> {
        self.media_calls.fetch_add(1, Ordering::SeqCst);
        self.variants.lock().unwrap().push(variant);
        (self.media)(variant, slot).map(|outcomes| MediaDownload::new(outcomes).with_metadata(self.metadata.clone()))
    }
}

fn chain(platform: Platform, backends: Vec<FakeExtractor>) -> ExtractorChain {
    backends.into_iter().fold(
        ExtractorChain::new(platform, Duration::from_secs(5), Duration::from_secs(5)),
        |chain, backend| chain.with_backend(Box::new(backend)),
    )
}

struct Harness {
    _dir: tempfile::TempDir,
    root: PathBuf,
    orchestrator: Arc<RequestOrchestrator>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(registry: ExtractorRegistry) -> Self {
        Self::with_notifier(registry, RecordingNotifier::default())
    }

    fn with_notifier(registry: ExtractorRegistry, notifier: RecordingNotifier) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("linkfetch");
        let notifier = Arc::new(notifier);
        let orchestrator = Arc::new(RequestOrchestrator::new(
            registry,
            TempFiles::new(&root, 50 * MIB),
            TokenCodec::default(),
            notifier.clone(),
        ));
        Self {
            _dir: dir,
            root,
            orchestrator,
            notifier,
        }
    }

    fn leftover_files(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.root) {
            Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn write(path: PathBuf, bytes: &[u8]) -> PathBuf {
    fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn youtube_without_metadata_still_offers_both_formats_and_rejects_oversize_audio() {
    let backend = FakeExtractor::new("oversize", None, |_variant, slot| {
        let path = slot.path_with_ext("mp3");
        let file = fs::File::create(&path)?;
        file.set_len(80 * MIB)?;
        Ok(vec![slot.outcome_for(&path)])
    });
    let harness = Harness::new(ExtractorRegistry::new().with_chain(chain(Platform::YouTube, vec![backend])));

    let analysis = harness
        .orchestrator
        .handle_text(1, "https://youtube.com/watch?v=abc123")
        .await;
    assert_eq!(
        analysis.trail,
        vec![RequestState::Idle, RequestState::Analyzing, RequestState::OptionsPresented]
    );
    assert_eq!(analysis.options.len(), 2);
    assert!(analysis.options.iter().all(|c| c.payload.len() <= 64));

    // Sentinel metadata rendered as text, no thumbnail
    let presented = harness.notifier.texts();
    assert!(presented.iter().any(|t| t.contains("Title: Unknown")));

    let codec = TokenCodec::default();
    let audio = analysis
        .options
        .iter()
        .find(|c| codec.decode(&c.payload).map(|t| t.action.variant()) == Ok(Some(Variant::Audio)))
        .expect("audio option")
        .payload
        .clone();

    let report = harness
        .orchestrator
        .dispatch(Inbound::Selection {
            chat: 1,
            message: Some(42),
            payload: audio,
        })
        .await;

    assert_eq!(report.errors, vec![RequestError::FileTooLarge { size_bytes: 80 * MIB }]);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.state(), Some(RequestState::Failed));
    assert!(report.visited(RequestState::Sending));
    assert!(harness.notifier.sent().iter().all(|s| !matches!(s, Sent::Audio { .. })));
    assert!(harness
        .notifier
        .texts()
        .contains(&messages::file_too_large("50 MB")));
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn instagram_album_delivers_remaining_items_when_one_fails() {
    let backend = FakeExtractor::new("album", None, |_variant, slot| {
        let first = write(slot.item_path(1, "jpg"), b"\xff\xd8\xffphoto-one");
        // Item 2 died mid-transfer
        write(slot.item_path(2, "jpg.part"), b"partial");
        let third = write(slot.item_path(3, "mp4"), b"\x00\x00\x00\x18ftypmp42video");
        Ok(vec![
            slot.outcome_for(&first),
            DownloadOutcome::failed("HTTP Error 404: Not Found"),
            slot.outcome_for(&third),
        ])
    });
    let harness = Harness::new(ExtractorRegistry::new().with_chain(chain(Platform::Instagram, vec![backend])));

    let analysis = harness.orchestrator.handle_text(5, "https://instagram.com/p/XYZ/").await;
    assert_eq!(analysis.options.len(), 1);

    let report = harness
        .orchestrator
        .dispatch(Inbound::Selection {
            chat: 5,
            message: None,
            payload: analysis.options[0].payload.clone(),
        })
        .await;

    assert_eq!(report.delivered, 2);
    assert_eq!(report.disposed, 3);
    assert_eq!(report.state(), Some(RequestState::Done));
    assert!(matches!(report.errors.as_slice(), [RequestError::ExtractionFailed(_)]));

    let sent = harness.notifier.sent();
    assert_eq!(sent.iter().filter(|s| matches!(s, Sent::Photo { .. })).count(), 1);
    assert_eq!(sent.iter().filter(|s| matches!(s, Sent::Video { .. })).count(), 1);
    assert!(harness
        .notifier
        .texts()
        .contains(&messages::item_failed(Platform::Instagram, 2, 3)));
    // Backend text never reaches the user
    assert!(harness.notifier.texts().iter().all(|t| !t.contains("404")));
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn tampered_token_never_reaches_an_extractor() {
    let backend = FakeExtractor::new("never", None, |_variant, slot| {
        let path = write(slot.path_with_ext("mp4"), b"video");
        Ok(vec![slot.outcome_for(&path)])
    });
    let calls = backend.media_calls.clone();
    let harness = Harness::new(ExtractorRegistry::new().with_chain(chain(Platform::YouTube, vec![backend])));

    let analysis = harness.orchestrator.handle_text(9, "https://youtu.be/abc123").await;
    let valid = analysis.options[0].payload.clone();

    let mut wrong_platform = valid.clone();
    wrong_platform.replace_range(0..1, "i");
    let tampered = [
        wrong_platform,
        valid.replacen(':', "", 1),
        valid[..5].to_string(),
        "youtube_video_aHR0cHM6Ly95b3V0dS5iZS9hYmMxMjM=".to_string(),
        String::new(),
    ];

    for payload in tampered {
        let report = harness
            .orchestrator
            .dispatch(Inbound::Selection {
                chat: 9,
                message: None,
                payload: payload.clone(),
            })
            .await;
        assert_eq!(report.errors, vec![RequestError::InvalidToken], "{}", payload);
        assert!(!report.visited(RequestState::Downloading));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(harness.leftover_files().is_empty());
    let texts = harness.notifier.texts();
    assert_eq!(texts.iter().filter(|t| *t == messages::INVALID_REQUEST).count(), 5);
}

#[tokio::test]
async fn plain_text_is_rejected_before_analysis() {
    let harness = Harness::new(ExtractorRegistry::new());

    let report = harness.orchestrator.handle_text(3, "hello").await;
    assert_eq!(report.trail, vec![RequestState::Idle, RequestState::Failed]);
    assert_eq!(report.errors, vec![RequestError::InvalidUrl]);
    assert!(!report.visited(RequestState::Analyzing));
    assert_eq!(harness.notifier.texts(), vec![messages::INVALID_URL.to_string()]);
}

#[tokio::test]
async fn youtube_falls_back_with_same_variant_and_captions_with_title() {
    let primary = FakeExtractor::new("primary", None, |_variant, slot| {
        write(slot.path_with_ext("mp4.part"), b"half");
        Err(DownloadError::from("ERROR: HTTP Error 403: Forbidden"))
    });
    let mut meta = MediaMetadata::unknown();
    meta.title = "Never Gonna".to_string();
    meta.author = "Rick".to_string();
    let secondary = FakeExtractor::new("secondary", Some(meta), |variant, slot| {
        assert_eq!(variant, Variant::Video);
        let path = write(slot.path_with_ext("mp4"), b"\x00\x00\x00\x18ftypisomvideo");
        Ok(vec![slot.outcome_for(&path)])
    });
    let (first_calls, second_variants) = (primary.media_calls.clone(), secondary.variants.clone());
    let harness = Harness::new(
        ExtractorRegistry::new().with_chain(chain(Platform::YouTube, vec![primary, secondary])),
    );

    let analysis = harness
        .orchestrator
        .handle_text(2, "https://www.youtube.com/watch?v=dQw4w9WgXcQ&si=share123")
        .await;
    let video = analysis.options[0].payload.clone();

    let report = harness
        .orchestrator
        .dispatch(Inbound::Selection {
            chat: 2,
            message: Some(77),
            payload: video,
        })
        .await;

    assert_eq!(report.state(), Some(RequestState::Done));
    assert_eq!(report.delivered, 1);
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*second_variants.lock().unwrap(), vec![Variant::Video]);

    let sent = harness.notifier.sent();
    assert!(sent.contains(&Sent::Edit(messages::downloading(Platform::YouTube))));
    assert!(sent.contains(&Sent::Delete(77)));
    assert!(sent
        .iter()
        .any(|s| matches!(s, Sent::Video { caption: Some(c), .. } if c == "Never Gonna")));
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn exhausted_chain_reports_platform_failure_without_leaks() {
    let failing = |name: &'static str| {
        FakeExtractor::new(name, None, |_variant, slot| {
            write(slot.path_with_ext("mp4.part"), b"partial");
            Err(DownloadError::from("ERROR: Private video. Sign in if you've been granted access"))
        })
    };
    let harness = Harness::new(
        ExtractorRegistry::new().with_chain(chain(Platform::YouTube, vec![failing("a"), failing("b")])),
    );

    let analysis = harness.orchestrator.handle_text(4, "https://youtu.be/private1").await;
    let report = harness
        .orchestrator
        .dispatch(Inbound::Selection {
            chat: 4,
            message: None,
            payload: analysis.options[1].payload.clone(),
        })
        .await;

    assert_eq!(report.state(), Some(RequestState::Failed));
    assert!(matches!(report.errors.as_slice(), [RequestError::ExtractionFailed(_)]));
    let last = harness.notifier.texts().last().cloned().unwrap();
    assert!(last.starts_with("❌ YouTube download failed."));
    assert!(!last.contains("Sign in"));
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn concurrent_requests_leave_no_files_behind() {
    let backend = FakeExtractor::new("busy", None, |_variant, slot| {
        let path = write(slot.path_with_ext("mp4"), b"\x00\x00\x00\x18ftypisomvideo");
        write(slot.path_with_ext("mp4.ytdl"), b"state");
        Ok(vec![slot.outcome_for(&path)])
    });
    let harness = Harness::new(ExtractorRegistry::new().with_chain(chain(Platform::TikTok, vec![backend])));

    let analysis = harness
        .orchestrator
        .handle_text(8, "https://www.tiktok.com/@user/video/7234567890123456789")
        .await;
    let payload = analysis.options[0].payload.clone();

    let handles: Vec<_> = (0..16)
        .map(|chat| {
            let orchestrator = harness.orchestrator.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                orchestrator
                    .dispatch(Inbound::Selection {
                        chat,
                        message: None,
                        payload,
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.disposed, 2);
    }
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn rejected_upload_fails_only_that_item() {
    let backend = FakeExtractor::new("thread", None, |_variant, slot| {
        let first = write(slot.item_path(1, "mp4"), b"\x00\x00\x00\x18ftypisomfirst");
        let second = write(slot.item_path(2, "mp4"), b"\x00\x00\x00\x18ftypisomsecond");
        Ok(vec![slot.outcome_for(&first), slot.outcome_for(&second)])
    });
    let harness = Harness::with_notifier(
        ExtractorRegistry::new().with_chain(chain(Platform::Twitter, vec![backend])),
        RecordingNotifier::rejecting_videos(1),
    );

    let analysis = harness
        .orchestrator
        .handle_text(6, "https://twitter.com/user/status/1234567890")
        .await;
    let report = harness
        .orchestrator
        .dispatch(Inbound::Selection {
            chat: 6,
            message: None,
            payload: analysis.options[0].payload.clone(),
        })
        .await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.disposed, 2);
    assert_eq!(report.state(), Some(RequestState::Done));
    assert!(matches!(report.errors.as_slice(), [RequestError::TransmissionFailed(_)]));

    let sent = harness.notifier.sent();
    assert_eq!(sent.iter().filter(|s| matches!(s, Sent::Video { .. })).count(), 1);
    assert!(sent
        .iter()
        .any(|s| matches!(s, Sent::Video { name, .. } if name.ends_with("_2.mp4"))));

    let texts = harness.notifier.texts();
    assert!(texts.contains(&messages::transmission_failed(Platform::Twitter)));
    assert!(texts.iter().all(|t| !t.contains("Bad Request")));
    assert!(harness.leftover_files().is_empty());
}
