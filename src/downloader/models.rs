// Common data models for downloader

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Supported content platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    Instagram,
    TikTok,
    Twitter,
}

impl Platform {
    /// Fixed classification priority
    pub const ALL: [Platform; 4] = [
        Platform::YouTube,
        Platform::Instagram,
        Platform::TikTok,
        Platform::Twitter,
    ];

    /// Lowercase tag used in file names and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::Instagram => "instagram",
            Self::TikTok => "tiktok",
            Self::Twitter => "twitter",
        }
    }

    /// Human-readable name for chat messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
            Self::Twitter => "Twitter/X",
        }
    }

    /// Download variants offered for this platform, in presentation order
    pub fn variants(&self) -> &'static [Variant] {
        match self {
            Self::YouTube => &[Variant::Video, Variant::Audio],
            Self::Instagram | Self::TikTok | Self::Twitter => &[Variant::Download],
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        match action.variant() {
            None => true,
            Some(variant) => self.variants().contains(&variant),
        }
    }

    /// Backends for this platform must not leave a platform watermark
    pub fn requires_watermark_free(&self) -> bool {
        matches!(self, Self::TikTok)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a backend is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    Video,
    Audio,
    /// Whatever the post contains (video, photo or album)
    Download,
}

/// Intent carried by a request token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Re-run the analysis phase
    Analyze,
    Video,
    Audio,
    Download,
}

impl Action {
    pub fn variant(&self) -> Option<Variant> {
        match self {
            Self::Analyze => None,
            Self::Video => Some(Variant::Video),
            Self::Audio => Some(Variant::Audio),
            Self::Download => Some(Variant::Download),
        }
    }
}

impl From<Variant> for Action {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Video => Self::Video,
            Variant::Audio => Self::Audio,
            Variant::Download => Self::Download,
        }
    }
}

/// Placeholder shown wherever a metadata field could not be retrieved
pub const UNKNOWN: &str = "Unknown";

/// Descriptive metadata, presentation-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub author: String,
    pub duration_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub item_count: usize,
}

impl MediaMetadata {
    /// Sentinel used when every metadata backend failed
    pub fn unknown() -> Self {
        Self {
            title: UNKNOWN.to_string(),
            author: UNKNOWN.to_string(),
            duration_seconds: None,
            thumbnail_url: None,
            item_count: 1,
        }
    }

    /// `m:ss` (or `h:mm:ss`), or the unknown sentinel
    pub fn duration_label(&self) -> String {
        match self.duration_seconds {
            Some(secs) => super::utils::format_duration(secs),
            None => UNKNOWN.to_string(),
        }
    }

    /// Title suitable for a caption, `None` when it is the sentinel
    pub fn caption(&self) -> Option<&str> {
        let title = self.title.trim();
        if title.is_empty() || title == UNKNOWN {
            None
        } else {
            Some(title)
        }
    }
}

/// Kind of a produced file, inferred from the file itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MimeCategory {
    Video,
    Audio,
    Image,
}

/// A single downloaded file awaiting transmission
#[derive(Debug, Clone, PartialEq)]
pub struct MediaArtifact {
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub mime_category: MimeCategory,
}

/// Result of one extraction attempt for one item
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Success(MediaArtifact),
    TooLarge { path: PathBuf, size_bytes: u64 },
    Failed { reason: String },
}

impl DownloadOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Everything one successful download attempt produced
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaDownload {
    pub outcomes: Vec<DownloadOutcome>,
    /// Metadata the backend learned while downloading, used for captions
    pub metadata: Option<MediaMetadata>,
}

impl MediaDownload {
    pub fn new(outcomes: Vec<DownloadOutcome>) -> Self {
        Self {
            outcomes,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<MediaMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn caption(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.caption())
    }
}

/// Network configuration for backends
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Socket timeout in seconds
    pub timeout: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Some(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_offers_video_and_audio() {
        assert_eq!(Platform::YouTube.variants(), &[Variant::Video, Variant::Audio]);
        assert!(Platform::YouTube.supports(Action::Audio));
        assert!(!Platform::YouTube.supports(Action::Download));
        assert!(Platform::YouTube.supports(Action::Analyze));
    }

    #[test]
    fn test_single_variant_platforms() {
        for platform in [Platform::Instagram, Platform::TikTok, Platform::Twitter] {
            assert_eq!(platform.variants(), &[Variant::Download]);
            assert!(!platform.supports(Action::Video));
        }
    }

    #[test]
    fn test_unknown_metadata_degrades_to_sentinel() {
        let meta = MediaMetadata::unknown();
        assert_eq!(meta.author, UNKNOWN);
        assert_eq!(meta.duration_label(), UNKNOWN);
        assert_eq!(meta.caption(), None);
    }
}
