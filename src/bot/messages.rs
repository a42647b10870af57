// User-facing text
//
// Nothing here interpolates backend output. Titles and authors come from
// metadata and are the only dynamic strings.

use crate::downloader::models::{MediaMetadata, Platform, Variant};

pub const INVALID_URL: &str = "❌ Please send a valid URL from YouTube, Instagram, TikTok, or Twitter.";
pub const UNSUPPORTED_PLATFORM: &str =
    "❌ Unsupported platform. I only support YouTube, Instagram, TikTok, and Twitter.";
pub const INVALID_REQUEST: &str = "❌ Invalid request. Please send the link again.";
pub const URL_TOO_LONG: &str = "❌ This link is too long to process. Please send a shorter link.";
pub const UNEXPECTED: &str = "❌ An unexpected error occurred.";
pub const PROCESSING: &str = "Processing request...";

/// `50 MB` style label for the transport ceiling
pub fn size_label(bytes: u64) -> String {
    format!("{} MB", bytes / (1024 * 1024))
}

pub fn welcome(limit_label: &str) -> String {
    format!(
        "👋 Welcome to the media downloader bot!\n\n\
         I can download media from:\n\
         • 📹 YouTube\n\
         • 📷 Instagram\n\
         • 🎵 TikTok\n\
         • 🐦 Twitter/X\n\n\
         Send a URL from any supported platform and choose download options.\n\n\
         Commands:\n\
         /start - Show this message\n\
         /help - How to use\n\
         /support - Support info\n\n\
         Note: Large files may not be sent due to the {} limit.",
        limit_label
    )
}

pub fn help(limit_label: &str) -> String {
    format!(
        "🆘 How to Use This Bot 🆘\n\n\
         1. Copy a URL from a supported platform.\n\
         2. Send the URL to the bot.\n\
         3. Follow instructions and choose download format.\n\n\
         Supported Platforms Example URLs:\n\
         • YouTube: https://youtube.com/watch?v=...\n\
         • Instagram: https://instagram.com/p/...\n\
         • TikTok: https://tiktok.com/@user/video/...\n\
         • Twitter/X: https://twitter.com/user/status/...\n\n\
         File Limits: Max {}.",
        limit_label
    )
}

pub const SUPPORT: &str = "💬 Support Information\n\n\
     Ensure the URL is public and correct.\n\
     Try again later if content is unavailable.";

pub fn analyzing(platform: Platform) -> String {
    format!("🔍 Analyzing {} content...", platform.display_name())
}

pub fn downloading(platform: Platform) -> String {
    format!("⏳ Downloading {} media...", platform.display_name())
}

/// Text shown with the option keyboard
pub fn options_text(platform: Platform, meta: &MediaMetadata) -> String {
    match platform {
        Platform::YouTube => format!(
            "📹 YouTube Video\n\nTitle: {}\nChannel: {}\nDuration: {}\n\nChoose download format:",
            meta.title,
            meta.author,
            meta.duration_label()
        ),
        Platform::Instagram => format!("📷 Instagram Media Found ({} items)", meta.item_count),
        Platform::TikTok => match meta.caption() {
            Some(title) => format!("🎵 TikTok Video Detected\n\n{}\n\nChoose download option:", title),
            None => "🎵 TikTok Video Detected\n\nChoose download option:".to_string(),
        },
        Platform::Twitter => "🐦 Twitter/X Post Detected\n\nChoose download option:".to_string(),
    }
}

pub fn option_label(platform: Platform, variant: Variant) -> &'static str {
    match (platform, variant) {
        (_, Variant::Video) => "🎥 MP4 Video",
        (_, Variant::Audio) => "🎵 MP3 Audio",
        (Platform::TikTok, Variant::Download) => "📥 Download Video (No Watermark)",
        (Platform::Instagram, Variant::Download) => "📥 Download Video/Photos",
        (_, Variant::Download) => "📥 Download Media",
    }
}

pub fn extraction_failed(platform: Platform, hint: Option<&str>) -> String {
    let base = format!("❌ {} download failed.", platform.display_name());
    match hint {
        Some(hint) => format!("{} {}", base, hint),
        None => base,
    }
}

pub fn item_failed(platform: Platform, index: usize, total: usize) -> String {
    format!("❌ {} item {} of {} could not be downloaded.", platform.display_name(), index, total)
}

pub fn file_too_large(limit_label: &str) -> String {
    format!("❌ File too large for Telegram (limit {}).", limit_label)
}

pub fn transmission_failed(platform: Platform) -> String {
    format!("❌ Could not send the {} media. Please try again.", platform.display_name())
}
