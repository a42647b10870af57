// Media extractor trait definition

use async_trait::async_trait;

use super::errors::DownloadError;
use super::files::TempSlot;
use super::models::{MediaDownload, MediaMetadata, Variant};

/// One extraction backend for one or more platforms
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Whether output is guaranteed free of platform watermarks
    fn watermark_free(&self) -> bool {
        false
    }

    /// Descriptive metadata; presentation-only
    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError>;

    /// Download `variant` into `slot`.
    ///
    /// `Err` means the whole attempt failed and the next backend may be tried.
    /// `Ok` carries one outcome per item; individual items may still be
    /// `Failed` or `TooLarge`. Backends that learn metadata while downloading
    /// return it alongside, so no separate lookup is needed for captions.
    async fn fetch_media(
        &self,
        url: &str,
        variant: Variant,
        slot: &TempSlot,
    ) -> Result<MediaDownload, DownloadError>;
}
