// Python yt-dlp backend - `python3 -m yt_dlp`
//
// Secondary YouTube backend: the module is often newer than a packaged
// binary and copes better with bot detection.

use async_trait::async_trait;
use tracing::warn;

use super::ytdlp::{Launcher, YtDlpBackend};
use crate::downloader::errors::DownloadError;
use crate::downloader::files::TempSlot;
use crate::downloader::models::{MediaDownload, MediaMetadata, NetworkConfig, Variant};
use crate::downloader::tools::python_has_module;
use crate::downloader::traits::MediaExtractor;

pub struct PythonYtDlp {
    inner: YtDlpBackend,
    available: bool,
}

impl PythonYtDlp {
    pub fn new(python_cmd: impl Into<String>, network: NetworkConfig, max_file_size: u64) -> Self {
        let python_cmd = python_cmd.into();
        let available = python_has_module(&python_cmd, "yt_dlp");
        if !available {
            warn!(target: "python-yt-dlp", python = %python_cmd, "yt_dlp module not importable; backend disabled");
        }

        Self {
            inner: YtDlpBackend::with_launcher(
                "python-yt-dlp",
                Launcher::python_module(python_cmd),
                network,
                max_file_size,
            ),
            available,
        }
    }

    pub fn with_process_timeout(mut self, secs: u64) -> Self {
        self.inner = self.inner.with_process_timeout(secs);
        self
    }

    fn ensure_available(&self) -> Result<(), DownloadError> {
        if self.available {
            Ok(())
        } else {
            Err(DownloadError::ToolNotFound("Python yt_dlp module not installed".to_string()))
        }
    }
}

#[async_trait]
impl MediaExtractor for PythonYtDlp {
    fn name(&self) -> &'static str {
        "python-yt-dlp"
    }

    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        self.ensure_available()?;
        self.inner.fetch_metadata(url).await
    }

    async fn fetch_media(
        &self,
        url: &str,
        variant: Variant,
        slot: &TempSlot,
    ) -> Result<MediaDownload, DownloadError> {
        self.ensure_available()?;
        self.inner.fetch_media(url, variant, slot).await
    }
}
