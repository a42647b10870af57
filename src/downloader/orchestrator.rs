// Orchestrator with fallback logic
//
// Each platform owns an ordered chain of backends. Every attempt runs under a
// timeout; on failure the next backend is tried with the same variant, and
// only the last failure is surfaced.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::backends::{PythonYtDlp, TikWmBackend, YtDlpBackend};
use super::diagnostics::diagnose;
use super::errors::DownloadError;
use super::files::TempSlot;
use super::models::{DownloadOutcome, MediaDownload, MediaMetadata, Platform, Variant};
use super::traits::MediaExtractor;
use crate::config::Config;

pub struct ExtractorChain {
    platform: Platform,
    backends: Vec<Box<dyn MediaExtractor>>,
    attempt_timeout: Duration,
    metadata_timeout: Duration,
}

impl ExtractorChain {
    pub fn new(platform: Platform, attempt_timeout: Duration, metadata_timeout: Duration) -> Self {
        Self {
            platform,
            backends: Vec::new(),
            attempt_timeout,
            metadata_timeout,
        }
    }

    /// Append a backend; returns false when it is not eligible for this platform
    pub fn add_backend(&mut self, backend: Box<dyn MediaExtractor>) -> bool {
        if self.platform.requires_watermark_free() && !backend.watermark_free() {
            info!(
                target: "chain",
                platform = %self.platform,
                backend = backend.name(),
                "backend skipped: cannot guarantee watermark-free output"
            );
            return false;
        }
        self.backends.push(backend);
        true
    }

    pub fn with_backend(mut self, backend: Box<dyn MediaExtractor>) -> Self {
        self.add_backend(backend);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    fn no_backend(&self) -> DownloadError {
        DownloadError::ToolNotFound(format!("no eligible backend for {}", self.platform))
    }
}

#[async_trait]
impl MediaExtractor for ExtractorChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn watermark_free(&self) -> bool {
        self.backends.iter().all(|b| b.watermark_free())
    }

    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        let mut last_error = self.no_backend();

        for backend in &self.backends {
            debug!(target: "chain", backend = backend.name(), "trying metadata");

            let result = match timeout(self.metadata_timeout, backend.fetch_metadata(url)).await {
                Ok(result) => result,
                Err(_) => Err(DownloadError::TimedOut(self.metadata_timeout.as_secs())),
            };

            match result {
                Ok(meta) => {
                    debug!(target: "chain", backend = backend.name(), "metadata success");
                    return Ok(meta);
                }
                Err(e) => {
                    warn!(
                        target: "chain",
                        backend = backend.name(),
                        reason = diagnose(&e).description(),
                        error = %e,
                        "metadata failed"
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn fetch_media(
        &self,
        url: &str,
        variant: Variant,
        slot: &TempSlot,
    ) -> Result<MediaDownload, DownloadError> {
        let mut last_error = self.no_backend();

        for backend in &self.backends {
            info!(target: "chain", backend = backend.name(), ?variant, "trying download");

            let result = match timeout(self.attempt_timeout, backend.fetch_media(url, variant, slot)).await {
                Ok(result) => result,
                Err(_) => Err(DownloadError::TimedOut(self.attempt_timeout.as_secs())),
            };

            let error = match result {
                Ok(download) if download.outcomes.iter().any(|o| !o.is_failed()) => {
                    info!(
                        target: "chain",
                        backend = backend.name(),
                        items = download.outcomes.len(),
                        "download success"
                    );
                    return Ok(download);
                }
                Ok(download) => match download.outcomes.into_iter().last() {
                    Some(DownloadOutcome::Failed { reason }) => DownloadError::NoOutput(reason),
                    _ => DownloadError::NoOutput(format!("{} produced no items", backend.name())),
                },
                Err(e) => e,
            };

            warn!(
                target: "chain",
                backend = backend.name(),
                reason = diagnose(&error).description(),
                error = %error,
                "download failed"
            );
            let swept = slot.sweep();
            if swept > 0 {
                debug!(target: "chain", swept, "removed partial files before next attempt");
            }
            last_error = error;
        }

        Err(last_error)
    }
}

/// Single dispatch point from platform to its chain
pub struct ExtractorRegistry {
    chains: HashMap<Platform, ExtractorChain>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }

    pub fn insert(&mut self, chain: ExtractorChain) {
        self.chains.insert(chain.platform(), chain);
    }

    pub fn with_chain(mut self, chain: ExtractorChain) -> Self {
        self.insert(chain);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<&ExtractorChain> {
        self.chains.get(&platform)
    }

    /// Production wiring
    pub fn from_config(config: &Config) -> Self {
        let network = config.network();
        let attempt = config.backend_timeout;
        let meta = config.metadata_timeout;
        let ytdlp = || {
            YtDlpBackend::new(config.ytdlp_path.clone(), network.clone(), config.max_file_size)
                .with_process_timeout(attempt.as_secs())
        };

        let youtube = ExtractorChain::new(Platform::YouTube, attempt, meta)
            .with_backend(Box::new(ytdlp()))
            .with_backend(Box::new(
                PythonYtDlp::new(config.python_path.clone(), network.clone(), config.max_file_size)
                    .with_process_timeout(attempt.as_secs()),
            ));

        let instagram = ExtractorChain::new(Platform::Instagram, attempt, meta).with_backend(Box::new(ytdlp()));

        let tiktok = ExtractorChain::new(Platform::TikTok, attempt, meta)
            .with_backend(Box::new(TikWmBackend::new(config.tikwm_api_url.clone(), network.clone())))
            .with_backend(Box::new(ytdlp()));

        let twitter = ExtractorChain::new(Platform::Twitter, attempt, meta).with_backend(Box::new(ytdlp()));

        let registry = Self::new()
            .with_chain(youtube)
            .with_chain(instagram)
            .with_chain(tiktok)
            .with_chain(twitter);

        for platform in Platform::ALL {
            if let Some(chain) = registry.get(platform) {
                info!(target: "chain", %platform, backends = ?chain.backend_names(), "extractor chain ready");
            }
        }
        registry
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
