// TikWM backend - watermark-free TikTok via the public tikwm.com API
//
// `GET <api>?url=<post>&hd=1` answers `{code, msg, data}`; `code == 0` means
// success. `data.play` is the clean video, `data.images` a photo slideshow.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::header::{REFERER, USER_AGENT};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::downloader::errors::DownloadError;
use crate::downloader::files::TempSlot;
use crate::downloader::models::{DownloadOutcome, MediaDownload, MediaMetadata, NetworkConfig, Variant, UNKNOWN};
use crate::downloader::traits::MediaExtractor;
use crate::downloader::utils::http_client;

/// Budget for the info call
pub const INFO_TIMEOUT_SECS: u64 = 15;
/// Budget for one media transfer
pub const MEDIA_TIMEOUT_SECS: u64 = 300;

const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Deserialize)]
pub struct TikWmResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<TikWmData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TikWmData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<TikWmAuthor>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub play: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TikWmAuthor {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub unique_id: Option<String>,
}

impl TikWmData {
    pub fn metadata(&self) -> MediaMetadata {
        let non_empty = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let author = self
            .author
            .as_ref()
            .and_then(|a| non_empty(&a.nickname).or_else(|| non_empty(&a.unique_id)));

        MediaMetadata {
            title: non_empty(&self.title).unwrap_or_else(|| UNKNOWN.to_string()),
            author: author.unwrap_or_else(|| UNKNOWN.to_string()),
            duration_seconds: self.duration.filter(|d| *d > 0),
            thumbnail_url: non_empty(&self.cover),
            item_count: self.images.as_ref().map(|i| i.len()).filter(|n| *n > 0).unwrap_or(1),
        }
    }
}

/// Decode an API body; anything but `code == 0` with data is an error
pub fn parse_response(body: &str) -> Result<TikWmData, DownloadError> {
    let response: TikWmResponse = serde_json::from_str(body)
        .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

    if response.code != 0 {
        let msg = response.msg.unwrap_or_else(|| format!("code {}", response.code));
        return Err(DownloadError::from(format!("tikwm: {}", msg)));
    }

    response
        .data
        .ok_or_else(|| DownloadError::ParseError("tikwm: response without data".to_string()))
}

/// Outcome for a transfer whose declared length is already over the ceiling
fn declared_too_large(path: &Path, declared: Option<u64>, max_bytes: u64) -> Option<DownloadOutcome> {
    declared.filter(|len| *len > max_bytes).map(|size_bytes| DownloadOutcome::TooLarge {
        path: path.to_path_buf(),
        size_bytes,
    })
}

/// File writer that refuses to grow past the transport ceiling
struct CappedFile {
    file: tokio::fs::File,
    path: PathBuf,
    written: u64,
    max_bytes: u64,
}

impl CappedFile {
    async fn create(path: &Path, max_bytes: u64) -> std::io::Result<Self> {
        Ok(Self {
            file: tokio::fs::File::create(path).await?,
            path: path.to_path_buf(),
            written: 0,
            max_bytes,
        })
    }

    /// Append a chunk; `false` once the ceiling is exceeded, nothing written then
    async fn push(&mut self, chunk: &[u8]) -> std::io::Result<bool> {
        self.written += chunk.len() as u64;
        if self.written > self.max_bytes {
            return Ok(false);
        }
        self.file.write_all(chunk).await?;
        Ok(true)
    }

    fn too_large(&self) -> DownloadOutcome {
        DownloadOutcome::TooLarge {
            path: self.path.clone(),
            size_bytes: self.written,
        }
    }

    async fn finish(mut self) -> std::io::Result<()> {
        self.file.flush().await
    }
}

pub struct TikWmBackend {
    api_url: String,
    network: NetworkConfig,
}

impl TikWmBackend {
    pub fn new(api_url: impl Into<String>, network: NetworkConfig) -> Self {
        Self {
            api_url: api_url.into(),
            network,
        }
    }

    async fn info(&self, url: &str) -> Result<TikWmData, DownloadError> {
        let client = http_client(&self.network, INFO_TIMEOUT_SECS)?;
        let body = client
            .get(&self.api_url)
            .query(&[("url", url), ("hd", "1")])
            .header(USER_AGENT, BROWSER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_response(&body)
    }

    /// Media links may be relative to the API host
    fn absolute(&self, link: &str) -> Result<Url, DownloadError> {
        Url::parse(link).or_else(|_| {
            Url::parse(&self.api_url)
                .and_then(|base| base.join(link))
                .map_err(|e| DownloadError::ParseError(format!("tikwm: bad media link {}: {}", link, e)))
        })
    }

    /// Stream one remote file into `path`, stopping at the size ceiling
    async fn transfer(
        &self,
        client: &reqwest::Client,
        link: &str,
        path: &Path,
        slot: &TempSlot,
    ) -> Result<DownloadOutcome, DownloadError> {
        let url = self.absolute(link)?;
        let mut response = client
            .get(url)
            .header(USER_AGENT, BROWSER_AGENT)
            .header(REFERER, "https://www.tiktok.com/")
            .send()
            .await?
            .error_for_status()?;

        if let Some(outcome) = declared_too_large(path, response.content_length(), slot.max_bytes()) {
            info!(target: "tikwm", declared = ?response.content_length(), "skipping oversized media");
            return Ok(outcome);
        }

        let mut file = CappedFile::create(path, slot.max_bytes()).await?;
        while let Some(chunk) = response.chunk().await? {
            if !file.push(&chunk).await? {
                info!(target: "tikwm", written = file.written, "media over size limit, transfer stopped");
                return Ok(file.too_large());
            }
        }
        file.finish().await?;

        Ok(slot.outcome_for(path))
    }
}

#[async_trait]
impl MediaExtractor for TikWmBackend {
    fn name(&self) -> &'static str {
        "tikwm"
    }

    fn watermark_free(&self) -> bool {
        true
    }

    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        Ok(self.info(url).await?.metadata())
    }

    async fn fetch_media(
        &self,
        url: &str,
        variant: Variant,
        slot: &TempSlot,
    ) -> Result<MediaDownload, DownloadError> {
        if variant != Variant::Download {
            return Err(DownloadError::UnsupportedUrl(format!("tikwm cannot produce {:?}", variant)));
        }

        let data = self.info(url).await?;
        let metadata = Some(data.metadata());
        let client = http_client(&self.network, MEDIA_TIMEOUT_SECS)?;

        // Photo slideshow: every image is its own item
        if let Some(images) = data.images.as_ref().filter(|i| !i.is_empty()) {
            info!(target: "tikwm", count = images.len(), "downloading slideshow");
            let mut outcomes = Vec::with_capacity(images.len());
            for (i, link) in images.iter().enumerate() {
                let path = slot.item_path(i + 1, "jpg");
                let outcome = match self.transfer(&client, link, &path, slot).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(target: "tikwm", item = i + 1, error = %e, "image failed");
                        slot.dispose(&path);
                        DownloadOutcome::failed(e.to_string())
                    }
                };
                outcomes.push(outcome);
            }
            return Ok(MediaDownload::new(outcomes).with_metadata(metadata));
        }

        let play = data
            .play
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DownloadError::NoOutput("tikwm: no video link in response".to_string()))?;

        debug!(target: "tikwm", "downloading video");
        let path = slot.path_with_ext("mp4");
        let outcome = self.transfer(&client, play, &path, slot).await?;
        Ok(MediaDownload::new(vec![outcome]).with_metadata(metadata))
    }
}
