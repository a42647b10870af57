// yt-dlp backend
//
// Serves every platform except TikTok (yt-dlp cannot promise watermark-free
// TikTok output). The same implementation drives the native binary and the
// Python module; only the launcher differs.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::downloader::diagnostics::context_line;
use crate::downloader::errors::DownloadError;
use crate::downloader::files::TempSlot;
use crate::downloader::models::{DownloadOutcome, MediaDownload, MediaMetadata, NetworkConfig, Variant, UNKNOWN};
use crate::downloader::traits::MediaExtractor;
use crate::downloader::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout, stderr_tail};

/// Default ceiling for one yt-dlp process
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 600;

/// How yt-dlp is started: `program [prefix...] args...`
#[derive(Debug, Clone)]
pub struct Launcher {
    pub program: String,
    pub prefix: Vec<String>,
}

impl Launcher {
    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            program: path.into(),
            prefix: Vec::new(),
        }
    }

    pub fn python_module(python: impl Into<String>) -> Self {
        Self {
            program: python.into(),
            prefix: vec!["-m".to_string(), "yt_dlp".to_string()],
        }
    }
}

pub struct YtDlpBackend {
    name: &'static str,
    launcher: Launcher,
    network: NetworkConfig,
    max_file_size: u64,
    process_timeout_secs: u64,
}

impl YtDlpBackend {
    pub fn new(ytdlp_path: impl Into<String>, network: NetworkConfig, max_file_size: u64) -> Self {
        Self::with_launcher("yt-dlp", Launcher::binary(ytdlp_path), network, max_file_size)
    }

    pub fn with_launcher(
        name: &'static str,
        launcher: Launcher,
        network: NetworkConfig,
        max_file_size: u64,
    ) -> Self {
        Self {
            name,
            launcher,
            network,
            max_file_size,
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
        }
    }

    pub fn with_process_timeout(mut self, secs: u64) -> Self {
        self.process_timeout_secs = secs;
        self
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = self.launcher.prefix.clone();
        args.extend(["--no-warnings".to_string(), "--no-progress".to_string()]);
        args.extend(get_timeout_args(&self.network));
        args.extend(get_proxy_args(&self.network));
        args
    }

    /// Arguments for `fetch_metadata`
    pub fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["--dump-single-json".to_string(), "--no-playlist".to_string()]);
        args.push(url.to_string());
        args
    }

    /// Arguments for `fetch_media`; the info JSON printed on stdout doubles as
    /// caption metadata and the expected item count
    pub fn download_args(&self, url: &str, variant: Variant, slot: &TempSlot) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["--dump-single-json".to_string(), "--no-simulate".to_string()]);
        match variant {
            Variant::Video => {
                args.extend([
                    "--no-playlist".to_string(),
                    "-f".to_string(),
                    video_format(self.max_file_size),
                    "--merge-output-format".to_string(),
                    "mp4".to_string(),
                    "-o".to_string(),
                    slot.output_template(false),
                ]);
            }
            Variant::Audio => {
                args.extend([
                    "--no-playlist".to_string(),
                    "-f".to_string(),
                    "bestaudio/best".to_string(),
                    "-x".to_string(),
                    "--audio-format".to_string(),
                    "mp3".to_string(),
                    "-o".to_string(),
                    slot.output_template(false),
                ]);
            }
            Variant::Download => {
                args.extend([
                    "-f".to_string(),
                    "best".to_string(),
                    "--ignore-errors".to_string(),
                    "-o".to_string(),
                    slot.output_template(true),
                ]);
            }
        }
        args.push(url.to_string());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output, DownloadError> {
        debug!(target: "yt-dlp", backend = self.name, "running: {} {}", self.launcher.program, args.join(" "));
        run_output_with_timeout(&self.launcher.program, args, self.process_timeout_secs).await
    }

    fn single_item(slot: &TempSlot) -> Result<Vec<DownloadOutcome>, DownloadError> {
        match slot.finished_files().into_iter().next() {
            Some(path) => Ok(vec![slot.outcome_for(&path)]),
            None => Err(DownloadError::NoOutput("yt-dlp exited without a file".to_string())),
        }
    }

    /// One outcome per expected item; missing items become `Failed`
    fn per_item(slot: &TempSlot, expected: Option<usize>) -> Vec<DownloadOutcome> {
        match expected {
            Some(n) if n > 1 => (1..=n)
                .map(|i| match slot.find_item(i) {
                    Some(path) => slot.outcome_for(&path),
                    None => DownloadOutcome::failed(format!("item {} was not produced", i)),
                })
                .collect(),
            _ => slot
                .finished_files()
                .iter()
                .map(|path| slot.outcome_for(path))
                .collect(),
        }
    }
}

/// Prefer MP4 that fits the transport ceiling, then anything that fits, then anything
pub fn video_format(max_bytes: u64) -> String {
    let cap = format!("[filesize<{0}]", max_bytes);
    format!(
        "best[ext=mp4]{cap}/bestvideo[ext=mp4]{cap}+bestaudio[ext=m4a]/best{cap}/best",
        cap = cap
    )
}

/// Parse `--dump-single-json` output
pub fn parse_metadata(stdout: &[u8]) -> Result<MediaMetadata, DownloadError> {
    let json_str = String::from_utf8_lossy(stdout);
    let json: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

    let text = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| json[*k].as_str())
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    };

    let item_count = json["entries"]
        .as_array()
        .map(|e| e.len())
        .or_else(|| json["playlist_count"].as_u64().map(|n| n as usize))
        .filter(|n| *n > 0)
        .unwrap_or(1);

    Ok(MediaMetadata {
        title: text(&["title", "fulltitle", "description"]).unwrap_or_else(|| UNKNOWN.to_string()),
        author: text(&["uploader", "channel", "uploader_id"]).unwrap_or_else(|| UNKNOWN.to_string()),
        duration_seconds: json["duration"].as_f64().filter(|d| *d > 0.0).map(|d| d.round() as u64),
        thumbnail_url: text(&["thumbnail"]),
        item_count,
    })
}

#[async_trait]
impl MediaExtractor for YtDlpBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        let output = self.run(self.metadata_args(url)).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DownloadError::from(stderr));
        }

        parse_metadata(&output.stdout)
    }

    async fn fetch_media(
        &self,
        url: &str,
        variant: Variant,
        slot: &TempSlot,
    ) -> Result<MediaDownload, DownloadError> {
        let output = self.run(self.download_args(url, variant, slot)).await?;
        let failed = !output.status.success();
        if failed {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                target: "yt-dlp",
                backend = self.name,
                status = ?output.status.code(),
                error_line = context_line(&stderr).as_deref().unwrap_or_default(),
                "yt-dlp exited with error"
            );
            debug!(target: "yt-dlp", stderr = %stderr_tail(&output.stderr, 5), "stderr tail");
        }

        let metadata = match parse_metadata(&output.stdout) {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!(target: "yt-dlp", error = %e, "no info JSON on stdout");
                None
            }
        };

        let outcomes = match variant {
            Variant::Video | Variant::Audio => {
                if failed {
                    return Err(DownloadError::from(String::from_utf8_lossy(&output.stderr).to_string()));
                }
                Self::single_item(slot)?
            }
            Variant::Download => {
                // Item count lets per-item failures show up as outcomes
                let expected = metadata.as_ref().map(|m| m.item_count);
                let outcomes = Self::per_item(slot, expected);
                if outcomes.is_empty() {
                    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    return Err(if failed {
                        DownloadError::from(stderr)
                    } else {
                        DownloadError::NoOutput("yt-dlp exited without a file".to_string())
                    });
                }
                outcomes
            }
        };

        Ok(MediaDownload::new(outcomes).with_metadata(metadata))
    }
}
