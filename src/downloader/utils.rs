// Helper functions for backend implementations

use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use super::errors::DownloadError;
use super::models::{MimeCategory, NetworkConfig};

/// Run command with timeout (shared utility)
///
/// The child is killed when the timeout fires or when the returned future is
/// dropped by an outer timeout.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DownloadError::ToolNotFound(program.to_string()),
            _ => DownloadError::ExecutionError(format!("Failed to start {}: {}", program, e)),
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::ExecutionError(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::ExecutionError(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res?;
            let stdout = join_pipe(stdout_task).await?;
            let stderr = join_pipe(stderr_task).await?;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::TimedOut(timeout_secs))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::ExecutionError(format!("pipe reader failed: {}", e)))?
        .map_err(DownloadError::from)
}

/// Last non-empty stderr lines, for logs only
pub fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    kept[kept.len().saturating_sub(lines)..].join("\n")
}

/// Build proxy arguments for yt-dlp
pub fn get_proxy_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// Build timeout arguments for yt-dlp
pub fn get_timeout_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(timeout) = config.timeout {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }

    args
}

/// HTTP client honouring the proxy and timeout settings
pub fn http_client(config: &NetworkConfig, timeout_secs: u64) -> Result<reqwest::Client, DownloadError> {
    let mut builder = reqwest::Client::builder()
        .timeout(TokioDuration::from_secs(timeout_secs))
        .connect_timeout(TokioDuration::from_secs(u64::from(config.timeout.unwrap_or(30))));

    if let Some(proxy_url) = config.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| DownloadError::ExecutionError(format!("Invalid proxy URL {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| DownloadError::ExecutionError(format!("Failed to build HTTP client: {}", e)))
}

/// `m:ss`, or `h:mm:ss` past an hour
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Infer the category of a produced file from its extension
pub fn mime_category(path: &Path) -> Option<MimeCategory> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "mkv" | "webm" | "mov" | "m4v" | "avi" | "flv" | "3gp" => Some(MimeCategory::Video),
        "mp3" | "m4a" | "aac" | "opus" | "ogg" | "oga" | "wav" | "flac" => Some(MimeCategory::Audio),
        "jpg" | "jpeg" | "png" | "webp" | "gif" | "heic" => Some(MimeCategory::Image),
        _ => None,
    }
}

/// Infer the category from the first bytes of a file (magic numbers)
pub fn sniff_category(head: &[u8]) -> Option<MimeCategory> {
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        // ISO base media: M4A is audio, everything else video
        return if &head[8..11] == b"M4A" {
            Some(MimeCategory::Audio)
        } else {
            Some(MimeCategory::Video)
        };
    }
    if head.starts_with(&[0x1a, 0x45, 0xdf, 0xa3]) {
        return Some(MimeCategory::Video);
    }
    if head.starts_with(b"ID3") || head.starts_with(&[0xff, 0xfb]) || head.starts_with(b"OggS") {
        return Some(MimeCategory::Audio);
    }
    if head.starts_with(&[0xff, 0xd8, 0xff])
        || head.starts_with(b"\x89PNG")
        || head.starts_with(b"GIF8")
        || (head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP")
    {
        return Some(MimeCategory::Image);
    }
    None
}
