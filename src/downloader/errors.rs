// Error types for extraction backends

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// Network timeout while talking to the platform
    #[error("Network timeout: platform is not responding")]
    NetworkTimeout,

    /// Platform blocked the request (429, bot detection, etc.)
    #[error("Request blocked or rate-limited by the platform")]
    Blocked,

    /// yt-dlp or python not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// URL rejected by the backend
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// Content is private, deleted or otherwise gone
    #[error("Content unavailable: {0}")]
    Unavailable(String),

    /// Failed to parse backend JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Command or HTTP execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Backend ran but produced no file
    #[error("No media produced: {0}")]
    NoOutput(String),

    /// Backend attempt exceeded its time budget
    #[error("Timed out after {0}s")]
    TimedOut(u64),

    #[error("I/O error: {0}")]
    Io(String),

    /// Unknown error with details
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::NetworkTimeout
        } else {
            Self::ExecutionError(format!("HTTP error: {}", e))
        }
    }
}

// Classify raw tool output
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429") || lower.contains("too many requests") || lower.contains("blocked") {
            return Self::Blocked;
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("private")
            || lower.contains("unavailable")
            || lower.contains("removed")
            || lower.contains("404")
        {
            return Self::Unavailable(s);
        }

        if lower.contains("invalid json") || lower.contains("parse") {
            return Self::ParseError(s);
        }

        if lower.contains("unsupported url") || lower.contains("invalid url") {
            return Self::UnsupportedUrl(s);
        }

        Self::Unknown(s)
    }
}

impl From<&str> for DownloadError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}
