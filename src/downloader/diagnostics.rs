// Failure diagnostics - classifies backend output into a failure reason
//
// Raw stderr stays in operator logs. Users only ever see the fixed hint text
// attached to a reason.

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;

/// Why a backend could not produce media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// HTTP 403 Forbidden - general access denied
    Forbidden,

    /// Age-gated content requiring login
    AgeRestricted,

    /// Private post or account
    PrivateContent,

    /// Content requires a logged-in session (Instagram, X)
    LoginRequired,

    /// Deleted or otherwise unavailable
    Unavailable,

    /// Geographic restriction
    GeoBlocked,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection triggered
    BotDetection,

    /// DRM-protected content; permanent
    DrmProtected,

    /// Network timeout or unreachable host
    NetworkTimeout,

    /// Backend binary or module missing
    ToolMissing,

    /// Generic/unknown failure
    Unknown,
}

impl FailureReason {
    /// Operator-facing description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateContent => "Private content",
            Self::LoginRequired => "Login required",
            Self::Unavailable => "Content unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited by platform",
            Self::BotDetection => "Bot detection triggered",
            Self::DrmProtected => "DRM-protected content",
            Self::NetworkTimeout => "Network timeout",
            Self::ToolMissing => "Backend tool missing",
            Self::Unknown => "Unknown failure",
        }
    }

    /// Short user-facing hint; never contains backend output
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::AgeRestricted => Some("This content is age-restricted."),
            Self::PrivateContent => Some("This content is private."),
            Self::LoginRequired => Some("This content is only visible to logged-in users."),
            Self::Unavailable => Some("This content has been removed or is unavailable."),
            Self::GeoBlocked => Some("This content is not available in the bot's region."),
            Self::RateLimited | Self::BotDetection => Some("The platform is limiting requests. Please try again later."),
            Self::DrmProtected => Some("This content is DRM-protected and cannot be downloaded."),
            Self::NetworkTimeout => Some("The platform took too long to respond."),
            Self::Forbidden | Self::ToolMissing | Self::Unknown => None,
        }
    }
}

/// Analyze error text and return the failure reason
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    let lower = error.to_lowercase();

    // Most specific first
    if lower.contains("drm") || lower.contains("widevine") || lower.contains("requires purchase") {
        return Some(FailureReason::DrmProtected);
    }

    if lower.contains("age-restricted")
        || lower.contains("sign in to confirm your age")
        || lower.contains("age_verification")
    {
        return Some(FailureReason::AgeRestricted);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("content is private")
        || lower.contains("private account")
        || lower.contains("this account is private")
    {
        return Some(FailureReason::PrivateContent);
    }

    if lower.contains("login required")
        || lower.contains("log in to")
        || lower.contains("requested content is not available, rate-limit reached or login required")
        || lower.contains("use --cookies")
    {
        return Some(FailureReason::LoginRequired);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("is unavailable")
        || lower.contains("404")
        || lower.contains("not found")
    {
        return Some(FailureReason::Unavailable);
    }

    if lower.contains("not available in your country") || lower.contains("blocked in your country") {
        return Some(FailureReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("not a bot") || lower.contains("captcha") || lower.contains("unusual traffic") {
        return Some(FailureReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return Some(FailureReason::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(FailureReason::Unknown);
    }

    None
}

/// Diagnose a typed backend error
pub fn diagnose(error: &DownloadError) -> FailureReason {
    match error {
        DownloadError::NetworkTimeout | DownloadError::TimedOut(_) => FailureReason::NetworkTimeout,
        DownloadError::Blocked => FailureReason::RateLimited,
        DownloadError::ToolNotFound(_) => FailureReason::ToolMissing,
        DownloadError::Unavailable(msg) => diagnose_error(msg)
            .filter(|r| *r != FailureReason::Unknown)
            .unwrap_or(FailureReason::Unavailable),
        other => diagnose_error(&other.to_string()).unwrap_or(FailureReason::Unknown),
    }
}

/// First line worth showing an operator, usually the `ERROR:` line
pub fn context_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .find(|line| line.trim_start().to_lowercase().starts_with("error:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .map(|s| s.trim().to_string())
}
