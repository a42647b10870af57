// URL classification - maps user input to a supported platform
//
// Pure and side-effect free: the input is parsed as an absolute http(s) URL,
// then its host is tested against each platform signature in priority order.

use regex::Regex;
use thiserror::Error;
use url::Url;

use super::models::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// Not a well-formed absolute http(s) URL
    #[error("invalid URL")]
    InvalidUrl,

    /// Well-formed URL that no platform signature matches
    #[error("unsupported platform")]
    UnsupportedPlatform,
}

/// Host signature for one platform
#[derive(Debug, Clone)]
pub struct PlatformSignature {
    pub platform: Platform,
    pub host: Regex,
}

impl PlatformSignature {
    /// Matches `domain` and any of its subdomains
    pub fn for_domains(platform: Platform, domains: &[&str]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = domains.iter().map(|d| regex::escape(d)).collect();
        let pattern = format!(r"^(?:[a-z0-9-]+\.)*(?:{})$", alternatives.join("|"));
        Ok(Self {
            platform,
            host: Regex::new(&pattern)?,
        })
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_CLASSIFIER: Classifier = Classifier::default();
}

/// Query parameters that only track sharing and never identify content
const TRACKING_PARAMS: &[&str] = &["si", "igsh", "igshid", "feature", "ref", "ref_src", "s"];

pub struct Classifier {
    signatures: Vec<PlatformSignature>,
}

impl Classifier {
    pub fn new(signatures: Vec<PlatformSignature>) -> Self {
        Self { signatures }
    }

    /// Parse and classify; `InvalidUrl` is reported before any signature is tried
    pub fn classify(&self, input: &str) -> Result<Platform, ClassifyError> {
        let url = parse_absolute(input)?;
        self.classify_url(&url)
    }

    pub fn classify_url(&self, url: &Url) -> Result<Platform, ClassifyError> {
        let host = url
            .host_str()
            .ok_or(ClassifyError::InvalidUrl)?
            .trim_end_matches('.')
            .to_ascii_lowercase();

        self.signatures
            .iter()
            .find(|sig| sig.host.is_match(&host))
            .map(|sig| sig.platform)
            .ok_or(ClassifyError::UnsupportedPlatform)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        let table: [(Platform, &[&str]); 4] = [
            (Platform::YouTube, &["youtube.com", "youtu.be", "youtube-nocookie.com"]),
            (Platform::Instagram, &["instagram.com", "instagr.am"]),
            (Platform::TikTok, &["tiktok.com"]),
            (Platform::Twitter, &["twitter.com", "x.com", "fxtwitter.com", "vxtwitter.com"]),
        ];

        let signatures = table
            .iter()
            .filter_map(|(platform, domains)| PlatformSignature::for_domains(*platform, domains).ok())
            .collect();

        Self::new(signatures)
    }
}

/// Classify with the built-in signatures
pub fn classify(input: &str) -> Result<Platform, ClassifyError> {
    DEFAULT_CLASSIFIER.classify(input)
}

pub fn classify_url(url: &Url) -> Result<Platform, ClassifyError> {
    DEFAULT_CLASSIFIER.classify_url(url)
}

/// Parse user input as an absolute http(s) URL with a host
pub fn parse_absolute(input: &str) -> Result<Url, ClassifyError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(ClassifyError::InvalidUrl);
    }

    let url = Url::parse(trimmed).map_err(|_| ClassifyError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(ClassifyError::InvalidUrl),
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ClassifyError::InvalidUrl),
    }
}

/// Drop the fragment and share-tracking query parameters
pub fn canonicalize(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        canonical.set_query(None);
    } else if url.query_pairs().count() != kept.len() {
        canonical.query_pairs_mut().clear().extend_pairs(kept);
    }

    canonical.to_string()
}
