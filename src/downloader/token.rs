// Request token codec
//
// A token carries (platform, action, url) through a chat button payload, so
// the selection step needs no server-side session. Wire format:
//
//   <P><A><K><CC>:<base64url(rest)>
//
// P, A and K are single characters: platform code, action code and an index
// into PREFIXES (the well-known URL prefix stripped from the URL). CC is a
// 12-bit checksum over P, A and the full URL, so truncated or edited payloads
// are rejected. The header is fixed-width; everything after the ':' is the
// encoded remainder.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use thiserror::Error;

use super::classifier::{classify_url, parse_absolute};
use super::models::{Action, Platform};

/// Longest URL ever accepted into a token
pub const MAX_URL_LEN: usize = 2000;

/// Telegram Bot API callback_data limit
pub const DEFAULT_PAYLOAD_LIMIT: usize = 64;

const HEADER_LEN: usize = 6;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Index 0 is the empty prefix. Order is part of the wire format: append only.
const PREFIXES: &[&str] = &[
    "",
    "https://www.youtube.com/watch?v=",
    "https://youtube.com/watch?v=",
    "https://m.youtube.com/watch?v=",
    "https://youtu.be/",
    "https://www.youtube.com/shorts/",
    "https://youtube.com/shorts/",
    "https://www.instagram.com/p/",
    "https://www.instagram.com/reel/",
    "https://instagram.com/p/",
    "https://instagram.com/reel/",
    "https://www.tiktok.com/@",
    "https://vm.tiktok.com/",
    "https://vt.tiktok.com/",
    "https://x.com/",
    "https://twitter.com/",
    "https://mobile.twitter.com/",
    "https://www.",
    "https://",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Malformed, truncated or tampered payload
    #[error("invalid request token")]
    Invalid,

    /// URL cannot be carried within the payload bound
    #[error("URL too long for a request token ({len} bytes, limit {max})")]
    UrlTooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub platform: Platform,
    pub action: Action,
    pub url: String,
}

impl RequestToken {
    pub fn new(platform: Platform, action: Action, url: impl Into<String>) -> Self {
        Self {
            platform,
            action,
            url: url.into(),
        }
    }
}

/// Encodes and decodes request tokens within a payload size bound
#[derive(Debug, Clone)]
pub struct TokenCodec {
    max_payload: usize,
}

impl TokenCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    pub fn encode(&self, token: &RequestToken) -> Result<String, TokenError> {
        if token.url.len() > MAX_URL_LEN {
            return Err(TokenError::UrlTooLong {
                len: token.url.len(),
                max: MAX_URL_LEN,
            });
        }

        let (index, rest) = longest_prefix(&token.url);
        let encoded_len = HEADER_LEN + base64_len(rest.len());
        if encoded_len > self.max_payload {
            return Err(TokenError::UrlTooLong {
                len: token.url.len(),
                max: self.max_payload,
            });
        }

        let p = platform_code(token.platform);
        let a = action_code(token.action);
        let [c1, c2] = checksum(p, a, &token.url);

        let mut out = String::with_capacity(encoded_len);
        out.push(p);
        out.push(a);
        out.push(index_code(index));
        out.push(c1 as char);
        out.push(c2 as char);
        out.push(':');
        out.push_str(&URL_SAFE_NO_PAD.encode(rest.as_bytes()));
        Ok(out)
    }

    /// Fails closed: any defect yields `TokenError::Invalid`
    pub fn decode(&self, payload: &str) -> Result<RequestToken, TokenError> {
        if payload.len() > self.max_payload || !payload.is_ascii() {
            return Err(TokenError::Invalid);
        }

        let bytes = payload.as_bytes();
        if bytes.len() < HEADER_LEN || bytes[HEADER_LEN - 1] != b':' {
            return Err(TokenError::Invalid);
        }

        let platform = platform_from_code(bytes[0]).ok_or(TokenError::Invalid)?;
        let action = action_from_code(bytes[1]).ok_or(TokenError::Invalid)?;
        let prefix = index_from_code(bytes[2])
            .and_then(|i| PREFIXES.get(i))
            .ok_or(TokenError::Invalid)?;

        let rest = URL_SAFE_NO_PAD
            .decode(&payload[HEADER_LEN..])
            .map_err(|_| TokenError::Invalid)?;
        let rest = String::from_utf8(rest).map_err(|_| TokenError::Invalid)?;
        let url = format!("{}{}", prefix, rest);

        if checksum(bytes[0] as char, bytes[1] as char, &url) != [bytes[3], bytes[4]] {
            return Err(TokenError::Invalid);
        }

        // Re-encoding must reproduce the payload, or the token was hand-made
        if longest_prefix(&url).0 != bytes[2].wrapping_sub(b'a') as usize {
            return Err(TokenError::Invalid);
        }

        let parsed = parse_absolute(&url).map_err(|_| TokenError::Invalid)?;
        let classified = classify_url(&parsed).map_err(|_| TokenError::Invalid)?;
        if classified != platform || !platform.supports(action) {
            return Err(TokenError::Invalid);
        }

        Ok(RequestToken { platform, action, url })
    }
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_LIMIT)
    }
}

fn base64_len(n: usize) -> usize {
    (n * 4 + 2) / 3
}

fn longest_prefix(url: &str) -> (usize, &str) {
    PREFIXES
        .iter()
        .enumerate()
        .filter(|(_, p)| url.starts_with(*p))
        .max_by_key(|(_, p)| p.len())
        .map(|(i, p)| (i, &url[p.len()..]))
        .unwrap_or((0, url))
}

fn checksum(platform: char, action: char, url: &str) -> [u8; 2] {
    let mut hash: u32 = 0x811c_9dc5;
    for b in [platform as u8, action as u8].iter().chain(url.as_bytes()) {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let folded = (hash ^ (hash >> 12) ^ (hash >> 24)) & 0xfff;
    [ALPHABET[(folded >> 6) as usize], ALPHABET[(folded & 0x3f) as usize]]
}

fn index_code(index: usize) -> char {
    (b'a' + index as u8) as char
}

fn index_from_code(code: u8) -> Option<usize> {
    code.checked_sub(b'a').map(usize::from).filter(|i| *i < PREFIXES.len())
}

fn platform_code(platform: Platform) -> char {
    match platform {
        Platform::YouTube => 'y',
        Platform::Instagram => 'i',
        Platform::TikTok => 't',
        Platform::Twitter => 'x',
    }
}

fn platform_from_code(code: u8) -> Option<Platform> {
    match code {
        b'y' => Some(Platform::YouTube),
        b'i' => Some(Platform::Instagram),
        b't' => Some(Platform::TikTok),
        b'x' => Some(Platform::Twitter),
        _ => None,
    }
}

fn action_code(action: Action) -> char {
    match action {
        Action::Analyze => 'a',
        Action::Video => 'v',
        Action::Audio => 's',
        Action::Download => 'd',
    }
}

fn action_from_code(code: u8) -> Option<Action> {
    match code {
        b'a' => Some(Action::Analyze),
        b'v' => Some(Action::Video),
        b's' => Some(Action::Audio),
        b'd' => Some(Action::Download),
        _ => None,
    }
}
