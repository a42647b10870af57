// Runtime configuration from the environment (and an optional .env file)

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::downloader::models::NetworkConfig;
use crate::downloader::token::DEFAULT_PAYLOAD_LIMIT;
use crate::downloader::tools::resolve_ytdlp;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TIKWM_API_URL: &str = "https://www.tikwm.com/api/";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_PYTHON: &str = "python3";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Bot API token; only the binary needs it
    pub bot_token: Option<String>,
    pub telegram_api_url: String,
    /// Transport ceiling in bytes
    pub max_file_size: u64,
    pub backend_timeout: Duration,
    pub metadata_timeout: Duration,
    pub temp_dir: PathBuf,
    pub ytdlp_path: String,
    pub python_path: String,
    pub tikwm_api_url: String,
    /// Upper bound for a serialised request token
    pub payload_limit: usize,
    pub proxy: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_file_size = nonzero_or(&get, "MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let backend_timeout = nonzero_or(&get, "BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT_SECS)?;
        let metadata_timeout = nonzero_or(&get, "METADATA_TIMEOUT_SECS", DEFAULT_METADATA_TIMEOUT_SECS)?;
        let payload_limit = parse_or(&get, "CALLBACK_PAYLOAD_LIMIT", DEFAULT_PAYLOAD_LIMIT)?;

        Ok(Self {
            bot_token: get("BOT_TOKEN"),
            telegram_api_url: get("TELEGRAM_API_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_file_size,
            backend_timeout: Duration::from_secs(backend_timeout),
            metadata_timeout: Duration::from_secs(metadata_timeout),
            temp_dir: get("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("linkfetch")),
            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(resolve_ytdlp),
            python_path: get("YTDLP_PYTHON").unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
            tikwm_api_url: get("TIKWM_API_URL").unwrap_or_else(|| DEFAULT_TIKWM_API_URL.to_string()),
            payload_limit,
            proxy: get("PROXY"),
        })
    }

    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            proxy: self.proxy.clone(),
            ..NetworkConfig::default()
        }
    }

    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token.as_deref().ok_or(ConfigError::Missing("BOT_TOKEN"))
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Sizes and timeouts where zero would disable the bot
fn nonzero_or<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: get(key).unwrap_or_default(),
        }),
        value => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("YTDLP_PATH", "/usr/bin/yt-dlp")])).unwrap();
        assert_eq!(config.max_file_size, 52_428_800);
        assert_eq!(config.backend_timeout, Duration::from_secs(300));
        assert_eq!(config.metadata_timeout, Duration::from_secs(30));
        assert_eq!(config.payload_limit, 64);
        assert_eq!(config.python_path, "python3");
        assert_eq!(config.tikwm_api_url, DEFAULT_TIKWM_API_URL);
        assert!(config.temp_dir.ends_with("linkfetch"));
        assert_eq!(config.require_bot_token(), Err(ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("MAX_FILE_SIZE", "1048576"),
            ("PROXY", "socks5://127.0.0.1:1080"),
            ("TELEGRAM_API_URL", "http://localhost:8081/"),
            ("YTDLP_PATH", "yt-dlp"),
        ]))
        .unwrap();
        assert_eq!(config.require_bot_token(), Ok("123:abc"));
        assert_eq!(config.max_file_size, 1_048_576);
        assert_eq!(config.telegram_api_url, "http://localhost:8081");
        assert_eq!(config.network().proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let err = Config::from_lookup(lookup(&[("MAX_FILE_SIZE", "fifty"), ("YTDLP_PATH", "yt-dlp")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "MAX_FILE_SIZE",
                value: "fifty".to_string()
            }
        );
        assert!(Config::from_lookup(lookup(&[("BACKEND_TIMEOUT_SECS", "0"), ("YTDLP_PATH", "x")])).is_err());
    }

    #[test]
    fn test_zero_values_name_their_own_key() {
        for key in ["MAX_FILE_SIZE", "BACKEND_TIMEOUT_SECS", "METADATA_TIMEOUT_SECS"] {
            let err = Config::from_lookup(lookup(&[(key, "0"), ("YTDLP_PATH", "x")])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::Invalid {
                    key,
                    value: "0".to_string()
                }
            );
        }
    }
}
