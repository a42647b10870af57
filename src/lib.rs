pub mod bot;
pub mod config;
pub mod downloader;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bot::notifier::NotifyError;
use bot::orchestrator::RequestOrchestrator;
use bot::telegram::{run_polling, TelegramClient};
use config::{Config, ConfigError};
use downloader::orchestrator::ExtractorRegistry;
use downloader::tools::ToolManager;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("transport setup failed: {0}")]
    Transport(#[from] NotifyError),

    #[error("temp directory unusable: {0}")]
    Io(#[from] std::io::Error),
}

/// `RUST_LOG` wins; otherwise info, with the HTTP stack held to warnings
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn,teloxide=warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

pub async fn run() -> Result<(), StartupError> {
    init_tracing();

    let config = Config::from_env()?;
    let token = config.require_bot_token()?.to_string();

    if !ToolManager::new().report(&config.python_path) {
        warn!(target: "startup", "yt-dlp not found; only TikTok downloads will work");
    }

    std::fs::create_dir_all(&config.temp_dir)?;

    let registry = ExtractorRegistry::from_config(&config);
    let client = Arc::new(TelegramClient::new(&config.telegram_api_url, &token, &config.network())?);
    let orchestrator = Arc::new(RequestOrchestrator::from_config(&config, registry, client.clone()));

    let purged = orchestrator.files().purge_stale();
    info!(
        target: "startup",
        temp_dir = %config.temp_dir.display(),
        purged,
        max_file_size = config.max_file_size,
        "linkfetch started"
    );

    run_polling(client, orchestrator).await;
    Ok(())
}
