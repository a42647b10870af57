// Downloader module - classification, tokens, temp files and extraction backends

pub mod backends;
pub mod classifier;
pub mod diagnostics;
pub mod errors;
pub mod files;
pub mod models;
pub mod orchestrator;
pub mod token;
pub mod tools;
pub mod traits;
pub mod utils;

pub use classifier::{ClassifyError, Classifier};
pub use errors::DownloadError;
pub use files::{TempFiles, TempSlot};
pub use models::{
    Action, DownloadOutcome, MediaArtifact, MediaDownload, MediaMetadata, MimeCategory, NetworkConfig, Platform, Variant,
};
pub use orchestrator::{ExtractorChain, ExtractorRegistry};
pub use token::{RequestToken, TokenCodec, TokenError};
pub use traits::MediaExtractor;
