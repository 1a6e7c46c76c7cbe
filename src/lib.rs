pub mod clipboard;
pub mod config;
pub mod control;
pub mod history;
pub mod service;
pub mod storage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipdeckError {
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("File operation error: {0}")]
    FileOperation(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, ClipdeckError>;

pub const DEFAULT_PORT: u16 = 3831;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const APP_DIR_NAME: &str = "clipdeck";
pub const DEFAULT_MAX_HISTORY: usize = 100;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024; // 5MiB
pub const PREVIEW_CHARS: usize = 100;
