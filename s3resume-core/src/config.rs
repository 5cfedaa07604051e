use crate::errors::{Result, UploadError};
use serde::{Deserialize, Serialize};

/// Chunks transferred concurrently per file.
pub const DEFAULT_WINDOW: usize = 5;
/// Retries after the first failed attempt of a batch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Smallest part S3 accepts, except for the last one: 5 MiB.
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
/// Largest number of parts in one multipart upload.
pub const DEFAULT_MAX_PART_COUNT: u32 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the service exposing `/api/storage/*`.
    pub storage_api_url: String,
    #[serde(default)]
    pub register_objects: bool,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_min_part_size")]
    pub min_part_size: u64,
    #[serde(default = "default_max_part_count")]
    pub max_part_count: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_min_part_size() -> u64 {
    DEFAULT_MIN_PART_SIZE
}

fn default_max_part_count() -> u32 {
    DEFAULT_MAX_PART_COUNT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Config {
    pub fn new(storage_api_url: impl Into<String>) -> Self {
        Self {
            storage_api_url: storage_api_url.into(),
            register_objects: false,
            window: DEFAULT_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
            min_part_size: DEFAULT_MIN_PART_SIZE,
            max_part_count: DEFAULT_MAX_PART_COUNT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_api_url.trim().is_empty() {
            return Err(UploadError::Config("storage_api_url is empty".to_string()));
        }
        if self.window == 0 {
            return Err(UploadError::Config("window must be at least 1".to_string()));
        }
        if self.max_part_count == 0 {
            return Err(UploadError::Config(
                "max_part_count must be at least 1".to_string(),
            ));
        }
        if self.min_part_size == 0 {
            return Err(UploadError::Config(
                "min_part_size must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}
