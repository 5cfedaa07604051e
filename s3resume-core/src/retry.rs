use crate::config::DEFAULT_MAX_RETRIES;
use crate::errors::{Result, UploadError};
use std::future::Future;

/// Re-runs a failed batch a bounded number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Calls `attempt(n)` for n = 0, 1, ... until it succeeds or
    /// `max_retries` retries have failed.
    ///
    /// Every call must start from scratch (fresh presigned URLs included).
    /// Exhaustion yields [`UploadError::RetryExhausted`] carrying the last error.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut n = 0;
        loop {
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(e) if n < self.max_retries => {
                    log::warn!(
                        "Attempt {}/{} failed, retrying: {}",
                        n + 1,
                        self.max_attempts(),
                        e
                    );
                    n += 1;
                }
                Err(e) => {
                    return Err(UploadError::RetryExhausted {
                        attempts: n + 1,
                        last_error: e.to_string(),
                    })
                }
            }
        }
    }
}
