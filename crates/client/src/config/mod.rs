use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::session::VerifyMode;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const API_URL_ENV: &str = "FINSIGHT_API_URL";

/// Client settings. Every field has a default so partial config files load.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub stale_after_secs: u64,
    pub retry: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub verify_mode: VerifyMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            stale_after_secs: 30,
            retry: 1,
            retry_delay_ms: 1000,
            request_timeout_secs: 30,
            verify_mode: VerifyMode::Optimistic,
        }
    }
}

impl ClientConfig {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            stale_after: Duration::from_secs(self.stale_after_secs),
            retry: self.retry,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Applies `FINSIGHT_API_URL` when set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV)
            && !url.trim().is_empty()
        {
            self.api_url = url.trim().to_string();
        }
    }
}
