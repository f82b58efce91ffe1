//! Engine configuration
//!
//! Loaded from TOML; every key is optional and falls back to its default.
//!
//! ```toml
//! page_cap = 10
//! settle_delay_ms = 750
//! wait_timeout_ms = 10000
//!
//! [category_retry]
//! max_attempts = 3
//! initial_backoff_ms = 500
//! multiplier = 2
//! ```

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Provisioning engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum listing pages read per lookup
    pub page_cap: usize,
    /// Retry policy for selecting a scoping category in a fresh form
    pub category_retry: RetryPolicy,
    /// Retry policy for pressing the listing's "next" control
    pub pagination_retry: RetryPolicy,
    /// Pause letting the listing catch up with a write
    pub settle_delay_ms: u64,
    /// Limit applied to every wait and driver call
    pub wait_timeout_ms: u64,
    /// Lookups performed when re-verifying after a write
    pub verify_attempts: u32,
    /// Near matches kept for diagnostics
    pub similar_candidates: usize,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` if validation fails
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Same as [`Self::from_toml_str`], plus `ConfigError::Io`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations the engine cannot run with
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_cap == 0 {
            return Err(ConfigError::Invalid("page_cap must be at least 1".into()));
        }
        if self.category_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "category_retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.pagination_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pagination_retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.verify_attempts == 0 {
            return Err(ConfigError::Invalid("verify_attempts must be at least 1".into()));
        }
        if self.wait_timeout_ms == 0 {
            return Err(ConfigError::Invalid("wait_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// With page cap
    #[inline]
    #[must_use]
    pub fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap;
        self
    }

    /// With category retry policy
    #[inline]
    #[must_use]
    pub fn with_category_retry(mut self, policy: RetryPolicy) -> Self {
        self.category_retry = policy;
        self
    }

    /// With pagination retry policy
    #[inline]
    #[must_use]
    pub fn with_pagination_retry(mut self, policy: RetryPolicy) -> Self {
        self.pagination_retry = policy;
        self
    }

    /// With settle delay
    #[inline]
    #[must_use]
    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// With wait timeout
    #[inline]
    #[must_use]
    pub fn with_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.wait_timeout_ms = ms;
        self
    }

    /// With verification attempts
    #[inline]
    #[must_use]
    pub fn with_verify_attempts(mut self, attempts: u32) -> Self {
        self.verify_attempts = attempts;
        self
    }

    /// Settle delay as a duration
    #[inline]
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Wait timeout as a duration
    #[inline]
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_cap: 10,
            category_retry: RetryPolicy::new(3, 500, 2),
            pagination_retry: RetryPolicy::new(2, 250, 2),
            settle_delay_ms: 750,
            wait_timeout_ms: 10_000,
            verify_attempts: 2,
            similar_candidates: 3,
        }
    }
}
