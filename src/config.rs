//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};

/// Configuration for a [`RateLimiter`](crate::ratelimit::RateLimiter).
///
/// All settings are fixed once the limiter is constructed; there is no
/// per-route or per-credential variation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Length of one counting window, in minutes.
    #[serde(default = "default_timeframe_minutes")]
    pub timeframe_minutes: u64,

    /// Take the client address from the forwarded-address header instead
    /// of the transport connection. Enable only when the process sits
    /// behind a trusted reverse proxy.
    #[serde(default)]
    pub use_reverse_proxy: bool,

    /// Identifier recorded for requests whose client address cannot be
    /// determined.
    #[serde(default = "default_placeholder_addr")]
    pub placeholder_addr: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            timeframe_minutes: default_timeframe_minutes(),
            use_reverse_proxy: false,
            placeholder_addr: default_placeholder_addr(),
        }
    }
}

fn default_timeframe_minutes() -> u64 {
    1
}

fn default_placeholder_addr() -> String {
    "0.0.0.0".to_string()
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: LimiterConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration values are usable.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.timeframe_minutes == 0 {
            return Err(crate::error::TurnstileError::Config(
                "timeframe_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
