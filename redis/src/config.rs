//! Redis configuration loaded from environment variables.

use std::env;
use std::time::Duration;

/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl RedisConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `REDIS_URL` | `redis://localhost:6379` |
    /// | `REDIS_CONNECT_TIMEOUT` | `30` |
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: env::var("REDIS_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// The connection timeout as a [`Duration`], applied when the
    /// connection manager dials the server.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: 30,
        }
    }
}
