//! # Seatbook Redis
//!
//! Redis-backed [`TtlCache`] implementation used by the reservation lock
//! manager. Lock entries live under `seat_lock:{show_id}` with a server-side
//! TTL, so abandoned reservations disappear without any cleanup job.
//!
//! # Example
//!
//! ```no_run
//! use seatbook_redis::{RedisCache, RedisConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::from_env();
//! let cache = RedisCache::connect(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;

pub use cache::RedisCache;
pub use config::RedisConfig;
