//! In-memory per-key attempt throttling.
//!
//! [`RateLimiter`] counts attempts per key in fixed windows and blocks a key
//! for a cooldown once it goes over the limit. Everything else in the crate
//! (clocks, key derivation, config, metrics, sweeping, replay) exists to
//! feed or observe it.

pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod metrics;
pub mod rate_limit;
pub mod replay;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RateLimiterConfig;
pub use rate_limit::{RateLimitStatus, RateLimiter};
