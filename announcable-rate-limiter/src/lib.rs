//! Announcable Rate Limiter
//!
//! A per-key token bucket rate limiter for throttling repeated actions
//! (login attempts, invites, password resets, API calls) by an arbitrary
//! string key.
//!
//! ## Features
//! * One limiter instance per policy, no global state
//! * Exactly one bucket per key, even under concurrent first access
//! * Fractional costs and lazy, lossless eviction of idle keys
//! * Deterministic testing through a pluggable [`TimeSource`]
//! * `tracing` feature: logs rejections and evictions
//! * `config` feature: deserializable [`TokenBucket`] policies
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use announcable_rate_limiter::{presets, Error, RateLimiter};
//!
//! let login = Arc::new(presets::login().build().unwrap());
//!
//! match login.deduct("user@example.com", 1.0) {
//!     Ok(()) => { /* check the password */ },
//!     Err(Error::RateLimitExceeded) => { /* 429 Too Many Requests */ },
//!     Err(err) => panic!("{err}"),
//! }
//! ```

mod error;
mod policy;
mod rate_limiter;

pub mod presets;

pub use error::Error;
pub use policy::TokenBucket;
pub use rate_limiter::{
    RateLimiter,
    RateLimitOutcome,
    SystemTimeSource,
    TimeSource,
    TokenBucketRateLimiter
};
