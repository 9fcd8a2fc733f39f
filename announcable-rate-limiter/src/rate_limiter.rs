//! Generic rate limiter abstractions and shared utilities.
//!
//! This module defines the core trait and building blocks used by
//! the token bucket limiter provided by this crate.
//!
//! The primary abstraction is [`RateLimiter`], which represents a
//! stateful, thread-safe rate limiting policy operating on a string key.
//!
//! ## Design principles
//!
//! - **One instance per policy** - "5 login attempts per minute" and
//!   "2 password reset requests per minute" are two limiters with two
//!   independent stores, even when they are fed the same keys.
//! - **Opaque keys** - a key is any string (email, user ID, IP address,
//!   organisation name). Keys are compared by value and never collide.
//! - **Time abstraction** - all time-dependent logic is driven by a
//!   pluggable [`TimeSource`] to allow deterministic testing.
//!
//! ## Thread safety
//!
//! All limiters provided by this crate are `Send + Sync` and are meant to
//! be shared between threads and async tasks, usually behind an `Arc`.
//!
//! ## Scope
//!
//! This module does **not** define how keys are derived from requests or
//! how a rejection is turned into an HTTP response.
//! Those concerns are left to the caller.

use std::time::Instant;
use crate::error::Error;

pub use token_bucket::TokenBucketRateLimiter;

mod bucket;
mod store;
mod token_bucket;

pub(crate) const MICROS_PER_SEC: u64 = 1_000_000;

/// A generic rate limiter interface.
///
/// A rate limiter tracks a budget per **key** and decides whether an
/// action may proceed.
///
/// Implementations must:
///
/// - Be thread-safe
/// - Never hand out more budget than configured, even when the first
///   requests for a key race each other
/// - Execute `deduct` quickly, as it sits in front of every guarded action
pub trait RateLimiter {
    /// Tries to take `cost` units of budget from `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the action is allowed and the budget was charged
    /// - `Err(Error::RateLimitExceeded)` if the remaining budget is too small
    /// - `Err(Error::InvalidCost)` if `cost` is negative or `NaN`
    fn deduct(&self, key: &str, cost: f64) -> Result<(), Error>;
}

/// Outcome of a successful deduction.
///
/// Carries the values an HTTP layer typically reports back to the client
/// in `X-RateLimit-Limit` / `X-RateLimit-Remaining` headers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitOutcome {
    /// Tokens left in the bucket after the deduction.
    pub remaining: f64,

    /// Bucket capacity.
    pub limit: f64,
}

/// A source of time used by rate-limiting algorithms.
///
/// This abstraction allows rate limiters to be decoupled from
/// the system clock, enabling deterministic and fast unit tests.
///
/// Time is expressed in **microseconds** and must be **monotonic**
/// (non-decreasing).
pub trait TimeSource: Send + Sync {
    /// Returns a monotonic timestamp in microseconds.
    fn now_micros(&self) -> u64;
}

/// Monotonic system time source backed by `Instant`.
///
/// Uses an internal start anchor and returns elapsed microseconds since that anchor.
/// This avoids wall-clock jumps (NTP, manual adjustments, etc.).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    #[inline]
    fn anchor() -> Instant {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        *START.get_or_init(Instant::now)
    }
}

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now_micros(&self) -> u64 {
        Self::anchor()
            .elapsed()
            .as_micros()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    #[inline]
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }
}
