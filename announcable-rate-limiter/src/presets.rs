//! Rate limiting policies used across Announcable.
//!
//! Each function returns a fresh [`TokenBucket`] policy. Build one limiter per
//! policy and share it (e.g. behind an `Arc`) between the handlers it guards.
//!
//! ```
//! use announcable_rate_limiter::presets;
//!
//! let login = presets::login().build().unwrap();
//! assert!(login.hit("user@example.com").is_ok());
//! ```

use std::time::Duration;
use crate::policy::TokenBucket;

const MINUTE: Duration = Duration::from_secs(60);

/// Login attempts, keyed by email: 5 per minute.
#[inline]
pub fn login() -> TokenBucket {
    TokenBucket::new(5.0, MINUTE).with_name("login")
}

/// Sign-ups, keyed by email and by organisation name: 5 per minute.
#[inline]
pub fn register() -> TokenBucket {
    TokenBucket::new(5.0, MINUTE).with_name("register")
}

/// Invite creation, keyed by the inviting user: 10 per minute.
#[inline]
pub fn invite() -> TokenBucket {
    TokenBucket::new(10.0, MINUTE).with_name("invite")
}

/// "Forgot password" requests, keyed by email: 2 per minute.
#[inline]
pub fn password_forgot() -> TokenBucket {
    TokenBucket::new(2.0, MINUTE).with_name("password_forgot")
}

/// Password resets triggered by an admin, keyed by the admin user: 5 per minute.
#[inline]
pub fn password_reset_trigger() -> TokenBucket {
    TokenBucket::new(5.0, MINUTE).with_name("password_reset_trigger")
}

/// Authenticated API calls, keyed by user: a bucket of 10 refilled every
/// 20 seconds, 2 tokens per call.
#[inline]
pub fn api() -> TokenBucket {
    TokenBucket::new(10.0, Duration::from_secs(20))
        .with_cost(2.0)
        .with_name("api")
}

/// Public widget and release page endpoints, keyed by client IP or organisation.
///
/// A bucket holds `max_tokens` and is refilled every `refill_interval_secs`;
/// each request costs `max_tokens / requests_per_interval`.
#[inline]
pub fn public(max_tokens: u32, requests_per_interval: u32, refill_interval_secs: u64) -> TokenBucket {
    TokenBucket::new(f64::from(max_tokens), Duration::from_secs(refill_interval_secs))
        .per_requests(requests_per_interval)
        .with_name("public")
}
