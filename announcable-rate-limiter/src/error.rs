//! Describes rate limiting errors

use std::fmt::{Display, Formatter};

/// Errors returned by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// The bucket does not hold enough tokens for the requested cost.
    ///
    /// This is routine control flow; callers usually answer with
    /// `429 Too Many Requests`.
    RateLimitExceeded,

    /// The requested cost is negative or `NaN`.
    InvalidCost(f64),

    /// The limiter was configured with an unusable capacity or refill interval.
    InvalidPolicy(&'static str),
}

impl Error {
    /// Returns `true` if this error means "try again later"
    /// rather than a caller bug.
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimitExceeded)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::RateLimitExceeded => write!(f, "Rate limit exceeded. Try again later."),
            Error::InvalidCost(cost) => write!(f, "Rate Limit Error: invalid cost: {cost}"),
            Error::InvalidPolicy(reason) => write!(f, "Rate Limit Error: invalid policy: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_displays_rate_limit_exceeded() {
        assert_eq!(Error::RateLimitExceeded.to_string(), "Rate limit exceeded. Try again later.");
    }

    #[test]
    fn it_displays_invalid_cost() {
        assert_eq!(Error::InvalidCost(-1.5).to_string(), "Rate Limit Error: invalid cost: -1.5");
    }

    #[test]
    fn it_tells_rate_limited_apart_from_caller_errors() {
        assert!(Error::RateLimitExceeded.is_rate_limited());
        assert!(!Error::InvalidCost(-1.0).is_rate_limited());
        assert!(!Error::InvalidPolicy("capacity must be > 0").is_rate_limited());
    }
}
