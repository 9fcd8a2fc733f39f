//! Tools and structs for a token bucket rate limiting configuration

use std::time::Duration;
use crate::error::Error;
use crate::rate_limiter::{SystemTimeSource, TimeSource, TokenBucketRateLimiter};

/// Configuration for a **Token Bucket** rate limiting policy.
///
/// This struct defines the policy parameters:
/// - `capacity` - maximum number of tokens in a bucket.
/// - `refill_interval` - time for an empty bucket to become full.
/// - `cost` - tokens charged per request by [`TokenBucketRateLimiter::hit`].
/// - `eviction` - optional duration after which the data for inactive keys is cleaned up
/// - `name` - optional name to identify the policy in logs
///
/// With the `config` feature the policy can be deserialized:
///
/// ```json
/// {
///     "name": "public-by-ip",
///     "capacity": 100,
///     "refill_interval_secs": 60,
///     "requests_per_interval": 200,
///     "eviction_secs": 300
/// }
/// ```
///
/// `cost` and `requests_per_interval` are mutually exclusive; when both
/// are missing the cost is `1`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(try_from = "config::RawTokenBucket"))]
pub struct TokenBucket {
    /// Optional name of the policy
    name: Option<String>,

    /// Maximum number of tokens in a bucket.
    capacity: f64,

    /// Time for an empty bucket to become full.
    refill_interval: Duration,

    /// Tokens charged per request.
    cost: f64,

    /// Optional eviction period
    eviction: Option<Duration>,
}

impl TokenBucket {
    /// Creates a new token bucket rate limiting policy.
    ///
    /// # Arguments
    /// - `capacity` - Maximum number of tokens in a bucket.
    /// - `refill_interval` - Time for an empty bucket to become full.
    ///
    /// The parameters are validated by [`build`](Self::build).
    #[inline]
    pub fn new(capacity: f64, refill_interval: Duration) -> Self {
        Self {
            name: None,
            eviction: None,
            cost: 1.0,
            capacity,
            refill_interval
        }
    }

    /// Sets the tokens charged per request.
    #[inline]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Sets the cost so that `requests` requests drain a full bucket,
    /// i.e. `requests` requests are allowed per refill interval.
    #[inline]
    pub fn per_requests(mut self, requests: u32) -> Self {
        self.cost = self.capacity / f64::from(requests);
        self
    }

    /// Sets an optional eviction period for cleaning up old client state.
    #[inline]
    pub fn with_eviction(mut self, eviction: Duration) -> Self {
        self.eviction = Some(eviction);
        self
    }

    /// Sets the optional name of this policy.
    #[inline]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name of this policy, if any.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Tokens charged per request.
    #[inline]
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Builds a [`TokenBucketRateLimiter`] instance based on this policy.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPolicy`] if the capacity, refill interval or cost is unusable.
    #[inline]
    pub fn build(&self) -> Result<TokenBucketRateLimiter, Error> {
        self.build_with_time_source(SystemTimeSource)
    }

    /// Builds a [`TokenBucketRateLimiter`] driven by a custom [`TimeSource`].
    pub fn build_with_time_source<T: TimeSource>(
        &self,
        time_source: T
    ) -> Result<TokenBucketRateLimiter<T>, Error> {
        self.validate_cost()?;

        let mut limiter = TokenBucketRateLimiter::with_time_source(
            self.refill_interval,
            self.capacity,
            time_source
        )?;

        limiter.set_cost(self.cost)?;

        if let Some(eviction) = self.eviction {
            limiter.set_eviction(eviction);
        }

        if let Some(name) = &self.name {
            limiter.set_name(name.clone());
        }

        Ok(limiter)
    }

    #[inline]
    fn validate_cost(&self) -> Result<(), Error> {
        if self.cost.is_finite() && self.cost >= 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidPolicy("cost must be a finite number >= 0"))
        }
    }
}

#[cfg(feature = "config")]
mod config {
    use super::TokenBucket;
    use crate::error::Error;
    use std::time::Duration;

    #[derive(serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    pub(super) struct RawTokenBucket {
        #[serde(default)]
        name: Option<String>,
        capacity: f64,
        refill_interval_secs: u64,
        #[serde(default)]
        cost: Option<f64>,
        #[serde(default)]
        requests_per_interval: Option<u32>,
        #[serde(default)]
        eviction_secs: Option<u64>,
    }

    impl TryFrom<RawTokenBucket> for TokenBucket {
        type Error = Error;

        fn try_from(raw: RawTokenBucket) -> Result<Self, Self::Error> {
            let mut policy = TokenBucket::new(raw.capacity, Duration::from_secs(raw.refill_interval_secs));

            policy = match (raw.cost, raw.requests_per_interval) {
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidPolicy("cost and requests_per_interval are mutually exclusive"));
                },
                (Some(cost), None) => policy.with_cost(cost),
                (None, Some(requests)) => policy.per_requests(requests),
                (None, None) => policy,
            };

            if let Some(secs) = raw.eviction_secs {
                policy = policy.with_eviction(Duration::from_secs(secs));
            }

            if let Some(name) = raw.name {
                policy = policy.with_name(name);
            }

            // Fail at load time rather than on first use
            policy.build()?;

            Ok(policy)
        }
    }
}
