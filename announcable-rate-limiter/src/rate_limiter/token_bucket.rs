//! Tools and data structures for a per-key token bucket rate limiter.

use super::{
    RateLimiter, RateLimitOutcome, SystemTimeSource, TimeSource, MICROS_PER_SEC,
    bucket::{Consumed, Refill},
    store::BucketStore,
};
use crate::error::Error;
use std::time::Duration;

/// A per-key token bucket rate limiter.
///
/// Every key owns a bucket holding up to `capacity` tokens. A bucket that
/// was drained refills linearly and is full again after `refill_interval`.
/// Each action deducts a caller-chosen `cost` from its key's bucket.
///
/// ## Characteristics
///
/// - **Allows bursts** up to `capacity`.
/// - **Fractional costs** - a public endpoint may charge `capacity / n`
///   per request to allow `n` requests per interval.
/// - **Per-bucket locking** - keys never contend with each other outside
///   of the shard lock taken while resolving a bucket.
/// - **Lazy eviction** of idle keys, no background jobs required.
///
/// ## Algorithm
///
/// For each `key`:
///
/// 1. `tokens = min(tokens + elapsed / refill_interval * capacity, capacity)`.
/// 2. The refill timestamp moves to `now`, whether or not the deduction succeeds.
/// 3. If `tokens >= cost`, deduct `cost` and allow the action.
/// 4. Otherwise, deny it and leave the refilled balance in place.
///
/// Steps 1 to 4 run under the bucket's mutex.
///
/// ## Eviction
///
/// A bucket not touched for longer than the eviction grace period is
/// dropped during a later call. The grace defaults to `refill_interval`:
/// by then the bucket is full again, so dropping it loses nothing.
/// A shorter grace via [`set_eviction`](Self::set_eviction) trades accuracy
/// for memory; an evicted key simply starts with a full bucket.
///
/// # Example
/// ```
/// use announcable_rate_limiter::{RateLimiter, TokenBucketRateLimiter};
///
/// // 5 login attempts per minute per email address
/// let login = TokenBucketRateLimiter::from_secs(60, 5.0).unwrap();
///
/// for _ in 0..5 {
///     assert!(login.deduct("user@example.com", 1.0).is_ok());
/// }
/// assert!(login.deduct("user@example.com", 1.0).is_err());
/// assert!(login.deduct("other@example.com", 1.0).is_ok());
/// ```
#[derive(Debug)]
pub struct TokenBucketRateLimiter<T: TimeSource = SystemTimeSource> {
    /// Per-key rate limiting state.
    store: BucketStore,

    /// Capacity and refill cadence shared by all buckets.
    refill: Refill,

    /// Time for an empty bucket to become full.
    refill_interval: Duration,

    /// Cost charged by [`hit`](Self::hit).
    cost: f64,

    /// Time after which inactive entries are eligible for eviction.
    eviction_grace_us: u64,

    /// Optional policy name, used in log output.
    name: Option<String>,

    /// Time source used to determine the current time.
    time_source: T,
}

impl<T: TimeSource> RateLimiter for TokenBucketRateLimiter<T> {
    #[inline]
    fn deduct(&self, key: &str, cost: f64) -> Result<(), Error> {
        self.check(key, cost).map(|_| ())
    }
}

impl TokenBucketRateLimiter {
    /// Creates a new token bucket rate limiter using the system clock.
    ///
    /// # Parameters
    ///
    /// - `refill_interval`: time for an empty bucket to become full.
    /// - `capacity`: maximum number of tokens in a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicy`] if `capacity` is not a finite
    /// positive number or `refill_interval` is shorter than a microsecond.
    #[inline]
    pub fn new(refill_interval: Duration, capacity: f64) -> Result<Self, Error> {
        Self::with_time_source(refill_interval, capacity, SystemTimeSource)
    }

    /// Creates a new token bucket rate limiter with a refill interval in whole seconds.
    #[inline]
    pub fn from_secs(refill_interval_secs: u64, capacity: f64) -> Result<Self, Error> {
        Self::new(Duration::from_secs(refill_interval_secs), capacity)
    }
}

impl<T: TimeSource> TokenBucketRateLimiter<T> {
    /// Creates a [`TokenBucketRateLimiter`] with a custom [`TimeSource`].
    ///
    /// This is primarily useful for testing and deterministic scenarios.
    pub fn with_time_source(
        refill_interval: Duration,
        capacity: f64,
        time_source: T
    ) -> Result<Self, Error> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(Error::InvalidPolicy("capacity must be a finite number > 0"));
        }

        let interval_us = u64::try_from(refill_interval.as_micros())
            .map_err(|_| Error::InvalidPolicy("refill interval is too large"))?;
        if interval_us == 0 {
            return Err(Error::InvalidPolicy("refill interval must be at least 1 microsecond"));
        }

        let now = time_source.now_micros();
        Ok(Self {
            store: BucketStore::new(now),
            refill: Refill::new(capacity, interval_us),
            refill_interval,
            cost: 1.0,
            eviction_grace_us: interval_us,
            name: None,
            time_source,
        })
    }

    /// Deducts `cost` tokens from the bucket of `key`.
    ///
    /// Same as [`RateLimiter::deduct`], but reports the remaining balance
    /// on success.
    ///
    /// # Errors
    ///
    /// - [`Error::RateLimitExceeded`] if the bucket holds fewer than `cost` tokens.
    /// - [`Error::InvalidCost`] if `cost` is negative or `NaN`. No bucket is touched.
    pub fn check(&self, key: &str, cost: f64) -> Result<RateLimitOutcome, Error> {
        validate_cost(cost)?;

        let now = self.time_source.now_micros();
        self.store.maybe_sweep(now, self.eviction_grace_us);

        loop {
            let bucket = self.store.get_or_create(key, self.refill.capacity(), now);
            match bucket.consume(cost, &self.refill, now) {
                Consumed::Allowed(remaining) => {
                    return Ok(RateLimitOutcome {
                        remaining,
                        limit: self.refill.capacity(),
                    });
                },
                Consumed::Denied(_available) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        policy = self.name(),
                        key,
                        cost,
                        available = _available,
                        "rate limit exceeded"
                    );
                    return Err(Error::RateLimitExceeded);
                },
                // Lost a race with eviction, the next lookup finds or creates the live bucket
                Consumed::Evicted => continue,
            }
        }
    }

    /// Deducts the policy's default cost from the bucket of `key`.
    ///
    /// The default cost is `1.0` unless changed with [`set_cost`](Self::set_cost).
    #[inline]
    pub fn hit(&self, key: &str) -> Result<RateLimitOutcome, Error> {
        self.check(key, self.cost)
    }

    /// Returns the number of tokens `key` could spend right now.
    ///
    /// Does not create a bucket for unknown keys; they report full capacity.
    pub fn remaining(&self, key: &str) -> f64 {
        let now = self.time_source.now_micros();
        self.store
            .get(key)
            .map_or(self.refill.capacity(), |bucket| bucket.peek(&self.refill, now))
    }

    /// Returns how long `key` has to wait until `cost` tokens are available.
    ///
    /// Returns `Duration::ZERO` if they are available now, and `None` if
    /// `cost` is invalid or larger than the capacity, so it can never succeed.
    pub fn retry_after(&self, key: &str, cost: f64) -> Option<Duration> {
        let capacity = self.refill.capacity();
        if validate_cost(cost).is_err() || cost > capacity {
            return None;
        }

        let available = self.remaining(key);
        if available >= cost {
            return Some(Duration::ZERO);
        }

        let missing = (cost - available) / capacity;
        Some(self.refill_interval.mul_f64(missing))
    }

    /// Sets the eviction grace period for inactive entries.
    ///
    /// Entries that have not been accessed for longer than this duration
    /// may be removed during subsequent `deduct` calls.
    #[inline]
    pub fn set_eviction(&mut self, eviction: Duration) {
        self.eviction_grace_us = eviction.as_micros()
            .try_into()
            .unwrap_or(u64::MAX);
    }

    /// Sets the cost charged by [`hit`](Self::hit).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCost`] if `cost` is negative or `NaN`.
    #[inline]
    pub fn set_cost(&mut self, cost: f64) -> Result<(), Error> {
        validate_cost(cost)?;
        self.cost = cost;
        Ok(())
    }

    /// Sets the policy name reported in log output.
    #[inline]
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Drops every bucket idle for longer than the eviction grace period.
    ///
    /// This happens automatically during `deduct`; calling it directly is
    /// only useful to release memory of a limiter that went quiet.
    /// Returns the number of dropped buckets.
    #[inline]
    pub fn evict_idle(&self) -> usize {
        let now = self.time_source.now_micros();
        self.store.evict_idle(now, self.eviction_grace_us)
    }

    /// Forgets the state of `key`, so its next action sees a full bucket.
    ///
    /// Returns `true` if the key was tracked.
    #[inline]
    pub fn reset(&self, key: &str) -> bool {
        self.store.remove(key)
    }

    /// Forgets the state of every key.
    #[inline]
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of keys currently tracked.
    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if no key is tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket capacity (max tokens).
    #[inline(always)]
    pub fn capacity(&self) -> f64 {
        self.refill.capacity()
    }

    /// Time for an empty bucket to become full.
    #[inline(always)]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Cost charged by [`hit`](Self::hit).
    #[inline(always)]
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Time after which inactive entries are eligible for eviction.
    #[inline(always)]
    pub fn eviction_grace(&self) -> Duration {
        Duration::from_micros(self.eviction_grace_us)
    }

    /// Time after which inactive entries are eligible for eviction, in whole seconds.
    #[inline(always)]
    pub fn eviction_grace_secs(&self) -> u64 {
        self.eviction_grace_us / MICROS_PER_SEC
    }

    /// Policy name, if any.
    #[inline(always)]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[inline]
fn validate_cost(cost: f64) -> Result<(), Error> {
    if cost.is_nan() || cost < 0.0 {
        Err(Error::InvalidCost(cost))
    } else {
        Ok(())
    }
}
