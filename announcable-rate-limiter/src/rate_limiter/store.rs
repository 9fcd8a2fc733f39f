//! Concurrent key to bucket resolution with idle eviction.

use super::bucket::Bucket;
use dashmap::DashMap;
use std::sync::{Arc, atomic::{AtomicU64, Ordering::*}};

/// Owns every bucket of one limiter.
///
/// ## Locking
///
/// - Lookups take a shard read lock just long enough to clone the `Arc`.
/// - Creation goes through [`DashMap::entry`], so racing first requests for
///   the same key end up with one shared bucket.
/// - Bucket locks are only taken after the shard lock is released.
///   The eviction path is the one place that holds both, and it only
///   ever `try_lock`s the bucket.
#[derive(Debug)]
pub(super) struct BucketStore {
    buckets: DashMap<String, Arc<Bucket>>,

    /// Time of the last amortized sweep in microseconds.
    last_sweep_us: AtomicU64,
}

impl BucketStore {
    #[inline]
    pub(super) fn new(now: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            last_sweep_us: AtomicU64::new(now),
        }
    }

    /// Returns the bucket for `key`, creating a full one on first access.
    pub(super) fn get_or_create(&self, key: &str, capacity: f64, now: u64) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        let entry = self.buckets
            .entry(key.to_owned())
            .or_insert_with(|| {
                #[cfg(feature = "tracing")]
                tracing::trace!(key, "rate limit bucket created");
                Arc::new(Bucket::new(capacity, now))
            });
        Arc::clone(entry.value())
    }

    /// Returns the bucket for `key` without creating it.
    #[inline]
    pub(super) fn get(&self, key: &str) -> Option<Arc<Bucket>> {
        self.buckets
            .get(key)
            .map(|bucket| Arc::clone(bucket.value()))
    }

    /// Drops every bucket that has not been touched for longer than `grace_us`.
    ///
    /// Returns the number of dropped buckets.
    pub(super) fn evict_idle(&self, now: u64, grace_us: u64) -> usize {
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            if bucket.try_evict(now, grace_us) {
                evicted += 1;
                false
            } else {
                true
            }
        });

        #[cfg(feature = "tracing")]
        {
            if evicted > 0 {
                tracing::trace!(evicted, remaining = self.buckets.len(), "idle rate limit buckets evicted");
            }
        }

        evicted
    }

    /// Runs [`evict_idle`](Self::evict_idle) if at least `grace_us` passed
    /// since the previous sweep.
    ///
    /// Concurrent callers race on a CAS, so only one of them sweeps.
    pub(super) fn maybe_sweep(&self, now: u64, grace_us: u64) {
        let last = self.last_sweep_us.load(Acquire);
        if now.saturating_sub(last) <= grace_us {
            return;
        }
        if self.last_sweep_us
            .compare_exchange(last, now, AcqRel, Acquire)
            .is_ok()
        {
            self.evict_idle(now, grace_us);
        }
    }

    /// Forgets `key`. Returns `true` if it was tracked.
    pub(super) fn remove(&self, key: &str) -> bool {
        match self.buckets.remove(key) {
            Some((_, bucket)) => {
                bucket.retire();
                true
            },
            None => false
        }
    }

    /// Forgets every key.
    pub(super) fn clear(&self) {
        self.buckets.retain(|_, bucket| {
            bucket.retire();
            false
        });
    }

    /// Number of tracked keys.
    #[inline]
    pub(super) fn len(&self) -> usize {
        self.buckets.len()
    }
}
