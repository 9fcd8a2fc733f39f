//! Per-key state for the token bucket algorithm.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// Refill parameters shared by every bucket of one limiter.
///
/// They never change after construction, so buckets do not store them.
#[derive(Debug, Clone, Copy)]
pub(super) struct Refill {
    /// Maximum number of tokens in a bucket.
    capacity: f64,

    /// Time for an empty bucket to become full, in microseconds. Never zero.
    interval_us: u64,
}

impl Refill {
    #[inline]
    pub(super) fn new(capacity: f64, interval_us: u64) -> Self {
        Self { capacity, interval_us }
    }

    #[inline(always)]
    pub(super) fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Token level after refilling from `last_refill_us` up to `now`.
    ///
    /// Always derived from the absolute elapsed time, so rounding errors
    /// do not accumulate across calls.
    #[inline]
    fn refilled(&self, tokens: f64, last_refill_us: u64, now: u64) -> f64 {
        let elapsed_us = now.saturating_sub(last_refill_us);
        if elapsed_us == 0 {
            return tokens;
        }
        let refill = elapsed_us as f64 / self.interval_us as f64 * self.capacity;
        (tokens + refill).min(self.capacity)
    }
}

/// Result of [`Bucket::consume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Consumed {
    /// Tokens were deducted; carries what is left.
    Allowed(f64),

    /// Not enough tokens; carries the (refilled) level that was too low.
    Denied(f64),

    /// The store dropped this bucket after it was resolved.
    /// The caller must look the key up again.
    Evicted,
}

#[derive(Debug)]
struct State {
    /// Current token balance, always within `[0, capacity]`.
    tokens: f64,

    /// Last refill time in microseconds (monotonic).
    last_refill_us: u64,

    /// Last access time in microseconds (for eviction).
    last_seen_us: u64,

    /// Set once the bucket has been removed from the store.
    evicted: bool,
}

/// Token state of a single key.
///
/// Refill and deduction run under one mutex, so no caller can observe
/// a refill without its matching deduction.
#[derive(Debug)]
pub(super) struct Bucket {
    state: Mutex<State>,
}

impl Bucket {
    /// Creates a full bucket.
    #[inline]
    pub(super) fn new(capacity: f64, now: u64) -> Self {
        Self {
            state: Mutex::new(State {
                tokens: capacity,
                last_refill_us: now,
                last_seen_us: now,
                evicted: false,
            }),
        }
    }

    /// Refills the bucket up to `now` and deducts `cost` if enough tokens are available.
    ///
    /// The refill is kept even when the deduction fails: tokens accrue from
    /// elapsed time, not from successful attempts.
    ///
    /// A zero `cost` always succeeds and leaves the stored state untouched.
    pub(super) fn consume(&self, cost: f64, refill: &Refill, now: u64) -> Consumed {
        let mut state = self.lock();
        if state.evicted {
            return Consumed::Evicted;
        }

        state.last_seen_us = state.last_seen_us.max(now);

        let tokens = refill.refilled(state.tokens, state.last_refill_us, now);
        if cost == 0.0 {
            return Consumed::Allowed(tokens);
        }

        state.tokens = tokens;
        state.last_refill_us = state.last_refill_us.max(now);

        if tokens >= cost {
            state.tokens -= cost;
            Consumed::Allowed(state.tokens)
        } else {
            Consumed::Denied(tokens)
        }
    }

    /// Returns the token level a deduction at `now` would see, without mutating anything.
    #[inline]
    pub(super) fn peek(&self, refill: &Refill, now: u64) -> f64 {
        let state = self.lock();
        refill.refilled(state.tokens, state.last_refill_us, now)
    }

    /// Marks the bucket as evicted if it has been idle for longer than `grace_us`.
    ///
    /// Never blocks: a bucket that is locked right now is in use and is kept.
    pub(super) fn try_evict(&self, now: u64, grace_us: u64) -> bool {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };

        if state.evicted {
            return true;
        }
        if now.saturating_sub(state.last_seen_us) > grace_us {
            state.evicted = true;
            return true;
        }
        false
    }

    /// Unconditionally marks the bucket as evicted.
    #[inline]
    pub(super) fn retire(&self) {
        self.lock().evicted = true;
    }

    /// Bucket state is two numbers and a flag, all written in single
    /// statements, so a poisoned lock still guards consistent data.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
