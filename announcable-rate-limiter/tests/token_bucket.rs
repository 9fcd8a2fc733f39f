#![allow(missing_docs)]

use std::sync::{Arc, Barrier, atomic::{AtomicU64, Ordering}};
use std::thread;
use std::time::Duration;

use announcable_rate_limiter::{
    presets, Error, RateLimiter, TimeSource, TokenBucket, TokenBucketRateLimiter
};

#[derive(Clone, Default)]
struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_micros(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[test]
fn it_throttles_login_attempts_end_to_end() {
    let clock = ManualClock::default();
    let limiter = TokenBucketRateLimiter::with_time_source(
        Duration::from_secs(60),
        5.0,
        clock.clone()
    ).unwrap();

    for i in 0..5 {
        assert!(limiter.deduct("user@example.com", 1.0).is_ok(), "Attempt {} should pass", i + 1);
    }

    let err = limiter.deduct("user@example.com", 1.0).unwrap_err();
    assert_eq!(err, Error::RateLimitExceeded);
    assert_eq!(err.to_string(), "Rate limit exceeded. Try again later.");

    clock.advance(Duration::from_secs(60));
    assert!(limiter.deduct("user@example.com", 1.0).is_ok());
}

#[test]
fn exhausting_one_key_leaves_others_untouched() {
    let clock = ManualClock::default();
    let limiter = presets::password_forgot()
        .build_with_time_source(clock.clone())
        .unwrap();

    assert!(limiter.hit("a@example.com").is_ok());
    assert!(limiter.hit("b@example.com").is_ok());
    assert!(limiter.hit("a@example.com").is_ok());
    assert!(limiter.hit("a@example.com").is_err());

    assert!(limiter.hit("b@example.com").is_ok());
    assert!(limiter.hit("b@example.com").is_err());

    clock.advance(Duration::from_secs(30));
    assert!(limiter.hit("a@example.com").is_ok());
    assert!(limiter.hit("a@example.com").is_err());
}

#[test]
fn concurrent_deductions_never_exceed_capacity() {
    const THREADS: usize = 8;
    const CAPACITY: usize = 100;

    // A day-long refill keeps the real clock from adding a whole token during the test
    let limiter = Arc::new(TokenBucketRateLimiter::new(
        Duration::from_secs(24 * 60 * 60),
        CAPACITY as f64
    ).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..50)
                    .filter(|_| limiter.deduct("shared@example.com", 1.0).is_ok())
                    .count()
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(total, CAPACITY);
    assert_eq!(limiter.len(), 1);
}

#[test]
fn concurrent_keys_are_independent() {
    let limiter = Arc::new(TokenBucketRateLimiter::from_secs(3600, 10.0).unwrap());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                let key = format!("user-{i}");
                (0..20)
                    .filter(|_| limiter.deduct(&key, 1.0).is_ok())
                    .count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 10);
    }
    assert_eq!(limiter.len(), 16);
}

#[test]
fn idle_keys_are_evicted_while_traffic_continues() {
    let clock = ManualClock::default();
    let limiter = TokenBucket::new(5.0, Duration::from_secs(60))
        .build_with_time_source(clock.clone())
        .unwrap();

    for i in 0..1_000 {
        limiter.deduct(&format!("attacker-{i}@example.com"), 1.0).unwrap();
    }
    assert_eq!(limiter.len(), 1_000);

    clock.advance(Duration::from_secs(61));
    limiter.deduct("user@example.com", 1.0).unwrap();

    assert_eq!(limiter.len(), 1);
}

#[test]
fn rejections_report_retry_after() {
    let clock = ManualClock::default();
    let limiter = presets::api()
        .build_with_time_source(clock.clone())
        .unwrap();

    while limiter.hit("user-1").is_ok() {}

    let wait = limiter.retry_after("user-1", limiter.cost()).unwrap();
    assert_eq!(wait, Duration::from_secs(4));

    clock.advance(wait);
    let outcome = limiter.hit("user-1").unwrap();
    assert_eq!(outcome.limit, 10.0);
    assert!(outcome.remaining.abs() < 1e-9);
}
