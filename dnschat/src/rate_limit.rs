//! Rate Limiter (spec.md §4.6): sliding window of admissions per minute.
//!
//! Grounded in the per-IP sliding-window idiom seen in the wider DNS corpus
//! (`zdns-transport.rs`'s `RATE_LIMIT_MAX_QUERIES`/`RATE_LIMIT_WINDOW_SECS`
//! constants and `VecDeque<Instant>` accounting), adapted from per-IP to a
//! single process-wide limiter since this is a chat client, not a
//! multi-tenant server. A single constant pair drives the limit, per spec.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding window size (spec.md §4.6, §6: `W = 60s`).
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// Admissions allowed per window (spec.md §4.6, §6: `N = 60`).
pub const RATE_LIMIT_CAPACITY: usize = 60;

/// A process-wide sliding-window admission gate. Uses `Instant` (a monotonic
/// clock) exclusively so wall-clock jumps can never grant unearned
/// admissions (spec.md §5).
pub struct RateLimiter {
    window: Duration,
    capacity: usize,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, capacity: usize) -> Self {
        RateLimiter {
            window,
            capacity,
            admissions: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Admit the caller iff fewer than `capacity` admissions occurred in the
    /// last `window`. Records the admission only on success, per spec.md
    /// §4.6 ("An admission is recorded on successful admission only").
    pub fn admit(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut admissions = self.admissions.lock().unwrap();

        while let Some(oldest) = admissions.front() {
            if now.duration_since(*oldest) >= self.window {
                admissions.pop_front();
            } else {
                break;
            }
        }

        if admissions.len() < self.capacity {
            admissions.push_back(now);
            Ok(())
        } else {
            let oldest = *admissions.front().unwrap();
            let retry_after = self.window - now.duration_since(oldest);
            Err(retry_after)
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(RATE_LIMIT_WINDOW, RATE_LIMIT_CAPACITY)
    }
}

#[test]
fn test_admits_up_to_capacity() {
    let limiter = RateLimiter::new(Duration::from_secs(60), 3);
    assert!(limiter.admit().is_ok());
    assert!(limiter.admit().is_ok());
    assert!(limiter.admit().is_ok());
    assert!(limiter.admit().is_err());
}

#[test]
fn test_denial_carries_retry_after() {
    let limiter = RateLimiter::new(Duration::from_secs(60), 1);
    limiter.admit().unwrap();
    let retry_after = limiter.admit().unwrap_err();
    assert!(retry_after <= Duration::from_secs(60));
    assert!(retry_after > Duration::ZERO);
}

#[test]
fn test_window_expiry_allows_new_admission() {
    let limiter = RateLimiter::new(Duration::from_millis(20), 1);
    limiter.admit().unwrap();
    assert!(limiter.admit().is_err());
    std::thread::sleep(Duration::from_millis(30));
    assert!(limiter.admit().is_ok());
}
