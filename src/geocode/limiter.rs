//! Blocking rate limiter for outbound provider requests.
//!
//! The limiter enforces a minimum interval between request starts on a single
//! instance. Waiting is a real blocking wait on a condition variable so that a
//! `CancelToken` can interrupt it from another thread.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::types::GeocodeError;

/// Minimum spacing between two requests to the public Nominatim service.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1000);

/// Shared cancellation flag that wakes up blocked waiters.
///
/// Cancellation is sticky until `reset` is called.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        *cancelled = true;
        self.inner.wakeup.notify_all();
    }

    pub fn reset(&self) {
        *self.lock() = false;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Block for `duration`. Returns `false` if cancelled before it elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.lock();
        loop {
            if *cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            cancelled = self
                .inner
                .wakeup
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-instance request clock.
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

/// Exclusive right to issue one request. Dropping it lets the next caller in.
pub struct Permit<'a> {
    _guard: MutexGuard<'a, Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until a request may start, then stamp the clock.
    ///
    /// Callers queue on the clock mutex, so at most one permit exists at a
    /// time. A cancelled wait leaves the clock untouched.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<Permit<'_>, GeocodeError> {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                tracing::debug!("Rate limiting: waiting {}ms", wait.as_millis());
                if !cancel.sleep(wait) {
                    return Err(GeocodeError::Cancelled);
                }
            }
        }

        *last = Some(Instant::now());
        Ok(Permit { _guard: last })
    }

    /// Time of the most recent permitted request.
    pub fn last_request(&self) -> Option<Instant> {
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        drop(limiter.acquire(&CancelToken::new()).unwrap());
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(limiter.last_request().is_some());
    }

    #[test]
    fn test_second_acquire_waits_for_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let token = CancelToken::new();
        drop(limiter.acquire(&token).unwrap());
        let first = limiter.last_request().unwrap();
        drop(limiter.acquire(&token).unwrap());
        let second = limiter.last_request().unwrap();
        assert!(second.duration_since(first) >= Duration::from_millis(200));
    }

    #[test]
    fn test_cancel_interrupts_wait_without_stamping() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(5)));
        let token = CancelToken::new();
        drop(limiter.acquire(&token).unwrap());
        let stamped = limiter.last_request().unwrap();

        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let start = Instant::now();
        let result = limiter.acquire(&token);
        assert!(matches!(result, Err(GeocodeError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(limiter.last_request(), Some(stamped));
        handle.join().unwrap();
    }

    #[test]
    fn test_sleep_reports_completion() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(10)));
        token.cancel();
        assert!(!token.sleep(Duration::from_millis(10)));
        token.reset();
        assert!(!token.is_cancelled());
        assert!(token.sleep(Duration::ZERO));
    }
}
