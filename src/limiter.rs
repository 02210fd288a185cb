//! Admission gate for concurrent container creation.
//!
//! The engine is known to fail a fraction of concurrent `create` calls above
//! a low concurrency threshold, so `run` operations pass through a counting
//! gate. The gate protects the engine, not this client's own correctness.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fair counting gate bounding how many container-create operations run at
/// once.
///
/// Admission is first-in-first-out. A configured bound of zero or below
/// disables the gate entirely.
#[derive(Debug, Clone)]
pub struct RunSlotLimiter {
    slots: Option<Arc<Semaphore>>,
}

/// A held run slot, released on drop.
///
/// Dropping on every exit path (success, failure, panic unwind) is what
/// guarantees the release-exactly-once contract.
#[derive(Debug)]
pub struct RunPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RunSlotLimiter {
    /// Create a limiter with `max_parallel_runs` slots; unbounded when the
    /// value is zero or negative.
    pub fn new(max_parallel_runs: i32) -> Self {
        let slots = if max_parallel_runs > 0 {
            Some(Arc::new(Semaphore::new(max_parallel_runs as usize)))
        } else {
            None
        };
        Self { slots }
    }

    /// Wait for a free slot.
    ///
    /// Suspends the caller until a permit is available; callers are admitted
    /// in arrival order.
    pub async fn acquire(&self) -> RunPermit {
        let permit = match &self.slots {
            // The semaphore is never closed, so acquire cannot fail.
            Some(slots) => Some(
                Arc::clone(slots)
                    .acquire_owned()
                    .await
                    .expect("run slot semaphore closed"),
            ),
            None => None,
        };
        RunPermit { _permit: permit }
    }

    /// Number of currently free slots, `None` when unbounded.
    pub fn available(&self) -> Option<usize> {
        self.slots.as_ref().map(|s| s.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_counted_and_released_on_drop() {
        let limiter = RunSlotLimiter::new(2);
        assert_eq!(limiter.available(), Some(2));

        let first = limiter.acquire().await;
        let second = limiter.acquire().await;
        assert_eq!(limiter.available(), Some(0));

        drop(first);
        assert_eq!(limiter.available(), Some(1));
        drop(second);
        assert_eq!(limiter.available(), Some(2));
    }

    #[tokio::test]
    async fn test_third_caller_waits_for_a_release() {
        let limiter = RunSlotLimiter::new(2);
        let _a = limiter.acquire().await;
        let b = limiter.acquire().await;

        let entered = Arc::new(AtomicUsize::new(0));
        let entered_clone = Arc::clone(&entered);
        let limiter_clone = limiter.clone();
        let third = tokio::spawn(async move {
            let permit = limiter_clone.acquire().await;
            entered_clone.store(1, Ordering::SeqCst);
            drop(permit);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(entered.load(Ordering::SeqCst), 0, "third run admitted early");

        drop(b);
        third.await.unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nonpositive_bound_is_unbounded() {
        for bound in [0, -1] {
            let limiter = RunSlotLimiter::new(bound);
            assert_eq!(limiter.available(), None);
            // Many acquisitions succeed immediately.
            let mut permits = Vec::new();
            for _ in 0..64 {
                permits.push(limiter.acquire().await);
            }
        }
    }
}
