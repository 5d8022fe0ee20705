//! Cooperative deadlines for polling loops.
//!
//! A [`DeadlineGuard`] is created at the top of a bounded loop and its
//! [`tick`](DeadlineGuard::tick) is called once per iteration. It never
//! preempts anything; it only reports whether time has run out.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Bounds a loop by an absolute deadline.
///
/// `on_expiry` builds the error returned by every tick at or past the deadline.
pub struct DeadlineGuard<F, C = SystemClock> {
    deadline: Instant,
    budget: Duration,
    on_expiry: F,
    clock: C,
}

impl<F, E> DeadlineGuard<F, SystemClock>
where
    F: Fn(Duration) -> E,
{
    /// Starts a guard that expires `budget` from now on the system clock.
    pub fn new(budget: Duration, on_expiry: F) -> Self {
        Self::with_clock(budget, on_expiry, SystemClock)
    }
}

impl<F, E, C> DeadlineGuard<F, C>
where
    F: Fn(Duration) -> E,
    C: Clock,
{
    /// Starts a guard that expires `budget` from `clock.now()`.
    pub fn with_clock(budget: Duration, on_expiry: F, clock: C) -> Self {
        let deadline = clock.now() + budget;
        Self {
            deadline,
            budget,
            on_expiry,
            clock,
        }
    }

    /// Returns `Err` once the deadline is reached, `Ok(())` before it.
    pub fn tick(&self) -> std::result::Result<(), E> {
        if self.clock.now() >= self.deadline {
            return Err((self.on_expiry)(self.budget));
        }
        Ok(())
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(self.clock.now())
    }

    /// The total budget this guard was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PerchanceError;
    use std::sync::Mutex;

    /// Clock that only moves when told to.
    pub(crate) struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
            })
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    type TestGuard = DeadlineGuard<fn(Duration) -> PerchanceError, Arc<ManualClock>>;

    fn guard(clock: Arc<ManualClock>) -> TestGuard {
        let on_expiry: fn(Duration) -> PerchanceError = PerchanceError::Timeout;
        DeadlineGuard::with_clock(Duration::from_secs(10), on_expiry, clock)
    }

    #[test]
    fn test_tick_before_deadline_is_noop() {
        let clock = ManualClock::new();
        let guard = guard(clock.clone());

        for _ in 0..1_000 {
            assert!(guard.tick().is_ok());
        }
        clock.advance(Duration::from_millis(9_999));
        assert!(guard.tick().is_ok());
    }

    #[test]
    fn test_tick_at_deadline_fails() {
        let clock = ManualClock::new();
        let guard = guard(clock.clone());

        clock.advance(Duration::from_secs(10));
        let err = guard.tick().unwrap_err();
        assert!(matches!(err, PerchanceError::Timeout(d) if d == Duration::from_secs(10)));
    }

    #[test]
    fn test_expiry_independent_of_prior_ticks() {
        let fresh_clock = ManualClock::new();
        let fresh = guard(fresh_clock.clone());

        let busy_clock = ManualClock::new();
        let busy = guard(busy_clock.clone());
        for _ in 0..50 {
            busy.tick().unwrap();
            busy_clock.advance(Duration::from_millis(100));
        }

        fresh_clock.advance(Duration::from_secs(5));
        assert!(fresh.tick().is_ok());
        assert!(busy.tick().is_ok());

        fresh_clock.advance(Duration::from_secs(6));
        busy_clock.advance(Duration::from_secs(6));
        assert!(fresh.tick().is_err());
        assert!(busy.tick().is_err());
        // Stays expired.
        assert!(busy.tick().is_err());
    }

    #[test]
    fn test_custom_failure_value() {
        let clock = ManualClock::new();
        let guard = DeadlineGuard::with_clock(
            Duration::from_secs(8),
            |_| PerchanceError::Connection("key extraction timed out".into()),
            clock.clone(),
        );
        clock.advance(Duration::from_secs(8));
        assert!(matches!(guard.tick(), Err(PerchanceError::Connection(_))));
    }

    #[test]
    fn test_remaining() {
        let clock = ManualClock::new();
        let guard = guard(clock.clone());
        assert_eq!(guard.remaining(), Duration::from_secs(10));
        clock.advance(Duration::from_secs(4));
        assert_eq!(guard.remaining(), Duration::from_secs(6));
        clock.advance(Duration::from_secs(30));
        assert_eq!(guard.remaining(), Duration::ZERO);
        assert_eq!(guard.budget(), Duration::from_secs(10));
    }
}
