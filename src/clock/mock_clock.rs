//! `MockClock` implementation for virtual time control.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::sleep::{MockSleep, SleepQueue};

/// A virtual clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to the
/// supervisor and keep another to drive timeouts.
///
/// # Example
///
/// ```rust
/// use stepguard::clock::MockClock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let other = clock.clone();
///
/// other.advance(Duration::from_millis(250));
/// assert_eq!(clock.now(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    pub(crate) inner: Arc<ClockInner>,
}

#[derive(Debug)]
pub(crate) struct ClockInner {
    current: Mutex<Duration>,
    pub(crate) sleeps: Mutex<SleepQueue>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_start_time(Duration::ZERO)
    }

    /// Creates a clock starting at `start`.
    #[must_use]
    pub fn with_start_time(start: Duration) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                current: Mutex::new(start),
                sleeps: Mutex::new(SleepQueue::new()),
            }),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        *self.inner.current.lock()
    }

    /// Moves time forward and wakes every sleep that is now due.
    pub fn advance(&self, duration: Duration) {
        let now = {
            let mut current = self.inner.current.lock();
            *current += duration;
            *current
        };
        self.inner.sleeps.lock().wake_expired(now);
    }

    /// Creates a sleep that completes once virtual time passes `duration`
    /// from now.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> MockSleep {
        MockSleep::new(self.clone(), duration)
    }

    /// Number of sleeps that have been created and not yet completed or dropped.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.sleeps.lock().pending_count()
    }
}
