//! Time sources for the timeout race
//!
//! The timer armed for every guarded invocation sleeps on a [`TimeSource`].
//! Production wiring uses [`TokioClock`]; tests use [`MockClock`] and move
//! virtual time forward explicitly, so a ten second budget expires instantly.
//!
//! # Example
//!
//! ```rust
//! use stepguard::clock::{MockClock, TimeSource};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = MockClock::new();
//! let source: &dyn TimeSource = &clock;
//! let sleep = source.sleep(Duration::from_millis(10));
//!
//! clock.advance(Duration::from_millis(10));
//! sleep.await;
//! # }
//! ```

mod mock_clock;
mod sleep;

use std::fmt::Debug;
use std::time::Duration;

use futures::future::BoxFuture;

pub use mock_clock::MockClock;
pub use sleep::MockSleep;

/// A source of sleeps for timeout timers.
///
/// Sleeps are `'static` so that they can be moved into a spawned timer task.
pub trait TimeSource: Send + Sync + Debug {
    /// A future that completes once `duration` has passed on this source.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real time, backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    /// Create a real-time clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

impl TimeSource for MockClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(MockClock::sleep(self, duration))
    }
}
