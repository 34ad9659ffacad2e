//! Test doubles for the host runner side.
//!
//! - [`HandlerSpy`] - a terminal handler that records what it is told
//! - [`MockRunner`] - an in-memory [`HostRunner`](crate::registry::HostRunner)
//! - [`settle`] - let spawned timers and futures run
//!
//! # Example
//!
//! ```rust
//! use stepguard::gate::{CompletionGate, Signal};
//! use stepguard::mock::HandlerSpy;
//!
//! let spy = HandlerSpy::new();
//! let gate = CompletionGate::new(spy.handler());
//! gate.pending();
//!
//! assert_eq!(spy.last_signal(), Some(Signal::Pending));
//! ```

mod runner;
mod spy;

pub use runner::{MockRunner, StepRun};
pub use spy::{HandlerSpy, SignalRecord};

/// Yield to the runtime enough times for woken tasks to finish.
///
/// Timer tasks and deferred bodies run on the ambient tokio runtime; tests
/// driving a [`MockClock`](crate::clock::MockClock) call this after each
/// `advance`.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
