//! Exactly-once completion.
//!
//! A [`CompletionGate`] sits between everything that may try to finish an
//! invocation (the body's callback, its returned future, the timeout timer)
//! and the host's terminal handler. The first signal to arrive is forwarded;
//! the rest are dropped. [`arm_timeout`] starts the timer that races the body.

mod completion;
mod race;

pub use completion::{CompletionGate, Signal, StepCallback, StepDone};
pub use race::{arm_timeout, TimeoutNotice};
