//! # stepguard
//!
//! > Every step finishes exactly once, and never takes forever
//!
//! **stepguard** supervises the step and hook bodies of a behavior-driven
//! test runner. Each invocation gets a timeout race and a completion gate:
//! whichever comes first of the body's callback, its returned future, or the
//! timer, decides the outcome, and everything after that is dropped.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepguard::prelude::*;
//!
//! let steps = stepguard::registry::install(runner, &GlobalOptions::default())?;
//!
//! steps.given("the basket is empty", StepBody::sync(|_| Ok(())), None)?;
//!
//! steps.when(
//!     "I check out",
//!     StepBody::deferred(|_, _| async { checkout().await }),
//!     Some(TimeoutValue::from(5_000_u64)),
//! )?;
//! ```
//!
//! ## Features
//!
//! - **Completion gate** - first signal wins, later ones are dropped
//! - **Timeout race** - a silent body fails with a timeout message
//! - **Explicit completion styles** - synchronous, callback, or future
//! - **Lifecycle names** - log lines say which feature, scenario, and step
//! - **Mock clock** - drive timeouts in tests without waiting

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Time sources for the timeout race
pub mod clock;

pub mod config;
pub mod error;
pub mod gate;
pub mod invocation;
pub mod lifecycle;
pub mod logging;
pub mod mock;
pub mod registry;

/// Prelude for convenient imports
///
/// ```rust
/// use stepguard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{MockClock, TimeSource, TokioClock};
    pub use crate::config::{GlobalOptions, TimeoutSetting, TimeoutValue};
    pub use crate::error::{BoxError, Error, Failure, Result};
    pub use crate::gate::{CompletionGate, Signal, StepCallback, StepDone};
    pub use crate::invocation::{CompletionStyle, HostStepFn, Invocation, StepBody, Supervisor};
    pub use crate::lifecycle::{HookKind, LifecycleContext, LifecycleEvent, Subject};
    pub use crate::logging::{LogEntry, LogSink, RecordingSink, TracingSink};
    pub use crate::registry::{install, install_with, HostRunner, Registrar};
}

// Re-exports
pub use error::{Error, Failure, Result};
