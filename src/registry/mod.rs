//! Registration adapters.
//!
//! [`install`] wires the supervisor into a [`HostRunner`]: it subscribes to
//! the runner's lifecycle notifications and hands back a [`Registrar`] whose
//! `given`/`when`/`then`/`before`/`after` mirror the runner's own
//! registration entry points, except that every body they register is
//! timeout-guarded.
//!
//! # Example
//!
//! ```rust
//! use stepguard::config::{GlobalOptions, TimeoutValue};
//! use stepguard::invocation::StepBody;
//! use stepguard::logging::RecordingSink;
//! use stepguard::mock::MockRunner;
//! use stepguard::registry::install_with;
//! use stepguard::clock::TokioClock;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let runner = Arc::new(MockRunner::new());
//! let steps = install_with(
//!     Arc::clone(&runner),
//!     &GlobalOptions::default(),
//!     Arc::new(RecordingSink::new()),
//!     Arc::new(TokioClock::new()),
//! )
//! .unwrap();
//!
//! steps
//!     .given(["I have (\\d+) apples", "I own (\\d+) apples"], StepBody::sync(|_| Ok(())), None)
//!     .unwrap();
//! assert_eq!(runner.step_patterns().len(), 2);
//!
//! // A bad override is refused before anything is registered.
//! let err = steps.when("I eat one", StepBody::sync(|_| Ok(())), Some(TimeoutValue::from("soon")));
//! assert!(err.is_err());
//! assert_eq!(runner.step_patterns().len(), 2);
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::clock::{TimeSource, TokioClock};
use crate::config::{resolve, GlobalOptions, TimeoutValue};
use crate::error::Result;
use crate::gate::StepCallback;
use crate::invocation::{HostStepFn, StepBody, Supervisor};
use crate::lifecycle::{HookKind, LifecycleContext, LifecycleEvent, Subject};
use crate::logging::{init_file_logging, LogSink, TracingSink};

/// Lifecycle listener: receives the announced name and must complete the
/// handler for the host to proceed.
pub type LifecycleListener = Arc<dyn Fn(&str, Box<dyn StepCallback>) + Send + Sync>;

/// The host test runner's registration surface.
pub trait HostRunner: Send + Sync {
    /// Register a step under one pattern.
    fn define_step(&self, pattern: &str, step: HostStepFn);

    /// Register a before hook with host-specific selectors.
    fn before(&self, selectors: Vec<String>, hook: HostStepFn);

    /// Register an after hook with host-specific selectors.
    fn after(&self, selectors: Vec<String>, hook: HostStepFn);

    /// Listen for features starting.
    fn before_feature(&self, listener: LifecycleListener);

    /// Listen for scenarios starting.
    fn before_scenario(&self, listener: LifecycleListener);

    /// Listen for steps starting.
    fn before_step(&self, listener: LifecycleListener);
}

/// One pattern or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPatterns(Vec<String>);

impl StepPatterns {
    /// The patterns, in the order given.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for StepPatterns {
    fn from(pattern: &str) -> Self {
        Self(vec![pattern.to_string()])
    }
}

impl From<String> for StepPatterns {
    fn from(pattern: String) -> Self {
        Self(vec![pattern])
    }
}

impl From<Vec<String>> for StepPatterns {
    fn from(patterns: Vec<String>) -> Self {
        Self(patterns)
    }
}

impl From<Vec<&str>> for StepPatterns {
    fn from(patterns: Vec<&str>) -> Self {
        Self(patterns.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for StepPatterns {
    fn from(patterns: [&str; N]) -> Self {
        Self(patterns.iter().map(|p| (*p).to_string()).collect())
    }
}

/// Registers guarded steps with a host runner.
pub struct StepAdapter<R: ?Sized> {
    runner: Arc<R>,
    supervisor: Supervisor,
    default_timeout: Duration,
}

impl<R: HostRunner + ?Sized> StepAdapter<R> {
    /// Create an adapter over `runner`.
    pub fn new(runner: Arc<R>, supervisor: Supervisor, default_timeout: Duration) -> Self {
        Self {
            runner,
            supervisor,
            default_timeout,
        }
    }

    /// Register `body` under every pattern in `patterns`.
    ///
    /// The override is validated once, before any pattern is registered.
    pub fn define(
        &self,
        patterns: impl Into<StepPatterns>,
        body: StepBody,
        timeout: Option<TimeoutValue>,
    ) -> Result<()> {
        let setting = resolve(timeout.as_ref(), self.default_timeout)?;
        let step = self.supervisor.wrap(body, Subject::Step, setting);
        for pattern in patterns.into().iter() {
            tracing::debug!(target: crate::logging::LOG_TARGET, pattern, "registering step");
            self.runner.define_step(pattern, Arc::clone(&step));
        }
        Ok(())
    }
}

/// Registers guarded hooks of one kind with a host runner.
pub struct HookAdapter<R: ?Sized> {
    runner: Arc<R>,
    supervisor: Supervisor,
    default_timeout: Duration,
    kind: HookKind,
}

impl<R: HostRunner + ?Sized> HookAdapter<R> {
    /// Create an adapter registering `kind` hooks on `runner`.
    pub fn new(
        runner: Arc<R>,
        supervisor: Supervisor,
        default_timeout: Duration,
        kind: HookKind,
    ) -> Self {
        Self {
            runner,
            supervisor,
            default_timeout,
            kind,
        }
    }

    /// Register `body` with the given selectors, passed to the host untouched.
    pub fn define<I, S>(&self, selectors: I, body: StepBody, timeout: Option<TimeoutValue>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let setting = resolve(timeout.as_ref(), self.default_timeout)?;
        let hook = self.supervisor.wrap(body, Subject::Hook(self.kind), setting);
        let selectors = selectors.into_iter().map(Into::into).collect();
        match self.kind {
            HookKind::Before => self.runner.before(selectors, hook),
            HookKind::After => self.runner.after(selectors, hook),
        }
        Ok(())
    }
}

/// Guarded replacements for the host's registration functions.
pub struct Registrar<R: ?Sized> {
    steps: StepAdapter<R>,
    before: HookAdapter<R>,
    after: HookAdapter<R>,
    lifecycle: LifecycleContext,
}

impl<R: HostRunner + ?Sized> Registrar<R> {
    /// Register a step. Same as [`step`](Self::step).
    pub fn given(
        &self,
        patterns: impl Into<StepPatterns>,
        body: StepBody,
        timeout: Option<TimeoutValue>,
    ) -> Result<()> {
        self.step(patterns, body, timeout)
    }

    /// Register a step. Same as [`step`](Self::step).
    pub fn when(
        &self,
        patterns: impl Into<StepPatterns>,
        body: StepBody,
        timeout: Option<TimeoutValue>,
    ) -> Result<()> {
        self.step(patterns, body, timeout)
    }

    /// Register a step. Same as [`step`](Self::step).
    pub fn then(
        &self,
        patterns: impl Into<StepPatterns>,
        body: StepBody,
        timeout: Option<TimeoutValue>,
    ) -> Result<()> {
        self.step(patterns, body, timeout)
    }

    /// Register a step under one or more patterns.
    pub fn step(
        &self,
        patterns: impl Into<StepPatterns>,
        body: StepBody,
        timeout: Option<TimeoutValue>,
    ) -> Result<()> {
        self.steps.define(patterns, body, timeout)
    }

    /// Register a before hook.
    pub fn before<I, S>(&self, selectors: I, body: StepBody, timeout: Option<TimeoutValue>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before.define(selectors, body, timeout)
    }

    /// Register an after hook.
    pub fn after<I, S>(&self, selectors: I, body: StepBody, timeout: Option<TimeoutValue>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.define(selectors, body, timeout)
    }

    /// Names tracked from the host's notifications.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleContext {
        &self.lifecycle
    }
}

impl<R: ?Sized> fmt::Debug for Registrar<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("default_timeout", &self.steps.default_timeout)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Wire into `runner` with the default sink and real time.
///
/// Installs file logging per `options` first; see
/// [`init_file_logging`](crate::logging::init_file_logging).
///
/// # Errors
///
/// Fails if the log file cannot be opened or if there is no tokio runtime
/// on the calling thread.
pub fn install<R>(runner: Arc<R>, options: &GlobalOptions) -> Result<Registrar<R>>
where
    R: HostRunner + ?Sized,
{
    init_file_logging(options)?;
    install_with(
        runner,
        options,
        Arc::new(TracingSink),
        Arc::new(TokioClock::new()),
    )
}

/// Wire into `runner` reporting to `sink` and timing with `clock`.
///
/// Must be called from within a tokio runtime. Timers and deferred bodies
/// are spawned onto that runtime, so the host may later invoke registered
/// steps from any thread.
///
/// # Errors
///
/// Returns [`Error::NoRuntime`](crate::error::Error::NoRuntime) when called
/// outside a runtime; nothing is subscribed in that case.
pub fn install_with<R>(
    runner: Arc<R>,
    options: &GlobalOptions,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn TimeSource>,
) -> Result<Registrar<R>>
where
    R: HostRunner + ?Sized,
{
    let runtime = Handle::try_current()?;
    let lifecycle = LifecycleContext::new();
    runner.before_feature(listener(&lifecycle, LifecycleEvent::Feature));
    runner.before_scenario(listener(&lifecycle, LifecycleEvent::Scenario));
    runner.before_step(listener(&lifecycle, LifecycleEvent::Step));

    let supervisor = Supervisor::new(lifecycle.clone(), sink, clock, runtime);
    let timeout = options.default_timeout;
    tracing::debug!(
        target: crate::logging::LOG_TARGET,
        default_timeout_ms = %timeout.as_millis(),
        "installed step supervisor"
    );

    Ok(Registrar {
        steps: StepAdapter::new(Arc::clone(&runner), supervisor.clone(), timeout),
        before: HookAdapter::new(Arc::clone(&runner), supervisor.clone(), timeout, HookKind::Before),
        after: HookAdapter::new(runner, supervisor, timeout, HookKind::After),
        lifecycle,
    })
}

fn listener(lifecycle: &LifecycleContext, event: fn(String) -> LifecycleEvent) -> LifecycleListener {
    let lifecycle = lifecycle.clone();
    Arc::new(move |name: &str, done: Box<dyn StepCallback>| {
        lifecycle.observe(event(name.to_string()));
        done.succeed();
    })
}
