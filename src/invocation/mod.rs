//! Supervised invocation of step and hook bodies.
//!
//! A [`StepBody`] declares how it finishes: by returning, by calling the
//! [`StepDone`] it is given, or by returning a future. [`Supervisor::wrap`]
//! turns a body into a [`HostStepFn`] with the host's calling convention,
//! where every call logs its start and end, arms a fresh timeout race, and
//! routes whatever the body does into a [`CompletionGate`].
//!
//! # Example
//!
//! ```rust
//! use stepguard::clock::MockClock;
//! use stepguard::config::TimeoutSetting;
//! use stepguard::invocation::{Invocation, StepBody, Supervisor};
//! use stepguard::lifecycle::{LifecycleContext, Subject};
//! use stepguard::logging::RecordingSink;
//! use stepguard::mock::HandlerSpy;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let supervisor = Supervisor::new(
//!     LifecycleContext::with_names("Cart", "Add item", "I add an apple"),
//!     Arc::new(RecordingSink::new()),
//!     Arc::new(MockClock::new()),
//!     tokio::runtime::Handle::current(),
//! );
//!
//! let step = supervisor.wrap(
//!     StepBody::callback(|_args, done| {
//!         done.succeed();
//!         Ok(())
//!     }),
//!     Subject::Step,
//!     TimeoutSetting::from_millis(1000),
//! );
//!
//! let spy = HandlerSpy::new();
//! assert_eq!(step(&[], spy.handler()), Invocation::Supervised);
//! assert!(spy.was_called_times(1));
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;

use crate::clock::TimeSource;
use crate::config::TimeoutSetting;
use crate::error::{BoxError, Failure};
use crate::gate::{arm_timeout, CompletionGate, StepCallback, StepDone, TimeoutNotice};
use crate::lifecycle::{LifecycleContext, Subject};
use crate::logging::{LogEntry, LogSink};

/// Future returned by a deferred body.
pub type StepFuture = BoxFuture<'static, Result<(), BoxError>>;

type SyncFn = dyn Fn(&[String]) -> Result<(), BoxError> + Send + Sync;
type CallbackFn = dyn Fn(&[String], StepDone) -> Result<(), BoxError> + Send + Sync;
type DeferredFn = dyn Fn(&[String], StepDone) -> StepFuture + Send + Sync;

/// A wrapped body with the host's calling convention.
///
/// Receives the step arguments and the host's terminal handler.
pub type HostStepFn = Arc<dyn Fn(&[String], Box<dyn StepCallback>) -> Invocation + Send + Sync>;

/// How a body reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStyle {
    /// Finishes by returning.
    Synchronous,
    /// Finishes by calling its [`StepDone`].
    CallbackStyle,
    /// Finishes when its returned future settles.
    DeferredStyle,
}

/// A user-supplied step or hook body.
#[derive(Clone)]
pub enum StepBody {
    /// Runs to completion before returning.
    Synchronous(Arc<SyncFn>),
    /// Calls the supplied [`StepDone`], now or later.
    Callback(Arc<CallbackFn>),
    /// Returns a future; may also use the supplied [`StepDone`].
    Deferred(Arc<DeferredFn>),
}

impl StepBody {
    /// A body that finishes by returning.
    pub fn sync<F>(body: F) -> Self
    where
        F: Fn(&[String]) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::Synchronous(Arc::new(body))
    }

    /// A body that finishes by calling `done`.
    pub fn callback<F>(body: F) -> Self
    where
        F: Fn(&[String], StepDone) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(body))
    }

    /// A body that finishes when its future settles.
    pub fn deferred<F, Fut>(body: F) -> Self
    where
        F: Fn(&[String], StepDone) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::Deferred(Arc::new(move |args: &[String], done: StepDone| {
            body(args, done).boxed()
        }))
    }

    /// The declared completion style.
    #[must_use]
    pub fn style(&self) -> CompletionStyle {
        match self {
            Self::Synchronous(_) => CompletionStyle::Synchronous,
            Self::Callback(_) => CompletionStyle::CallbackStyle,
            Self::Deferred(_) => CompletionStyle::DeferredStyle,
        }
    }
}

impl fmt::Debug for StepBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StepBody").field(&self.style()).finish()
    }
}

/// What a wrapped call tells its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Invocation {
    /// A synchronous body returned normally. The handler was not called;
    /// the caller takes the return as the step's result.
    Returned,
    /// The handler has been, or will be, called exactly once.
    Supervised,
}

enum Started {
    Returned,
    Awaiting,
    Future(StepFuture),
}

/// Wraps bodies so that each call is timeout-guarded and resolves once.
///
/// Timers and deferred bodies run on the runtime given at construction, so
/// the host may call wrapped functions from any thread.
#[derive(Clone)]
pub struct Supervisor {
    lifecycle: LifecycleContext,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn TimeSource>,
    runtime: Handle,
}

impl Supervisor {
    /// Create a supervisor reporting to `sink`, timing with `clock`, and
    /// spawning onto `runtime`.
    #[must_use]
    pub fn new(
        lifecycle: LifecycleContext,
        sink: Arc<dyn LogSink>,
        clock: Arc<dyn TimeSource>,
        runtime: Handle,
    ) -> Self {
        Self {
            lifecycle,
            sink,
            clock,
            runtime,
        }
    }

    /// The names this supervisor logs with.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleContext {
        &self.lifecycle
    }

    /// Wrap `body` for registration with the host.
    ///
    /// Every call of the returned function gets its own gate and timer.
    pub fn wrap(&self, body: StepBody, subject: Subject, timeout: TimeoutSetting) -> HostStepFn {
        tracing::debug!(
            target: crate::logging::LOG_TARGET,
            style = ?body.style(),
            timeout_ms = %timeout,
            "wrapping body"
        );
        let supervisor = self.clone();
        Arc::new(move |args: &[String], handler: Box<dyn StepCallback>| {
            supervisor.invoke(&body, subject, timeout, args, handler)
        })
    }

    /// Run `body` once under supervision.
    ///
    /// Never panics on behalf of the body: errors and panics it raises are
    /// delivered to `handler` as a [`Failure`].
    pub fn invoke(
        &self,
        body: &StepBody,
        subject: Subject,
        timeout: TimeoutSetting,
        args: &[String],
        handler: Box<dyn StepCallback>,
    ) -> Invocation {
        let names = self.lifecycle.snapshot();
        let name = names.name_of(subject);
        self.sink.record(&LogEntry::started(name.as_str(), &names));

        let gate = CompletionGate::new(handler);
        // A synchronous body is over before the call returns; a timer could
        // only race it from another worker thread.
        if body.style() != CompletionStyle::Synchronous {
            arm_timeout(
                &gate,
                timeout,
                self.clock.as_ref(),
                TimeoutNotice {
                    sink: Arc::clone(&self.sink),
                    lifecycle: self.lifecycle.clone(),
                    subject,
                },
                &self.runtime,
            );
        }

        let done = StepDone::new(gate.clone());
        let started = catch_unwind(AssertUnwindSafe(|| match body {
            StepBody::Synchronous(f) => f(args).map(|()| Started::Returned),
            StepBody::Callback(f) => f(args, done).map(|()| Started::Awaiting),
            StepBody::Deferred(f) => Ok(Started::Future(f(args, done))),
        }));

        let started = match started {
            Ok(Ok(started)) => started,
            Ok(Err(err)) => {
                gate.fail(Failure::body(&err));
                return Invocation::Supervised;
            }
            Err(payload) => {
                gate.fail(Failure::panicked(&*payload));
                return Invocation::Supervised;
            }
        };

        self.sink.record(&LogEntry::ended(name, &names));

        match started {
            Started::Returned => {
                gate.release();
                Invocation::Returned
            }
            Started::Awaiting => Invocation::Supervised,
            Started::Future(future) => {
                self.runtime.spawn(settle(future, gate));
                Invocation::Supervised
            }
        }
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("lifecycle", &self.lifecycle)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

async fn settle(future: StepFuture, gate: CompletionGate) {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => gate.succeed(),
        Ok(Err(err)) => gate.fail(Failure::rejected(&err)),
        Err(payload) => gate.fail(Failure::panicked(&*payload)),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::gate::Signal;
    use crate::lifecycle::HookKind;
    use crate::logging::RecordingSink;
    use crate::mock::{settle as yield_all, HandlerSpy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fixture {
        clock: MockClock,
        sink: RecordingSink,
        supervisor: Supervisor,
    }

    fn fixture() -> Fixture {
        let clock = MockClock::new();
        let sink = RecordingSink::new();
        let supervisor = Supervisor::new(
            LifecycleContext::with_names("Checkout", "Card payment", "I pay"),
            Arc::new(sink.clone()),
            Arc::new(clock.clone()),
            Handle::current(),
        );
        Fixture {
            clock,
            sink,
            supervisor,
        }
    }

    fn ms(millis: u64) -> TimeoutSetting {
        TimeoutSetting::from_millis(millis)
    }

    #[test]
    fn test_style_of_each_body() {
        assert_eq!(
            StepBody::sync(|_| Ok(())).style(),
            CompletionStyle::Synchronous
        );
        assert_eq!(
            StepBody::callback(|_, _| Ok(())).style(),
            CompletionStyle::CallbackStyle
        );
        assert_eq!(
            StepBody::deferred(|_, _| async { Ok::<(), BoxError>(()) }).style(),
            CompletionStyle::DeferredStyle
        );
    }

    #[tokio::test]
    async fn test_sync_body_returns_without_signal() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx
            .supervisor
            .wrap(StepBody::sync(|_| Ok(())), Subject::Step, ms(10));

        assert_eq!(step(&[], spy.handler()), Invocation::Returned);
        assert!(spy.signals().is_empty());
        assert_eq!(fx.sink.starts(), 1);
        assert_eq!(fx.sink.ends(), 1);
        assert_eq!(fx.clock.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_body_sees_arguments() {
        let fx = fixture();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let step = fx.supervisor.wrap(
            StepBody::sync(move |args| {
                seen2.store(args[0].parse()?, Ordering::SeqCst);
                Ok(())
            }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&["42".to_string()], HandlerSpy::new().handler());
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn test_sync_error_fails_without_end_line() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::sync(|_| Err("no such card".into())),
            Subject::Step,
            ms(10),
        );

        assert_eq!(step(&[], spy.handler()), Invocation::Supervised);
        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::Body("no such card".into()))]
        );
        assert_eq!(fx.sink.starts(), 1);
        assert_eq!(fx.sink.ends(), 0);
    }

    #[tokio::test]
    async fn test_callback_error_fails_once() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::callback(|_, done| {
                done.succeed();
                Err("too late".into())
            }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&[], spy.handler());
        assert_eq!(spy.signals(), vec![Signal::Success]);
        assert_eq!(fx.sink.ends(), 0);
    }

    #[tokio::test]
    async fn test_panicking_body_fails() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::callback(|_, _| panic!("unexpected state")),
            Subject::Step,
            ms(10),
        );

        assert_eq!(step(&[], spy.handler()), Invocation::Supervised);
        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::Panicked("unexpected state".into()))]
        );
        yield_all().await;
        assert_eq!(fx.clock.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_callback_completed_synchronously() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::callback(|_, done| {
                done.pending();
                Ok(())
            }),
            Subject::Step,
            ms(10),
        );

        assert_eq!(step(&[], spy.handler()), Invocation::Supervised);
        assert_eq!(spy.signals(), vec![Signal::Pending]);

        fx.clock.advance(Duration::from_millis(50));
        yield_all().await;
        assert!(spy.was_called_times(1));
        assert_eq!(fx.sink.timeouts(), 0);
    }

    #[tokio::test]
    async fn test_callback_completed_later() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let clock = fx.clock.clone();
        let step = fx.supervisor.wrap(
            StepBody::callback(move |_, done| {
                let clock = clock.clone();
                tokio::spawn(async move {
                    clock.sleep(Duration::from_millis(5)).await;
                    done.succeed();
                });
                Ok(())
            }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&[], spy.handler());
        yield_all().await;
        assert!(spy.signals().is_empty());

        fx.clock.advance(Duration::from_millis(5));
        yield_all().await;
        assert_eq!(spy.signals(), vec![Signal::Success]);

        fx.clock.advance(Duration::from_millis(100));
        yield_all().await;
        assert!(spy.was_called_times(1));
        assert_eq!(fx.sink.timeouts(), 0);
    }

    #[tokio::test]
    async fn test_callback_never_called_times_out() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx
            .supervisor
            .wrap(StepBody::callback(|_, _| Ok(())), Subject::Step, ms(10));

        let _ = step(&[], spy.handler());
        fx.clock.advance(Duration::from_millis(10));
        yield_all().await;

        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::timeout(ms(10)))]
        );
        assert_eq!(fx.sink.timeouts(), 1);
    }

    #[tokio::test]
    async fn test_late_callback_after_timeout_is_dropped() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let parked = Arc::new(parking_lot::Mutex::new(None::<StepDone>));
        let parked2 = parked.clone();
        let step = fx.supervisor.wrap(
            StepBody::callback(move |_, done| {
                *parked2.lock() = Some(done);
                Ok(())
            }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&[], spy.handler());
        fx.clock.advance(Duration::from_millis(10));
        yield_all().await;

        let done = parked.lock().take().unwrap();
        assert!(!done.succeed());
        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::timeout(ms(10)))]
        );
    }

    #[tokio::test]
    async fn test_deferred_success() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::deferred(|_, _| async { Ok::<(), BoxError>(()) }),
            Subject::Step,
            ms(10),
        );

        assert_eq!(step(&[], spy.handler()), Invocation::Supervised);
        yield_all().await;
        assert_eq!(spy.signals(), vec![Signal::Success]);
        assert_eq!(fx.sink.ends(), 1);
    }

    #[tokio::test]
    async fn test_deferred_rejection() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::deferred(|_, _| async { Err::<(), BoxError>("gateway refused".into()) }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&[], spy.handler());
        yield_all().await;
        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::Rejected("gateway refused".into()))]
        );
    }

    #[tokio::test]
    async fn test_deferred_panic() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::deferred(|_, _| async {
                if true {
                    panic!("inside future");
                }
                Ok::<(), BoxError>(())
            }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&[], spy.handler());
        yield_all().await;
        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::Panicked("inside future".into()))]
        );
    }

    #[tokio::test]
    async fn test_deferred_slower_than_timeout() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let clock = fx.clock.clone();
        let step = fx.supervisor.wrap(
            StepBody::deferred(move |_, _| {
                let clock = clock.clone();
                async move {
                    clock.sleep(Duration::from_millis(20)).await;
                    Err::<(), BoxError>("too slow".into())
                }
            }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&[], spy.handler());
        yield_all().await;
        fx.clock.advance(Duration::from_millis(10));
        yield_all().await;
        fx.clock.advance(Duration::from_millis(10));
        yield_all().await;

        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::timeout(ms(10)))]
        );
    }

    #[tokio::test]
    async fn test_deferred_and_callback_both_signal() {
        let fx = fixture();
        let spy = HandlerSpy::new();
        let step = fx.supervisor.wrap(
            StepBody::deferred(|_, done| {
                done.pending();
                async { Ok::<(), BoxError>(()) }
            }),
            Subject::Step,
            ms(10),
        );

        let _ = step(&[], spy.handler());
        yield_all().await;
        assert_eq!(spy.signals(), vec![Signal::Pending]);
    }

    #[tokio::test]
    async fn test_each_call_gets_a_fresh_gate() {
        let fx = fixture();
        let step = fx.supervisor.wrap(
            StepBody::callback(|_, done| {
                done.succeed();
                Ok(())
            }),
            Subject::Step,
            ms(10),
        );

        let first = HandlerSpy::new();
        let second = HandlerSpy::new();
        let _ = step(&[], first.handler());
        let _ = step(&[], second.handler());

        assert!(first.was_called_times(1));
        assert!(second.was_called_times(1));
        assert_eq!(fx.sink.starts(), 2);
    }

    #[tokio::test]
    async fn test_hook_logs_hook_kind() {
        let fx = fixture();
        let step = fx.supervisor.wrap(
            StepBody::sync(|_| Ok(())),
            Subject::Hook(HookKind::Before),
            ms(10),
        );

        let _ = step(&[], HandlerSpy::new().handler());
        assert_eq!(
            fx.sink.lines()[0],
            "Before hook started (Feature: \"Checkout\", Scenario: \"Card payment\")"
        );
    }
}
