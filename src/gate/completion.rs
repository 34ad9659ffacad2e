//! The completion gate and the handler it guards.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::error::{BoxError, Failure};

/// The host runner's terminal handler for one invocation.
///
/// Each capability consumes the handler, so a host implementation can never
/// be told twice. The gate makes sure only one of them is ever reached.
pub trait StepCallback: Send + 'static {
    /// The step passed.
    fn succeed(self: Box<Self>);

    /// The step failed.
    fn fail(self: Box<Self>, failure: Failure);

    /// The step is not implemented yet.
    fn pending(self: Box<Self>);
}

/// A terminal signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Completed successfully.
    Success,
    /// Failed with the given reason.
    Failure(Failure),
    /// Marked pending.
    Pending,
}

impl Signal {
    /// Hand this signal to `handler`.
    pub fn deliver(self, handler: Box<dyn StepCallback>) {
        match self {
            Self::Success => handler.succeed(),
            Self::Failure(failure) => handler.fail(failure),
            Self::Pending => handler.pending(),
        }
    }

    /// The failure, if this is one.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

struct GateState {
    handler: Option<Box<dyn StepCallback>>,
    timer: Option<AbortHandle>,
}

/// Forwards at most one signal to the wrapped handler.
///
/// Clones share the same state. Any signal cancels the armed timer, whether
/// it is forwarded or not.
///
/// ```rust
/// use stepguard::error::Failure;
/// use stepguard::gate::{CompletionGate, Signal};
/// use stepguard::mock::HandlerSpy;
///
/// let spy = HandlerSpy::new();
/// let gate = CompletionGate::new(spy.handler());
///
/// assert!(gate.succeed());
/// assert!(!gate.fail(Failure::Reported("late".into())));
/// assert!(!gate.pending());
///
/// assert_eq!(spy.signals(), vec![Signal::Success]);
/// ```
#[derive(Clone)]
pub struct CompletionGate {
    state: Arc<Mutex<GateState>>,
}

impl CompletionGate {
    /// Wrap `handler`. No timer is armed yet.
    #[must_use]
    pub fn new(handler: Box<dyn StepCallback>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                handler: Some(handler),
                timer: None,
            })),
        }
    }

    /// Forward a success if nothing was forwarded before.
    pub fn succeed(&self) -> bool {
        self.deliver(Signal::Success)
    }

    /// Forward a failure if nothing was forwarded before.
    pub fn fail(&self, failure: Failure) -> bool {
        self.deliver(Signal::Failure(failure))
    }

    /// Forward a pending mark if nothing was forwarded before.
    pub fn pending(&self) -> bool {
        self.deliver(Signal::Pending)
    }

    /// Forward `signal` if this is the first one; returns whether it was.
    pub fn deliver(&self, signal: Signal) -> bool {
        // The handler runs outside the lock so it may touch the gate again.
        match self.claim() {
            Some(handler) => {
                signal.deliver(handler);
                true
            }
            None => false,
        }
    }

    /// Returns `true` once any signal has arrived.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.lock().handler.is_none()
    }

    /// Take the handler if nothing has arrived yet, and cancel the timer.
    ///
    /// A caller that gets `Some` owns the outcome; every later signal is
    /// dropped.
    pub(crate) fn claim(&self) -> Option<Box<dyn StepCallback>> {
        let (handler, timer) = {
            let mut state = self.state.lock();
            (state.handler.take(), state.timer.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        handler
    }

    /// Close the gate without telling the handler anything.
    ///
    /// Used when the host reads a synchronous result itself.
    pub(crate) fn release(&self) {
        drop(self.claim());
    }

    pub(crate) fn set_timer(&self, timer: AbortHandle) {
        let mut state = self.state.lock();
        if state.handler.is_none() {
            timer.abort();
        } else {
            state.timer = Some(timer);
        }
    }

    #[cfg(test)]
    pub(crate) fn has_timer(&self) -> bool {
        self.state.lock().timer.is_some()
    }
}

impl fmt::Debug for CompletionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CompletionGate")
            .field("resolved", &state.handler.is_none())
            .field("timer_armed", &state.timer.is_some())
            .finish()
    }
}

/// The callback a body receives in place of the host's handler.
///
/// Cheap to clone; every clone feeds the same gate, so calling it more than
/// once, or from a task the body spawned, is harmless.
#[derive(Clone, Debug)]
pub struct StepDone {
    gate: CompletionGate,
}

impl StepDone {
    pub(crate) fn new(gate: CompletionGate) -> Self {
        Self { gate }
    }

    /// Report success.
    pub fn succeed(&self) -> bool {
        self.gate.succeed()
    }

    /// Report failure with `reason`.
    pub fn fail(&self, reason: impl Into<BoxError>) -> bool {
        let reason: BoxError = reason.into();
        self.gate.fail(Failure::Reported(reason.to_string()))
    }

    /// Mark the step pending.
    pub fn pending(&self) -> bool {
        self.gate.pending()
    }

    /// Returns `true` once the invocation has been resolved by anyone.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.gate.is_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::HandlerSpy;

    #[test]
    fn test_first_signal_wins() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());

        assert!(gate.fail(Failure::Body("first".into())));
        assert!(!gate.succeed());
        assert!(!gate.pending());
        assert!(!gate.fail(Failure::Body("second".into())));

        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::Body("first".into()))]
        );
    }

    #[test]
    fn test_pending_is_forwarded() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());
        assert!(gate.pending());
        assert!(gate.is_resolved());
        assert_eq!(spy.signals(), vec![Signal::Pending]);
    }

    #[test]
    fn test_clones_share_resolution() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());
        let other = gate.clone();

        assert!(other.succeed());
        assert!(gate.is_resolved());
        assert!(!gate.succeed());
        assert!(spy.was_called_times(1));
    }

    #[test]
    fn test_release_is_silent() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());
        gate.release();

        assert!(gate.is_resolved());
        assert!(!gate.succeed());
        assert!(spy.signals().is_empty());
    }

    #[test]
    fn test_claim_shuts_out_later_signals() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());

        let handler = gate.claim().unwrap();
        assert!(gate.claim().is_none());
        assert!(!gate.succeed());
        assert!(spy.signals().is_empty());

        Signal::Pending.deliver(handler);
        assert_eq!(spy.signals(), vec![Signal::Pending]);
    }

    #[test]
    fn test_claim_after_signal_is_empty() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());
        gate.succeed();
        assert!(gate.claim().is_none());
    }

    #[test]
    fn test_step_done_reports_through_gate() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());
        let done = StepDone::new(gate.clone());

        assert!(done.fail("card declined"));
        assert!(done.is_resolved());
        assert!(!done.succeed());
        assert_eq!(
            spy.signals(),
            vec![Signal::Failure(Failure::Reported("card declined".into()))]
        );
    }

    #[tokio::test]
    async fn test_signal_cancels_timer() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());

        let task = tokio::spawn(futures::future::pending::<()>());
        gate.set_timer(task.abort_handle());
        assert!(gate.has_timer());

        gate.succeed();
        assert!(!gate.has_timer());
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_timer_set_after_resolution_is_cancelled() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());
        gate.succeed();

        let task = tokio::spawn(futures::future::pending::<()>());
        gate.set_timer(task.abort_handle());
        assert!(!gate.has_timer());
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_concurrent_signals_deliver_once() {
        use std::thread;

        for _ in 0..50 {
            let spy = HandlerSpy::new();
            let gate = CompletionGate::new(spy.handler());

            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let gate = gate.clone();
                    thread::spawn(move || {
                        if i % 2 == 0 {
                            gate.succeed()
                        } else {
                            gate.fail(Failure::Body(format!("thread {i}")))
                        }
                    })
                })
                .collect();

            let delivered = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|d| *d)
                .count();

            assert_eq!(delivered, 1);
            assert!(spy.was_called_times(1));
        }
    }

    #[test]
    fn test_debug_shows_state() {
        let spy = HandlerSpy::new();
        let gate = CompletionGate::new(spy.handler());
        assert!(format!("{gate:?}").contains("resolved: false"));
        gate.pending();
        assert!(format!("{gate:?}").contains("resolved: true"));
    }
}
