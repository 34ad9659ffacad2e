// Spy accessors are often called only for their assertions
#![allow(clippy::must_use_candidate)]

//! Recording terminal handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Failure;
use crate::gate::{Signal, StepCallback};

/// A signal together with when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRecord {
    /// What was delivered.
    pub signal: Signal,
    /// When, relative to spy creation.
    pub timestamp: Duration,
}

struct SpyState {
    records: Mutex<Vec<SignalRecord>>,
    notify: Notify,
    created_at: Instant,
}

/// Records every signal delivered through the handlers it hands out.
///
/// Clones share the same record. Each call to [`handler`](Self::handler)
/// produces a fresh handler feeding this spy, so one spy can watch several
/// invocations.
#[derive(Clone)]
pub struct HandlerSpy {
    state: Arc<SpyState>,
}

impl Default for HandlerSpy {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerSpy {
    /// Create a spy with nothing recorded.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SpyState {
                records: Mutex::new(Vec::new()),
                notify: Notify::new(),
                created_at: Instant::now(),
            }),
        }
    }

    /// A handler that reports to this spy.
    pub fn handler(&self) -> Box<dyn StepCallback> {
        Box::new(SpyHandler {
            spy: self.clone(),
        })
    }

    /// All signals received, oldest first.
    pub fn signals(&self) -> Vec<Signal> {
        self.state
            .records
            .lock()
            .iter()
            .map(|r| r.signal.clone())
            .collect()
    }

    /// All records, with timestamps.
    pub fn records(&self) -> Vec<SignalRecord> {
        self.state.records.lock().clone()
    }

    /// Number of signals received.
    pub fn call_count(&self) -> usize {
        self.state.records.lock().len()
    }

    /// Returns `true` if exactly `n` signals were received.
    pub fn was_called_times(&self, n: usize) -> bool {
        self.call_count() == n
    }

    /// The most recent signal.
    pub fn last_signal(&self) -> Option<Signal> {
        self.state.records.lock().last().map(|r| r.signal.clone())
    }

    /// Failures received, in order.
    pub fn failures(&self) -> Vec<Failure> {
        self.signals()
            .into_iter()
            .filter_map(|s| match s {
                Signal::Failure(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least one signal has arrived and return the first.
    pub async fn first_signal(&self) -> Signal {
        loop {
            let notified = self.state.notify.notified();
            if let Some(record) = self.state.records.lock().first() {
                return record.signal.clone();
            }
            notified.await;
        }
    }

    fn record(&self, signal: Signal) {
        self.state.records.lock().push(SignalRecord {
            signal,
            timestamp: self.state.created_at.elapsed(),
        });
        self.state.notify.notify_waiters();
    }
}

impl std::fmt::Debug for HandlerSpy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSpy")
            .field("records", &*self.state.records.lock())
            .finish()
    }
}

struct SpyHandler {
    spy: HandlerSpy,
}

impl StepCallback for SpyHandler {
    fn succeed(self: Box<Self>) {
        self.spy.record(Signal::Success);
    }

    fn fail(self: Box<Self>, failure: Failure) {
        self.spy.record(Signal::Failure(failure));
    }

    fn pending(self: Box<Self>) {
        self.spy.record(Signal::Pending);
    }
}
