//! The timer side of the timeout race.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::clock::TimeSource;
use crate::config::TimeoutSetting;
use crate::error::Failure;
use crate::lifecycle::{LifecycleContext, Subject};
use crate::logging::{LogEntry, LogSink};

use super::{CompletionGate, Signal};

/// What the timer needs to report a timeout.
#[derive(Clone)]
pub struct TimeoutNotice {
    /// Where the timeout line goes.
    pub sink: Arc<dyn LogSink>,
    /// Names in effect when the timer fires.
    pub lifecycle: LifecycleContext,
    /// Whether the guarded body is a step or a hook.
    pub subject: Subject,
}

/// Start the timer for `gate` on `runtime`.
///
/// If `timeout` elapses on `clock` before any other signal reaches the gate,
/// a timeout line is logged and the gate's handler receives
/// [`Failure::TimeoutExceeded`]. Any earlier signal aborts the timer.
pub fn arm_timeout(
    gate: &CompletionGate,
    timeout: TimeoutSetting,
    clock: &dyn TimeSource,
    notice: TimeoutNotice,
    runtime: &Handle,
) {
    let sleep = clock.sleep(timeout.duration());
    let target = gate.clone();
    let task = runtime.spawn(async move {
        sleep.await;
        // Claim before logging so a body finishing right now gets no timeout line.
        let Some(handler) = target.claim() else {
            return;
        };
        let name = notice.lifecycle.name_of(notice.subject);
        notice.sink.record(&LogEntry::timed_out(name, timeout));
        Signal::Failure(Failure::timeout(timeout)).deliver(handler);
    });
    gate.set_timer(task.abort_handle());
}
