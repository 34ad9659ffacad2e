//! Virtual sleeps.

use pin_project::{pin_project, pinned_drop};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use super::MockClock;

/// Pending sleeps ordered by deadline, then by registration order.
#[derive(Debug, Default)]
pub(crate) struct SleepQueue {
    pending: BTreeMap<(Duration, u64), Option<Waker>>,
    next_id: u64,
}

impl SleepQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, deadline: Duration) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert((deadline, id), None);
        id
    }

    fn set_waker(&mut self, key: (Duration, u64), waker: &Waker) {
        if let Some(slot) = self.pending.get_mut(&key) {
            match slot {
                Some(existing) if existing.will_wake(waker) => {}
                _ => *slot = Some(waker.clone()),
            }
        }
    }

    fn remove(&mut self, key: (Duration, u64)) {
        self.pending.remove(&key);
    }

    /// Wake every sleep whose deadline is at or before `now`.
    ///
    /// Expired entries stay queued until their future observes the deadline,
    /// so a sleep that has not been polled yet still completes.
    pub(crate) fn wake_expired(&mut self, now: Duration) {
        for waker in self
            .pending
            .range_mut(..=(now, u64::MAX))
            .filter_map(|(_, waker)| waker.take())
        {
            waker.wake();
        }
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// A future that completes when a [`MockClock`] reaches its deadline.
///
/// Created by [`MockClock::sleep`]. The sleep is queued on creation, so
/// advancing the clock before the first poll still counts.
#[pin_project(PinnedDrop)]
#[derive(Debug)]
pub struct MockSleep {
    clock: MockClock,
    deadline: Duration,
    id: u64,
    done: bool,
}

impl MockSleep {
    pub(crate) fn new(clock: MockClock, duration: Duration) -> Self {
        let deadline = clock.now() + duration;
        let id = clock.inner.sleeps.lock().register(deadline);
        Self {
            clock,
            deadline,
            id,
            done: false,
        }
    }

}

impl Future for MockSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let key = (*this.deadline, *this.id);
        // Time is read under the queue lock: an advance either lands before
        // the read, or wakes the waker stored here.
        let mut sleeps = this.clock.inner.sleeps.lock();
        if this.clock.now() >= *this.deadline {
            sleeps.remove(key);
            *this.done = true;
            Poll::Ready(())
        } else {
            sleeps.set_waker(key, cx.waker());
            Poll::Pending
        }
    }
}

#[pinned_drop]
impl PinnedDrop for MockSleep {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if !*this.done {
            this.clock
                .inner
                .sleeps
                .lock()
                .remove((*this.deadline, *this.id));
        }
    }
}
