//! In-memory host runner.

use parking_lot::Mutex;

use crate::invocation::{HostStepFn, Invocation};
use crate::lifecycle::{HookKind, LifecycleEvent};
use crate::registry::{HostRunner, LifecycleListener};

use super::HandlerSpy;

/// Outcome of running one registered step or hook.
#[derive(Debug, Clone)]
pub struct StepRun {
    /// What the wrapped function returned.
    pub invocation: Invocation,
    /// The handler the host passed in.
    pub spy: HandlerSpy,
}

struct Hook {
    kind: HookKind,
    selectors: Vec<String>,
    body: HostStepFn,
}

#[derive(Default)]
struct Listeners {
    feature: Vec<LifecycleListener>,
    scenario: Vec<LifecycleListener>,
    step: Vec<LifecycleListener>,
}

/// A [`HostRunner`] that keeps registrations in memory and runs them on
/// demand.
///
/// Steps are looked up by exact pattern text; there is no pattern matching.
#[derive(Default)]
pub struct MockRunner {
    steps: Mutex<Vec<(String, HostStepFn)>>,
    hooks: Mutex<Vec<Hook>>,
    listeners: Mutex<Listeners>,
}

impl MockRunner {
    /// Create a runner with nothing registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered step patterns, in registration order.
    #[must_use]
    pub fn step_patterns(&self) -> Vec<String> {
        self.steps.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Number of hooks of `kind`.
    #[must_use]
    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.hooks.lock().iter().filter(|h| h.kind == kind).count()
    }

    /// Selectors of each hook of `kind`, in registration order.
    #[must_use]
    pub fn hook_selectors(&self, kind: HookKind) -> Vec<Vec<String>> {
        self.hooks
            .lock()
            .iter()
            .filter(|h| h.kind == kind)
            .map(|h| h.selectors.clone())
            .collect()
    }

    /// Fire a lifecycle notification. Returns `true` if every listener
    /// completed its handler.
    pub fn announce(&self, event: LifecycleEvent) -> bool {
        let (name, listeners) = {
            let listeners = self.listeners.lock();
            match event {
                LifecycleEvent::Feature(name) => (name, listeners.feature.clone()),
                LifecycleEvent::Scenario(name) => (name, listeners.scenario.clone()),
                LifecycleEvent::Step(name) => (name, listeners.step.clone()),
            }
        };
        let spy = HandlerSpy::new();
        for listener in &listeners {
            listener(&name, spy.handler());
        }
        spy.was_called_times(listeners.len())
    }

    /// Announce and run the step registered under `pattern`.
    ///
    /// Returns `None` if no step has that pattern.
    pub fn run_step(&self, pattern: &str, args: &[String]) -> Option<StepRun> {
        let body = self
            .steps
            .lock()
            .iter()
            .find(|(p, _)| p == pattern)
            .map(|(_, body)| body.clone())?;
        self.announce(LifecycleEvent::Step(pattern.to_string()));
        let spy = HandlerSpy::new();
        let invocation = body(args, spy.handler());
        Some(StepRun { invocation, spy })
    }

    /// Run every hook of `kind`, in registration order.
    pub fn run_hooks(&self, kind: HookKind) -> Vec<StepRun> {
        let bodies: Vec<HostStepFn> = self
            .hooks
            .lock()
            .iter()
            .filter(|h| h.kind == kind)
            .map(|h| h.body.clone())
            .collect();
        bodies
            .into_iter()
            .map(|body| {
                let spy = HandlerSpy::new();
                let invocation = body(&[], spy.handler());
                StepRun { invocation, spy }
            })
            .collect()
    }

    fn push_hook(&self, kind: HookKind, selectors: Vec<String>, body: HostStepFn) {
        self.hooks.lock().push(Hook {
            kind,
            selectors,
            body,
        });
    }
}

impl HostRunner for MockRunner {
    fn define_step(&self, pattern: &str, step: HostStepFn) {
        self.steps.lock().push((pattern.to_string(), step));
    }

    fn before(&self, selectors: Vec<String>, hook: HostStepFn) {
        self.push_hook(HookKind::Before, selectors, hook);
    }

    fn after(&self, selectors: Vec<String>, hook: HostStepFn) {
        self.push_hook(HookKind::After, selectors, hook);
    }

    fn before_feature(&self, listener: LifecycleListener) {
        self.listeners.lock().feature.push(listener);
    }

    fn before_scenario(&self, listener: LifecycleListener) {
        self.listeners.lock().scenario.push(listener);
    }

    fn before_step(&self, listener: LifecycleListener) {
        self.listeners.lock().step.push(listener);
    }
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner")
            .field("steps", &self.step_patterns())
            .field("hooks", &self.hooks.lock().len())
            .finish()
    }
}
