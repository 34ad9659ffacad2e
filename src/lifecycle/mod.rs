//! Names of the feature, scenario and step currently running.
//!
//! The host runner announces each feature, scenario and step before it
//! starts. [`LifecycleContext`] records those names so that log lines and
//! timeout reports can say where they came from. One context is shared by
//! every wrapper created from the same [`install`](crate::registry::install)
//! call; tests can build their own and set names directly.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Kind of hook a body is registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Runs before each matching scenario.
    Before,
    /// Runs after each matching scenario.
    After,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str("Before hook"),
            Self::After => f.write_str("After hook"),
        }
    }
}

/// What a wrapped body is, for naming purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// A step; named after the step announced by the host.
    Step,
    /// A hook; named after its kind.
    Hook(HookKind),
}

/// A lifecycle announcement from the host runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A feature is about to start.
    Feature(String),
    /// A scenario is about to start.
    Scenario(String),
    /// A step is about to start.
    Step(String),
}

/// Snapshot of the names in effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleNames {
    /// Current feature.
    pub feature: String,
    /// Current scenario.
    pub scenario: String,
    /// Current step.
    pub step: String,
}

impl LifecycleNames {
    /// Display name for `subject`: the step name, or the hook kind.
    #[must_use]
    pub fn name_of(&self, subject: Subject) -> String {
        match subject {
            Subject::Step => self.step.clone(),
            Subject::Hook(kind) => kind.to_string(),
        }
    }
}

/// Shared, updatable record of the current names.
///
/// Writes come only from host notifications, which the host serializes
/// ahead of the unit of work they announce.
#[derive(Debug, Clone, Default)]
pub struct LifecycleContext {
    names: Arc<RwLock<LifecycleNames>>,
}

impl LifecycleContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with the given names already set.
    #[must_use]
    pub fn with_names(
        feature: impl Into<String>,
        scenario: impl Into<String>,
        step: impl Into<String>,
    ) -> Self {
        Self {
            names: Arc::new(RwLock::new(LifecycleNames {
                feature: feature.into(),
                scenario: scenario.into(),
                step: step.into(),
            })),
        }
    }

    /// Apply an announcement.
    pub fn observe(&self, event: LifecycleEvent) {
        let mut names = self.names.write();
        match event {
            LifecycleEvent::Feature(name) => names.feature = name,
            LifecycleEvent::Scenario(name) => names.scenario = name,
            LifecycleEvent::Step(name) => names.step = name,
        }
    }

    /// Copy of the names in effect.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleNames {
        self.names.read().clone()
    }

    /// Display name for `subject` right now.
    #[must_use]
    pub fn name_of(&self, subject: Subject) -> String {
        self.names.read().name_of(subject)
    }
}
