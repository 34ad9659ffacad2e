//! Start, end and timeout log lines.
//!
//! Wrappers report through a [`LogSink`]. The default, [`TracingSink`],
//! turns each [`LogEntry`] into a `tracing` event under the `stepguard`
//! target; [`init_file_logging`] installs a subscriber that writes those
//! events to the configured log file. Callers that want the lines elsewhere
//! pass their own sink to [`install`](crate::registry::install).
//!
//! The lines are informational and keep a fixed shape:
//!
//! ```text
//! I pay by card started (Feature: "Checkout", Scenario: "Card payment")
//! I pay by card ended (Feature: "Checkout", Scenario: "Card payment")
//! Timeout of 10 milliseconds was exceeded, scenario will fail. In step: "I pay by card"
//! ```

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt as tfmt, EnvFilter};

use crate::config::{GlobalOptions, TimeoutSetting};
use crate::error::{Error, Failure, Result};
use crate::lifecycle::LifecycleNames;

/// Target used for every event the default sink emits.
pub const LOG_TARGET: &str = "stepguard";

static FILE_LOGGING: OnceLock<()> = OnceLock::new();

/// One informational line about a guarded invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    /// The body is about to run.
    Started {
        /// Step name or hook kind.
        name: String,
        /// Current feature.
        feature: String,
        /// Current scenario.
        scenario: String,
    },
    /// The body returned without raising.
    Ended {
        /// Step name or hook kind.
        name: String,
        /// Current feature.
        feature: String,
        /// Current scenario.
        scenario: String,
    },
    /// The timer won the race.
    TimedOut {
        /// Step name or hook kind.
        name: String,
        /// The configured budget.
        timeout: TimeoutSetting,
    },
}

impl LogEntry {
    /// A start line for `name` in the context of `names`.
    #[must_use]
    pub fn started(name: impl Into<String>, names: &LifecycleNames) -> Self {
        Self::Started {
            name: name.into(),
            feature: names.feature.clone(),
            scenario: names.scenario.clone(),
        }
    }

    /// An end line for `name` in the context of `names`.
    #[must_use]
    pub fn ended(name: impl Into<String>, names: &LifecycleNames) -> Self {
        Self::Ended {
            name: name.into(),
            feature: names.feature.clone(),
            scenario: names.scenario.clone(),
        }
    }

    /// A timeout line.
    #[must_use]
    pub fn timed_out(name: impl Into<String>, timeout: TimeoutSetting) -> Self {
        Self::TimedOut {
            name: name.into(),
            timeout,
        }
    }

    /// Name of the step or hook this entry is about.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Started { name, .. } | Self::Ended { name, .. } | Self::TimedOut { name, .. } => {
                name
            }
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started {
                name,
                feature,
                scenario,
            } => write!(
                f,
                "{name} started (Feature: \"{feature}\", Scenario: \"{scenario}\")"
            ),
            Self::Ended {
                name,
                feature,
                scenario,
            } => write!(
                f,
                "{name} ended (Feature: \"{feature}\", Scenario: \"{scenario}\")"
            ),
            Self::TimedOut { name, timeout } => {
                write!(f, "{} In step: \"{name}\"", Failure::timeout(*timeout))
            }
        }
    }
}

/// Destination for [`LogEntry`] lines.
pub trait LogSink: Send + Sync {
    /// Record one entry.
    fn record(&self, entry: &LogEntry);
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn record(&self, entry: &LogEntry) {
        (**self).record(entry);
    }
}

/// Emits entries as `tracing` events at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, entry: &LogEntry) {
        match entry {
            LogEntry::Started { name, .. } | LogEntry::Ended { name, .. } => {
                tracing::info!(target: LOG_TARGET, step = %name, "{entry}");
            }
            LogEntry::TimedOut { name, timeout } => {
                tracing::info!(
                    target: LOG_TARGET,
                    step = %name,
                    timeout_ms = %timeout,
                    "{entry}"
                );
            }
        }
    }
}

/// Keeps every entry in memory.
///
/// ```rust
/// use stepguard::config::TimeoutSetting;
/// use stepguard::logging::{LogEntry, LogSink, RecordingSink};
///
/// let sink = RecordingSink::new();
/// sink.record(&LogEntry::timed_out("a step", TimeoutSetting::from_millis(10)));
/// assert_eq!(sink.timeouts(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries rendered as log lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries.lock().iter().map(ToString::to_string).collect()
    }

    /// Number of start lines.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.count(|e| matches!(e, LogEntry::Started { .. }))
    }

    /// Number of end lines.
    #[must_use]
    pub fn ends(&self) -> usize {
        self.count(|e| matches!(e, LogEntry::Ended { .. }))
    }

    /// Number of timeout lines.
    #[must_use]
    pub fn timeouts(&self) -> usize {
        self.count(|e| matches!(e, LogEntry::TimedOut { .. }))
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn count(&self, pred: impl Fn(&LogEntry) -> bool) -> usize {
        self.entries.lock().iter().filter(|e| pred(e)).count()
    }
}

impl LogSink for RecordingSink {
    fn record(&self, entry: &LogEntry) {
        self.entries.lock().push(entry.clone());
    }
}

/// Install a global subscriber writing to `options.log_file`.
///
/// `RUST_LOG` overrides `options.log_level`. Only the first call in a
/// process installs anything; later calls return `Ok(())`.
pub fn init_file_logging(options: &GlobalOptions) -> Result<()> {
    if FILE_LOGGING.get().is_some() {
        return Ok(());
    }

    let path: &Path = &options.log_file;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::logging(e.to_string()))?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::logging(format!("failed to open {}: {e}", path.display())))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.log_level))
        .map_err(|e| Error::logging(format!("invalid log level: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| Error::logging(e.to_string()))?;

    let _ = FILE_LOGGING.set(());
    Ok(())
}
