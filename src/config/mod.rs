//! Timeout configuration.
//!
//! [`GlobalOptions`] are fixed once at wiring time. Per-definition overrides
//! arrive as a loosely typed [`TimeoutValue`] and are validated by
//! [`resolve`] into a [`TimeoutSetting`] before anything is registered.
//!
//! # Example
//!
//! ```rust
//! use stepguard::config::{resolve, TimeoutValue};
//! use std::time::Duration;
//!
//! let default = Duration::from_millis(1000);
//!
//! let setting = resolve(None, default).unwrap();
//! assert_eq!(setting.duration(), default);
//!
//! let setting = resolve(Some(&TimeoutValue::from(10_u64)), default).unwrap();
//! assert_eq!(setting.to_string(), "10");
//!
//! assert!(resolve(Some(&TimeoutValue::from("soon")), default).is_err());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Budget used when neither the options nor the definition name one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Log file written by the default sink.
pub const DEFAULT_LOG_FILE: &str = "stepguard.log";

/// A timeout override as authored, before validation.
///
/// Only the numeric variants are valid; the others exist so that a bad
/// value coming from a config file or a test definition can be reported
/// instead of silently coerced.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimeoutValue {
    /// Whole milliseconds.
    Integer(i64),
    /// Fractional milliseconds.
    Float(f64),
    /// Text, never accepted.
    Text(String),
    /// Boolean, never accepted.
    Flag(bool),
}

impl fmt::Display for TimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

impl From<u64> for TimeoutValue {
    fn from(millis: u64) -> Self {
        Self::Integer(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

impl From<i64> for TimeoutValue {
    fn from(millis: i64) -> Self {
        Self::Integer(millis)
    }
}

impl From<f64> for TimeoutValue {
    fn from(millis: f64) -> Self {
        Self::Float(millis)
    }
}

impl From<Duration> for TimeoutValue {
    fn from(duration: Duration) -> Self {
        Self::from(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<&str> for TimeoutValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TimeoutValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<bool> for TimeoutValue {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

/// A validated timeout budget.
///
/// Keeps the milliseconds as authored next to the duration, so timeout
/// messages read back the number that was configured. `millis` is always
/// finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutSetting {
    timeout: Duration,
    millis: f64,
}

impl TimeoutSetting {
    /// Creates a setting from a duration.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            millis: timeout.as_nanos() as f64 / 1_000_000.0,
        }
    }

    /// Creates a setting from whole milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_millis(millis: u64) -> Self {
        Self {
            timeout: Duration::from_millis(millis),
            millis: millis as f64,
        }
    }

    fn from_fractional_millis(millis: f64) -> Option<Self> {
        let timeout = Duration::try_from_secs_f64(millis / 1000.0).ok()?;
        Some(Self { timeout, millis })
    }

    /// The budget.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.timeout
    }

    /// The budget in milliseconds, as configured.
    #[must_use]
    pub fn millis(&self) -> f64 {
        self.millis
    }
}

/// Renders the configured milliseconds, without a fraction for whole values.
impl fmt::Display for TimeoutSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.millis)
    }
}

impl Default for TimeoutSetting {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl TryFrom<&TimeoutValue> for TimeoutSetting {
    type Error = Error;

    fn try_from(value: &TimeoutValue) -> Result<Self> {
        match *value {
            TimeoutValue::Integer(millis) => u64::try_from(millis)
                .map(Self::from_millis)
                .map_err(|_| Error::negative_timeout(value.to_string())),
            TimeoutValue::Float(millis) if millis.is_nan() => {
                Err(Error::invalid_timeout(value.to_string()))
            }
            TimeoutValue::Float(millis) if millis < 0.0 => {
                Err(Error::negative_timeout(value.to_string()))
            }
            TimeoutValue::Float(millis) => Self::from_fractional_millis(millis)
                .ok_or_else(|| Error::invalid_timeout(value.to_string())),
            TimeoutValue::Text(_) | TimeoutValue::Flag(_) => {
                Err(Error::invalid_timeout(value.to_string()))
            }
        }
    }
}

/// Resolves the effective budget for one definition.
///
/// An absent override falls back to `default`. A present one must be a
/// non-negative number.
pub fn resolve(per_call: Option<&TimeoutValue>, default: Duration) -> Result<TimeoutSetting> {
    match per_call {
        None => Ok(TimeoutSetting::new(default)),
        Some(value) => TimeoutSetting::try_from(value),
    }
}

/// Process-wide options captured when the supervisor is wired to a runner.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalOptions {
    /// Budget for definitions that do not override it.
    pub default_timeout: Duration,
    /// Where the default sink writes.
    pub log_file: PathBuf,
    /// Level for the default sink; `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    timeout_millis: Option<TimeoutValue>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
}

impl GlobalOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default budget.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the default budget in milliseconds.
    #[must_use]
    pub fn timeout_millis(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    /// Set the log file used by the default sink.
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    /// Set the level used by the default sink.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Parses options from TOML.
    ///
    /// ```rust
    /// use stepguard::config::GlobalOptions;
    ///
    /// let options = GlobalOptions::from_toml_str("timeout_millis = 250").unwrap();
    /// assert_eq!(options.default_timeout.as_millis(), 250);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawOptions = toml::from_str(text)?;
        let mut options = Self::default();
        if let Some(value) = raw.timeout_millis.as_ref() {
            options.default_timeout = TimeoutSetting::try_from(value)?.duration();
        }
        if let Some(path) = raw.log_file {
            options.log_file = path;
        }
        if let Some(level) = raw.log_level {
            options.log_level = level;
        }
        Ok(options)
    }

    /// Reads and parses options from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
