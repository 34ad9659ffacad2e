//! Error definitions
//!
//! Two families live here. [`Error`] is what escapes to the caller: it only
//! ever surfaces while wiring or registering, before any body runs.
//! [`Failure`] is what a step or hook reports through the host's terminal
//! handler; it never escapes the invocation wrapper as an `Err`.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::TimeoutSetting;

/// Boxed error returned by step and hook bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for stepguard
#[derive(Error, Debug)]
pub enum Error {
    /// A timeout override that is not a number.
    #[error("The step timeout must be a number, {value} is not a number!")]
    InvalidTimeout {
        /// The offending value as it was supplied.
        value: String,
    },

    /// A numeric timeout override below zero.
    #[error("The step timeout must not be negative, got {value}")]
    NegativeTimeout {
        /// The offending value as it was supplied.
        value: String,
    },

    /// Wiring happened outside a tokio runtime, so timers have nowhere to run.
    #[error("No tokio runtime to run step timers on: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// Configuration text could not be parsed.
    #[error("Invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be read.
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigRead {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Log sink could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl Error {
    /// Create an invalid timeout error.
    #[must_use]
    pub fn invalid_timeout(value: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            value: value.into(),
        }
    }

    /// Create a negative timeout error.
    #[must_use]
    pub fn negative_timeout(value: impl Into<String>) -> Self {
        Self::NegativeTimeout {
            value: value.into(),
        }
    }

    /// Create a logging error.
    #[must_use]
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Why a step or hook failed.
///
/// Every runtime failure is turned into one of these and handed to the
/// host's terminal handler; the host reports it like any other failed step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The body returned an error synchronously.
    #[error("{0}")]
    Body(String),

    /// The body panicked, either synchronously or inside its future.
    #[error("step panicked: {0}")]
    Panicked(String),

    /// The deferred computation returned by the body settled with an error.
    #[error("{0}")]
    Rejected(String),

    /// No completion signal arrived within the configured budget.
    #[error("Timeout of {millis} milliseconds was exceeded, scenario will fail.")]
    TimeoutExceeded {
        /// The configured budget in milliseconds, as authored.
        millis: String,
    },

    /// Failure reported explicitly by the body through its callback.
    #[error("{0}")]
    Reported(String),
}

impl Failure {
    /// Create a failure from an error a body returned synchronously.
    #[must_use]
    pub fn body(err: &BoxError) -> Self {
        Self::Body(err.to_string())
    }

    /// Create a failure from an error a deferred computation settled with.
    #[must_use]
    pub fn rejected(err: &BoxError) -> Self {
        Self::Rejected(err.to_string())
    }

    /// Create a failure from a caught panic payload.
    #[must_use]
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }

    /// Create a timeout failure for the given budget.
    #[must_use]
    pub fn timeout(budget: TimeoutSetting) -> Self {
        Self::TimeoutExceeded {
            millis: budget.to_string(),
        }
    }

    /// Returns `true` if this failure was synthesized by the timeout race.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutValue;

    #[test]
    fn test_timeout_message() {
        let failure = Failure::timeout(TimeoutSetting::from_millis(10));
        assert_eq!(
            failure.to_string(),
            "Timeout of 10 milliseconds was exceeded, scenario will fail."
        );
        assert!(failure.is_timeout());
    }

    #[test]
    fn test_timeout_message_keeps_fraction() {
        let budget = TimeoutSetting::try_from(&TimeoutValue::Float(2.5)).unwrap();
        assert_eq!(
            Failure::timeout(budget).to_string(),
            "Timeout of 2.5 milliseconds was exceeded, scenario will fail."
        );
    }

    #[test]
    fn test_invalid_timeout_message() {
        let err = Error::invalid_timeout("\"soon\"");
        assert_eq!(
            err.to_string(),
            "The step timeout must be a number, \"soon\" is not a number!"
        );
    }

    #[test]
    fn test_body_failure_keeps_message() {
        let err: BoxError = "disk on fire".into();
        assert_eq!(Failure::body(&err).to_string(), "disk on fire");
        assert_eq!(Failure::rejected(&err), Failure::Rejected("disk on fire".into()));
    }

    #[test]
    fn test_panicked_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(Failure::panicked(&*boxed), Failure::Panicked("boom".into()));

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(Failure::panicked(&*boxed), Failure::Panicked("bang".into()));

        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert!(matches!(Failure::panicked(&*boxed), Failure::Panicked(_)));
    }
}
