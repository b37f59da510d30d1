//! Error types for the monitor
//!
//! Per-target source errors and sink errors are recovered inside a cycle;
//! configuration errors are fatal at startup.

use std::time::Duration;

/// Failure to obtain a sample for one target
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The target could not be read this cycle
    #[error("source unavailable for target '{target}': {reason}")]
    Unavailable { target: String, reason: String },

    /// The adapter did not answer within the configured timeout
    #[error("source timed out for target '{target}' after {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

impl SourceError {
    pub fn unavailable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            SourceError::Unavailable { target, .. } | SourceError::Timeout { target, .. } => {
                target
            }
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable { .. } => "unavailable",
            SourceError::Timeout { .. } => "timeout",
        }
    }
}

/// Failure to deliver an alert to a notification sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink '{sink}' failed: {reason}")]
    Failure { sink: String, reason: String },

    #[error("sink HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl SinkError {
    pub fn failure(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        SinkError::Failure {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

/// Invalid monitor configuration, reported before the scheduler starts
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: String, reason: String },

    #[error("invalid configuration: rule '{rule}' matches no registered target")]
    UnmatchedRule { rule: String },

    #[error("invalid configuration: duplicate {what} id '{id}'")]
    Duplicate { what: &'static str, id: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Scheduler lifecycle errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler interval must be greater than zero and at most one day")]
    InvalidInterval,
}
