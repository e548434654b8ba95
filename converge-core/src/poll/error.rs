//! Poll error types

use std::time::Duration;

use thiserror::Error;

use super::probe::BoxError;

/// Invalid poll specification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("continuous target occurrence must be at least 1")]
    ZeroOccurrence,

    #[error("labels are both pending and target: {}", .0.join(", "))]
    OverlappingLabels(Vec<String>),
}

/// Errors that end a convergence run
#[derive(Debug, Error)]
pub enum PollError {
    /// The poll configuration was rejected before polling started
    #[error("invalid poll spec: {0}")]
    InvalidSpec(#[from] SpecError),

    /// The probe itself failed; the source is the probe's error, untouched
    #[error("{0}")]
    Probe(#[source] BoxError),

    /// The timeout elapsed before a target label was reached
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
        .target.join(", "),
        .last_label.as_deref().unwrap_or("none"),
        .timeout
    )]
    Timeout {
        timeout: Duration,
        elapsed: Duration,
        target: Vec<String>,
        last_label: Option<String>,
        /// Debug rendering of the last observed value
        last_value: Option<String>,
    },

    /// The probe reported a label outside the pending and target sets
    #[error(
        "unexpected state '{label}', wanted target '{}'",
        .target.join(", ")
    )]
    UnclassifiedStatus {
        label: String,
        pending: Vec<String>,
        target: Vec<String>,
    },

    /// The remote object stayed absent for too many consecutive probes
    #[error(
        "couldn't find resource ({checks} retries){}",
        .last_detail.as_ref().map(|d| format!(", last error: {}", d)).unwrap_or_default()
    )]
    NotFound {
        checks: u32,
        /// Detail of the last absent observation, if the probe gave one
        last_detail: Option<String>,
    },

    /// The wait was cancelled from outside
    #[error(
        "wait cancelled (last state: '{}')",
        .last_label.as_deref().unwrap_or("none")
    )]
    Cancelled { last_label: Option<String> },
}

impl PollError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }

    /// Take back the probe's own error, if that is what ended the run
    pub fn into_probe_error(self) -> Option<BoxError> {
        match self {
            PollError::Probe(e) => Some(e),
            _ => None,
        }
    }

    /// Last label seen before the run ended, when one is known
    pub fn last_label(&self) -> Option<&str> {
        match self {
            PollError::Timeout { last_label, .. } | PollError::Cancelled { last_label } => {
                last_label.as_deref()
            }
            PollError::UnclassifiedStatus { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// Result type for poll operations
pub type PollResult<T> = Result<T, PollError>;
