//! Probe contract: one read-only status fetch per call

use std::future::Future;

use crate::provider::BoxFuture;

/// Error type a probe may fail with
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What one probe call saw
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    /// The remote payload; `None` when the remote object does not exist
    pub value: Option<T>,
    /// Status label used for classification
    pub label: String,
    /// Why the object could not be read, e.g. the transient error behind a retry
    pub detail: Option<String>,
}

impl<T> Observation<T> {
    /// The object exists and reports `label`
    pub fn present(label: impl Into<String>, value: T) -> Self {
        Self {
            value: Some(value),
            label: label.into(),
            detail: None,
        }
    }

    /// The object was not found; `label` still takes part in classification
    pub fn absent(label: impl Into<String>) -> Self {
        Self {
            value: None,
            label: label.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// Outcome of one probe call
pub type ProbeResult<T> = Result<Observation<T>, BoxError>;

/// A read-only status check against a remote resource
///
/// The poller never calls `probe` concurrently with itself. Probes that need
/// to tell "not there yet" apart from a real failure should return an absent
/// or pending observation rather than an error: errors end the run.
pub trait Probe: Send {
    type Value: Send;

    fn probe(&mut self) -> BoxFuture<'_, ProbeResult<Self::Value>>;
}

impl<F, Fut, T> Probe for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ProbeResult<T>> + Send + 'static,
    T: Send,
{
    type Value = T;

    fn probe(&mut self) -> BoxFuture<'_, ProbeResult<T>> {
        Box::pin((self)())
    }
}
