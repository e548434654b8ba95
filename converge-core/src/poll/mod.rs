//! Poll - Wait for a remote resource to converge
//!
//! The poller repeatedly invokes a [`Probe`], classifies each observed
//! status label as pending or target, and returns once a target label is
//! reached, the probe fails, the timeout elapses, or the wait is cancelled.
//!
//! # Example
//!
//! ```ignore
//! use converge_core::poll::{Observation, PollSpec, Poller};
//!
//! let spec = PollSpec::new(["provisioning"], ["active"], Duration::from_secs(600));
//! let converged = Poller::new(spec)
//!     .poll(move || {
//!         let client = client.clone();
//!         async move {
//!             let cluster = client.get_cluster(&id).await?;
//!             Ok(Observation::present(cluster.state.clone(), cluster))
//!         }
//!     })
//!     .await?;
//! ```

mod error;
mod poller;
mod probe;
mod spec;
mod state;

pub use error::{PollError, PollResult, SpecError};
pub use poller::{Attempt, Classification, Converged, Poller, poll};
pub use probe::{BoxError, Observation, Probe, ProbeResult};
pub use spec::{
    DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX, DEFAULT_DELAY, DEFAULT_MIN_POLL_INTERVAL,
    DEFAULT_NOT_FOUND_CHECKS, PollInterval, PollSpec, UnclassifiedPolicy,
};
pub use state::{InvalidTransition, PollState};
