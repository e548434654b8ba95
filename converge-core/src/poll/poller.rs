//! The convergence poller

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::error::{PollError, PollResult};
use super::probe::{Observation, Probe};
use super::spec::{PollSpec, UnclassifiedPolicy};
use super::state::PollState;

/// How one observation was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Target,
    Pending,
    /// The object was absent and absence is not a target
    NotFound,
    Unclassified,
}

/// One probe call, as reported to an observer
#[derive(Debug, Clone)]
pub struct Attempt<'a> {
    /// 1-based attempt number
    pub number: u32,
    pub label: &'a str,
    pub absent: bool,
    pub classification: Classification,
    /// Time since the run started
    pub elapsed: Duration,
}

/// Successful end of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Converged<T> {
    /// Value from the final observation (`None` if the object was absent)
    pub value: Option<T>,
    /// The target label that was reached
    pub label: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

type Observer = Arc<dyn Fn(&Attempt<'_>) + Send + Sync>;

/// Drives a probe until its status converges on a target label
#[derive(Clone)]
pub struct Poller {
    spec: PollSpec,
    cancel: Option<CancellationToken>,
    observer: Option<Observer>,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("spec", &self.spec)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Poll `probe` until it converges under `spec`
pub async fn poll<P>(probe: P, spec: PollSpec) -> PollResult<Converged<P::Value>>
where
    P: Probe,
    P::Value: fmt::Debug,
{
    Poller::new(spec).poll(probe).await
}

impl Poller {
    pub fn new(spec: PollSpec) -> Self {
        Self {
            spec,
            cancel: None,
            observer: None,
        }
    }

    pub fn spec(&self) -> &PollSpec {
        &self.spec
    }

    /// Abort the wait with [`PollError::Cancelled`] when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Call `observer` after every probe
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Attempt<'_>) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Run the probe until a target label is reached or the run fails
    ///
    /// The probe is consumed: once this returns it is never called again.
    pub async fn poll<P>(&self, mut probe: P) -> PollResult<Converged<P::Value>>
    where
        P: Probe,
        P::Value: fmt::Debug,
    {
        self.spec.validate()?;

        let mut run = Run::new(&self.spec);

        if !self.spec.delay.is_zero() {
            self.pause(self.spec.delay, &mut run).await?;
        }

        loop {
            let attempt = run.begin_attempt();

            let result = tokio::select! {
                biased;
                _ = cancelled(self.cancel.as_ref()) => return Err(run.cancelled()),
                _ = sleep_until(run.deadline) => return Err(run.timed_out()),
                result = probe.probe() => result,
            };

            let observation = match result {
                Ok(observation) => observation,
                Err(e) => {
                    run.transition(PollState::Failed);
                    log::debug!("probe failed on attempt {}: {}", attempt, e);
                    return Err(PollError::Probe(e));
                }
            };

            if let Some(converged) = self.observe(&mut run, attempt, observation)? {
                return Ok(converged);
            }

            let wait = self
                .spec
                .interval
                .delay_after(attempt, self.spec.min_poll_interval);
            self.pause(wait, &mut run).await?;
        }
    }

    /// Sleep for `duration` unless the deadline passes or the run is cancelled
    async fn pause<T: fmt::Debug>(&self, duration: Duration, run: &mut Run<'_, T>) -> PollResult<()> {
        let wake = instant_after(Instant::now(), duration);
        tokio::select! {
            biased;
            _ = cancelled(self.cancel.as_ref()) => Err(run.cancelled()),
            _ = sleep_until(run.deadline) => Err(run.timed_out()),
            _ = sleep_until(wake) => Ok(()),
        }
    }

    /// Classify one observation and decide whether the run is over
    fn observe<T: fmt::Debug>(
        &self,
        run: &mut Run<'_, T>,
        attempt: u32,
        observation: Observation<T>,
    ) -> PollResult<Option<Converged<T>>> {
        let spec = &self.spec;
        let absent = observation.is_absent();

        // An empty target means "gone", unless the absence is itself a pending label
        let gone = absent && spec.target.is_empty() && !spec.is_pending(&observation.label);
        let classification = if spec.is_target(&observation.label) || gone {
            Classification::Target
        } else if absent {
            Classification::NotFound
        } else if spec.is_pending(&observation.label) {
            Classification::Pending
        } else {
            Classification::Unclassified
        };

        log::debug!(
            "attempt {}: state '{}'{} classified as {:?}",
            attempt,
            observation.label,
            if absent { " (absent)" } else { "" },
            classification
        );

        if let Some(observer) = &self.observer {
            observer(&Attempt {
                number: attempt,
                label: &observation.label,
                absent,
                classification,
                elapsed: run.started.elapsed(),
            });
        }

        if !absent {
            run.not_found = 0;
        }

        match classification {
            Classification::Target => {
                run.target_hits += 1;
                if run.target_hits >= spec.continuous_target_occurrence {
                    run.transition(PollState::Succeeded);
                    return Ok(Some(Converged {
                        value: observation.value,
                        label: observation.label,
                        attempts: attempt,
                        elapsed: run.started.elapsed(),
                    }));
                }
            }
            Classification::NotFound => {
                run.target_hits = 0;
                run.not_found += 1;
                if run.not_found > spec.not_found_checks {
                    run.transition(PollState::Failed);
                    return Err(PollError::NotFound {
                        checks: run.not_found,
                        last_detail: observation.detail,
                    });
                }
            }
            Classification::Pending => {
                run.target_hits = 0;
            }
            Classification::Unclassified => {
                run.target_hits = 0;
                match spec.unclassified {
                    UnclassifiedPolicy::Pending => {
                        log::warn!(
                            "unexpected state '{}' (pending: {:?}, target: {:?}), still waiting",
                            observation.label,
                            spec.pending,
                            spec.target
                        );
                    }
                    UnclassifiedPolicy::Fail => {
                        run.transition(PollState::Failed);
                        return Err(PollError::UnclassifiedStatus {
                            label: observation.label,
                            pending: spec.pending.iter().cloned().collect(),
                            target: spec.target.clone(),
                        });
                    }
                }
            }
        }

        run.last = Some(observation);
        Ok(None)
    }
}

/// Bookkeeping for one run
struct Run<'s, T> {
    spec: &'s PollSpec,
    started: Instant,
    deadline: Instant,
    state: PollState,
    attempts: u32,
    target_hits: u32,
    not_found: u32,
    last: Option<Observation<T>>,
}

impl<'s, T: fmt::Debug> Run<'s, T> {
    fn new(spec: &'s PollSpec) -> Self {
        let started = Instant::now();
        Self {
            spec,
            started,
            deadline: instant_after(started, spec.timeout),
            state: PollState::NotStarted,
            attempts: 0,
            target_hits: 0,
            not_found: 0,
            last: None,
        }
    }

    fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.transition(PollState::Polling {
            attempts: self.attempts,
        });
        self.attempts
    }

    fn transition(&mut self, to: PollState) {
        match self.state.advance(to) {
            Ok(next) => self.state = next,
            Err(e) => {
                debug_assert!(false, "{}", e);
                log::error!("{}", e);
            }
        }
    }

    fn last_label(&self) -> Option<String> {
        self.last.as_ref().map(|o| o.label.clone())
    }

    fn timed_out(&mut self) -> PollError {
        self.transition(PollState::TimedOut);
        let elapsed = self.started.elapsed();
        log::debug!(
            "timed out after {:?} ({} attempts), last state {:?}",
            elapsed,
            self.attempts,
            self.last_label()
        );
        PollError::Timeout {
            timeout: self.spec.timeout,
            elapsed,
            target: self.spec.target.clone(),
            last_label: self.last_label(),
            last_value: self
                .last
                .as_ref()
                .and_then(|o| o.value.as_ref())
                .map(|v| format!("{:?}", v)),
        }
    }

    fn cancelled(&mut self) -> PollError {
        self.transition(PollState::Cancelled);
        PollError::Cancelled {
            last_label: self.last_label(),
        }
    }
}

/// Roughly 30 years; stands in for durations too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `base + duration`, saturating at a far-future instant instead of overflowing
fn instant_after(base: Instant, duration: Duration) -> Instant {
    base.checked_add(duration)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
