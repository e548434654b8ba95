//! Lifecycle of a single convergence run

use thiserror::Error;

/// Where a convergence run stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    NotStarted,
    Polling { attempts: u32 },
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

/// Attempted to move a run out of a terminal state, or backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid poll state transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: PollState,
    pub to: PollState,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Succeeded | PollState::Failed | PollState::TimedOut | PollState::Cancelled
        )
    }

    /// Move to `to`, rejecting transitions out of terminal states
    ///
    /// `NotStarted` may only move to `Polling` or end early (an invalid spec,
    /// a cancellation or a timeout during the initial delay). `Polling` may
    /// count further attempts or end.
    pub fn advance(self, to: PollState) -> Result<PollState, InvalidTransition> {
        let allowed = match (self, to) {
            (from, _) if from.is_terminal() => false,
            (_, PollState::NotStarted) => false,
            (PollState::NotStarted, PollState::Polling { attempts }) => attempts == 1,
            (PollState::NotStarted, PollState::Succeeded) => false,
            (PollState::Polling { attempts: a }, PollState::Polling { attempts: b }) => b == a + 1,
            (_, _) => true,
        };
        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let state = PollState::NotStarted
            .advance(PollState::Polling { attempts: 1 })
            .unwrap()
            .advance(PollState::Polling { attempts: 2 })
            .unwrap()
            .advance(PollState::Succeeded)
            .unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn terminal_states_do_not_move() {
        for terminal in [
            PollState::Succeeded,
            PollState::Failed,
            PollState::TimedOut,
            PollState::Cancelled,
        ] {
            assert!(terminal.advance(PollState::Polling { attempts: 1 }).is_err());
            assert!(terminal.advance(PollState::Succeeded).is_err());
        }
    }

    #[test]
    fn attempts_only_count_up_by_one() {
        let polling = PollState::Polling { attempts: 3 };
        assert!(polling.advance(PollState::Polling { attempts: 5 }).is_err());
        assert!(polling.advance(PollState::NotStarted).is_err());
        assert!(
            PollState::NotStarted
                .advance(PollState::Polling { attempts: 2 })
                .is_err()
        );
    }

    #[test]
    fn can_time_out_before_first_probe() {
        assert_eq!(
            PollState::NotStarted.advance(PollState::TimedOut),
            Ok(PollState::TimedOut)
        );
    }
}
