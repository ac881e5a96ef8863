//! Bounded poll loop that waits for a driver to report `Running`.

use std::fmt;

use tracing::{debug, info, warn};

use crate::driver::Driver;

use super::{CancelSignal, LifecycleError, LifecycleOrchestrator};

/// Position of a machine in the create-and-wait state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    /// Create (or start) returned; no poll made yet.
    Created,
    /// Waiting on poll number `attempt`.
    Polling {
        /// One-based poll number.
        attempt: u32,
    },
    /// The driver reported `Running`.
    Running,
    /// The attempt budget ran out.
    TimedOut,
    /// The caller cancelled between polls.
    Cancelled,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Polling { attempt } => write!(f, "polling (attempt {attempt})"),
            Self::Running => f.write_str("running"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of a successful wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WaitOutcome {
    /// Machine name.
    pub machine_name: String,
    /// Final state; always [`LifecycleState::Running`].
    pub state: LifecycleState,
    /// State polls made, including the one that saw `Running`.
    pub polls: u32,
    /// Polls that did not see `Running` and consumed attempt budget.
    pub retries: u32,
    /// Budget the wait ran under.
    pub max_attempts: u32,
}

struct PollLoop {
    machine: String,
    state: LifecycleState,
}

impl PollLoop {
    fn advance(&mut self, next: LifecycleState) {
        debug!(machine = %self.machine, from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
    }
}

impl<P> LifecycleOrchestrator<P> {
    /// Polls `driver` until it reports `Running`, the budget from
    /// [`Driver::max_attempt`] runs out, or `cancel` fires.
    ///
    /// Failed state queries consume an attempt like any non-running answer.
    /// Callers must hold the machine's in-flight claim.
    pub(crate) async fn wait_for_running(
        &self,
        driver: &mut dyn Driver,
        cancel: &CancelSignal,
    ) -> Result<WaitOutcome, LifecycleError> {
        let max_attempts = driver.max_attempt();
        let mut poll = PollLoop {
            machine: driver.machine_name().to_owned(),
            state: LifecycleState::Created,
        };

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                poll.advance(LifecycleState::Cancelled);
                return Err(LifecycleError::Cancelled {
                    machine: poll.machine,
                    attempts: attempt - 1,
                });
            }

            poll.advance(LifecycleState::Polling { attempt });
            match driver.state().await {
                Ok(current) if current.is_running() => {
                    poll.advance(LifecycleState::Running);
                    info!(machine = %poll.machine, polls = attempt, "machine is running");
                    return Ok(WaitOutcome {
                        machine_name: poll.machine,
                        state: poll.state,
                        polls: attempt,
                        retries: attempt - 1,
                        max_attempts,
                    });
                }
                Ok(current) => debug!(
                    machine = %poll.machine,
                    attempt,
                    max_attempts,
                    state = %current,
                    "machine not running yet"
                ),
                Err(err) => warn!(
                    machine = %poll.machine,
                    attempt,
                    max_attempts,
                    error = %err,
                    "state query failed"
                ),
            }

            if attempt < max_attempts && cancel.sleep_or_cancelled(self.poll_interval).await {
                poll.advance(LifecycleState::Cancelled);
                return Err(LifecycleError::Cancelled {
                    machine: poll.machine,
                    attempts: attempt,
                });
            }
        }

        poll.advance(LifecycleState::TimedOut);
        Err(LifecycleError::Timeout {
            machine: poll.machine,
            attempts: max_attempts,
            max_attempts,
        })
    }
}
