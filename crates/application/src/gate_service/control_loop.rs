use std::future::Future;
use std::time::Duration;

use jobguard_core::AppResult;
use jobguard_domain::{GateDecision, InstanceId, JobId};
use tracing::info;

use super::OldestWinsGateService;

/// Default pause between two gate polls while older instances are running.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(60);

/// Timing for the polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLoopConfig {
    /// Sleep between a negative decision and the next poll.
    pub wait_interval: Duration,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            wait_interval: DEFAULT_WAIT_INTERVAL,
        }
    }
}

/// States of one instance moving through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLoopState {
    /// Next step fetches a snapshot and evaluates the gate.
    Polling,
    /// Older instances were running at the last poll.
    Waiting {
        /// Decision that sent the loop into waiting.
        last_decision: GateDecision,
    },
    /// The instance is the oldest one; terminal.
    Proceeding {
        /// Decision that granted admission.
        decision: GateDecision,
    },
}

/// Result of a loop that reached `Proceeding`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLoopOutcome {
    /// Admission decision.
    pub decision: GateDecision,
    /// Number of gate polls it took.
    pub polls: u32,
}

/// Drives one instance through POLLING, WAITING and PROCEEDING.
///
/// There is no bound on the number of cycles. Dropping the future returned by
/// [`ControlLoop::run`] cancels the wait.
pub struct ControlLoop {
    gate: OldestWinsGateService,
    config: ControlLoopConfig,
    job_id: JobId,
    instance_id: InstanceId,
    state: ControlLoopState,
    polls: u32,
}

impl ControlLoop {
    /// Creates a loop in the polling state.
    #[must_use]
    pub fn new(
        gate: OldestWinsGateService,
        config: ControlLoopConfig,
        job_id: JobId,
        instance_id: InstanceId,
    ) -> Self {
        Self {
            gate,
            config,
            job_id,
            instance_id,
            state: ControlLoopState::Polling,
            polls: 0,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> &ControlLoopState {
        &self.state
    }

    /// Returns how many polls have been performed.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Performs one transition. Gate errors leave the state unchanged.
    pub async fn step(&mut self) -> AppResult<()> {
        let next = match self.state {
            ControlLoopState::Proceeding { .. } => return Ok(()),
            ControlLoopState::Polling => {
                self.polls = self.polls.saturating_add(1);
                let decision = self.gate.evaluate(&self.job_id, &self.instance_id).await?;

                if decision.can_proceed {
                    info!(
                        job_id = %self.job_id,
                        instance_id = %self.instance_id,
                        polls = self.polls,
                        "oldest running instance, proceeding"
                    );
                    ControlLoopState::Proceeding { decision }
                } else {
                    info!(
                        job_id = %self.job_id,
                        instance_id = %self.instance_id,
                        pending_count = decision.pending_instances.len(),
                        wait_ms = u64::try_from(self.config.wait_interval.as_millis())
                            .unwrap_or(u64::MAX),
                        "older instances still running, waiting"
                    );
                    ControlLoopState::Waiting {
                        last_decision: decision,
                    }
                }
            }
            ControlLoopState::Waiting { .. } => {
                tokio::time::sleep(self.config.wait_interval).await;
                ControlLoopState::Polling
            }
        };

        self.state = next;
        Ok(())
    }

    /// Steps until the instance may proceed or a fatal error occurs.
    pub async fn run(mut self) -> AppResult<ControlLoopOutcome> {
        loop {
            if let ControlLoopState::Proceeding { decision } = &self.state {
                return Ok(ControlLoopOutcome {
                    decision: decision.clone(),
                    polls: self.polls,
                });
            }

            self.step().await?;
        }
    }

    /// Waits for admission, then hands control to the job body.
    pub async fn run_guarded<F, Fut, T>(self, body: F) -> AppResult<T>
    where
        F: FnOnce(ControlLoopOutcome) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let outcome = self.run().await?;
        body(outcome).await
    }
}
