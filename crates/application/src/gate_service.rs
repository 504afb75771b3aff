use std::sync::Arc;

use jobguard_core::AppResult;
use jobguard_domain::{GateDecision, InstanceId, JobId, TiePolicy, evaluate_gate};
use tracing::{debug, error};

use crate::job_ports::ExecutionDirectory;
use crate::retry_policy::RetryPolicy;

mod control_loop;

pub use control_loop::{
    ControlLoop, ControlLoopConfig, ControlLoopOutcome, ControlLoopState, DEFAULT_WAIT_INTERVAL,
};

/// Oldest-wins admission check for instances that police themselves.
#[derive(Clone)]
pub struct OldestWinsGateService {
    directory: Arc<dyn ExecutionDirectory>,
    retry_policy: RetryPolicy,
    tie_policy: TiePolicy,
}

impl OldestWinsGateService {
    /// Creates a gate service with the default tie policy.
    #[must_use]
    pub fn new(directory: Arc<dyn ExecutionDirectory>, retry_policy: RetryPolicy) -> Self {
        Self {
            directory,
            retry_policy,
            tie_policy: TiePolicy::default(),
        }
    }

    /// Overrides how same-millisecond starts are treated.
    #[must_use]
    pub fn with_tie_policy(mut self, tie_policy: TiePolicy) -> Self {
        self.tie_policy = tie_policy;
        self
    }

    /// Returns the active tie policy.
    #[must_use]
    pub fn tie_policy(&self) -> TiePolicy {
        self.tie_policy
    }

    /// Fetches a fresh snapshot and decides whether `current` may proceed.
    ///
    /// Only the directory fetch is retried; a decision is never re-evaluated
    /// against an old snapshot.
    pub async fn evaluate(&self, job_id: &JobId, current: &InstanceId) -> AppResult<GateDecision> {
        let snapshot = self
            .retry_policy
            .run("list_running", || self.directory.list_running(job_id))
            .await
            .inspect_err(|fetch_error| {
                error!(
                    job_id = %job_id,
                    instance_id = %current,
                    error = %fetch_error,
                    "failed to fetch execution directory snapshot"
                );
            })?;

        match evaluate_gate(current, &snapshot, self.tie_policy) {
            Ok(decision) => {
                debug!(
                    job_id = %job_id,
                    instance_id = %current,
                    can_proceed = decision.can_proceed,
                    pending_count = decision.pending_instances.len(),
                    "gate evaluated"
                );
                Ok(decision)
            }
            Err(gate_error) => {
                error!(
                    job_id = %job_id,
                    instance_id = %current,
                    tie_policy = self.tie_policy.as_str(),
                    queried_at = %snapshot.queried_at(),
                    snapshot = ?snapshot.instances(),
                    error = %gate_error,
                    "gate evaluation aborted"
                );
                Err(gate_error)
            }
        }
    }
}

#[cfg(test)]
mod tests;
