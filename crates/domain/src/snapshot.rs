use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jobguard_core::{AppError, AppResult};
use serde::Serialize;

use crate::job::{JobId, JobInstance};

/// Assumed upper bound on concurrently pending instances of one job.
///
/// Passed to the upstream listing call as its page size.
pub const DIRECTORY_MAX_RESULTS: usize = 1000;

/// Instances of one job as returned by a single directory query.
///
/// Lives for one decision cycle and may be stale by the time it is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectorySnapshot {
    job_id: JobId,
    queried_at: DateTime<Utc>,
    instances: Vec<JobInstance>,
}

impl DirectorySnapshot {
    /// Creates a snapshot, rejecting repeated identities.
    pub fn new(
        job_id: JobId,
        queried_at: DateTime<Utc>,
        instances: Vec<JobInstance>,
    ) -> AppResult<Self> {
        let mut seen = HashSet::with_capacity(instances.len());
        for instance in &instances {
            if !seen.insert(instance.id()) {
                return Err(AppError::InvariantViolation(format!(
                    "directory snapshot for job '{job_id}' lists instance '{}' more than once",
                    instance.id()
                )));
            }
        }

        Ok(Self {
            job_id,
            queried_at,
            instances,
        })
    }

    /// Returns the job this snapshot was taken for.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Returns when the directory was queried.
    #[must_use]
    pub fn queried_at(&self) -> DateTime<Utc> {
        self.queried_at
    }

    /// Returns every instance in directory order.
    #[must_use]
    pub fn instances(&self) -> &[JobInstance] {
        &self.instances
    }

    /// Iterates over instances reported as running.
    pub fn running(&self) -> impl Iterator<Item = &JobInstance> {
        self.instances.iter().filter(|instance| instance.is_running())
    }

    /// Returns the number of running instances.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running().count()
    }

    /// Returns whether the snapshot holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
