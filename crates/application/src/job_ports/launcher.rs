use async_trait::async_trait;
use jobguard_core::AppResult;
use jobguard_domain::{InstanceId, JobId};

/// Port for starting new job instances.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Starts one instance with opaque input and an optional idempotency name.
    ///
    /// Fails with `LaunchRejected` when the name already belongs to a running
    /// instance of the job.
    async fn start(&self, job_id: &JobId, input: &str, name: Option<&str>)
    -> AppResult<InstanceId>;
}
