use async_trait::async_trait;
use jobguard_core::AppResult;
use jobguard_domain::{DirectorySnapshot, JobId};

/// Read-only port over the eventually-consistent execution directory.
#[async_trait]
pub trait ExecutionDirectory: Send + Sync {
    /// Lists running instances of one job.
    ///
    /// Fails with `DirectoryUnavailable` on transport errors and with
    /// `EmptyDirectoryResponse` when the upstream answer carries no result
    /// list. Zero running instances is an empty snapshot, not an error.
    async fn list_running(&self, job_id: &JobId) -> AppResult<DirectorySnapshot>;
}
