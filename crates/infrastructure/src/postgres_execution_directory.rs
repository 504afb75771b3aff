use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobguard_application::ExecutionDirectory;
use jobguard_core::{AppError, AppResult};
use jobguard_domain::{
    DIRECTORY_MAX_RESULTS, DirectorySnapshot, InstanceId, InstanceStatus, JobId, JobInstance,
};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed execution directory over `job_instances`.
#[derive(Clone)]
pub struct PostgresExecutionDirectory {
    pool: PgPool,
}

impl PostgresExecutionDirectory {
    /// Creates a directory with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct JobInstanceRow {
    pub(crate) id: String,
    pub(crate) status: String,
    pub(crate) started_at: DateTime<Utc>,
}

pub(crate) fn job_instance_from_row(row: JobInstanceRow) -> AppResult<JobInstance> {
    Ok(JobInstance::new(
        InstanceId::new(row.id)?,
        row.started_at,
        InstanceStatus::parse(row.status.as_str())?,
    ))
}

#[async_trait]
impl ExecutionDirectory for PostgresExecutionDirectory {
    async fn list_running(&self, job_id: &JobId) -> AppResult<DirectorySnapshot> {
        let limit = i64::try_from(DIRECTORY_MAX_RESULTS).map_err(|error| {
            AppError::Internal(format!("invalid directory result limit: {error}"))
        })?;

        let rows = sqlx::query_as::<_, JobInstanceRow>(
            r#"
            SELECT id, status, started_at
            FROM job_instances
            WHERE job_id = $1
              AND status = $2
            ORDER BY started_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(job_id.as_str())
        .bind(InstanceStatus::Running.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::DirectoryUnavailable(format!(
                "failed to list running instances for job '{job_id}': {error}"
            ))
        })?;

        let instances = rows
            .into_iter()
            .map(job_instance_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        DirectorySnapshot::new(job_id.clone(), Utc::now(), instances)
    }
}
