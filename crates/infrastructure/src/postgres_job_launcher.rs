use async_trait::async_trait;
use jobguard_application::JobLauncher;
use jobguard_core::{AppError, AppResult};
use jobguard_domain::{InstanceId, InstanceStatus, JobId, JobInstance};
use sqlx::PgPool;
use uuid::Uuid;

use crate::postgres_execution_directory::{JobInstanceRow, job_instance_from_row};

/// PostgreSQL-backed launcher that records new instances in `job_instances`.
///
/// The partial unique index on `(job_id, name)` for running rows is what makes
/// launch names idempotency keys.
#[derive(Clone)]
pub struct PostgresJobLauncher {
    pool: PgPool,
}

impl PostgresJobLauncher {
    /// Creates a launcher with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Moves a running instance to a terminal status.
    pub async fn finish_instance(
        &self,
        instance_id: &InstanceId,
        status: InstanceStatus,
    ) -> AppResult<JobInstance> {
        if status == InstanceStatus::Running {
            return Err(AppError::Validation(
                "finish_instance requires a terminal status".to_owned(),
            ));
        }

        let row = sqlx::query_as::<_, JobInstanceRow>(
            r#"
            UPDATE job_instances
            SET status = $2,
                finished_at = now()
            WHERE id = $1
              AND status = 'running'
            RETURNING id, status, started_at
            "#,
        )
        .bind(instance_id.as_str())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::LauncherUnavailable(format!(
                "failed to finish instance '{instance_id}': {error}"
            ))
        })?
        .ok_or_else(|| {
            AppError::Validation(format!("instance '{instance_id}' is not running"))
        })?;

        job_instance_from_row(row)
    }
}

#[async_trait]
impl JobLauncher for PostgresJobLauncher {
    async fn start(
        &self,
        job_id: &JobId,
        input: &str,
        name: Option<&str>,
    ) -> AppResult<InstanceId> {
        let instance_id = InstanceId::new(format!("{job_id}:{}", Uuid::new_v4()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO job_instances (id, job_id, name, input, status, started_at)
            VALUES ($1, $2, $3, $4, 'running', date_trunc('milliseconds', now()))
            "#,
        )
        .bind(instance_id.as_str())
        .bind(job_id.as_str())
        .bind(name)
        .bind(input)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(instance_id),
            Err(error) => Err(map_launch_error(error, job_id, name)),
        }
    }
}

fn map_launch_error(error: sqlx::Error, job_id: &JobId, name: Option<&str>) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::LaunchRejected(format!(
            "job '{job_id}' already has a running instance named '{}'",
            name.unwrap_or_default()
        ));
    }

    AppError::LauncherUnavailable(format!(
        "failed to start an instance of job '{job_id}': {error}"
    ))
}
