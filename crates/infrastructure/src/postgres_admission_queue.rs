use std::time::Duration;

use async_trait::async_trait;
use jobguard_application::{AdmissionQueue, AdmissionRequest};
use jobguard_core::{AppError, AppResult};
use sqlx::{FromRow, PgPool};
use tracing::warn;

/// PostgreSQL-backed admission queue over `admission_requests`.
///
/// A received row stays hidden for the visibility timeout and carries a fresh
/// receipt handle; only that handle can delete it.
#[derive(Clone)]
pub struct PostgresAdmissionQueue {
    pool: PgPool,
    queue_name: String,
    visibility_seconds: i32,
}

#[derive(Debug, FromRow)]
struct AdmissionRequestRow {
    id: uuid::Uuid,
    payload: String,
    name: Option<String>,
    receipt_handle: String,
}

impl PostgresAdmissionQueue {
    /// Creates a queue adapter for one named queue.
    pub fn new(
        pool: PgPool,
        queue_name: impl Into<String>,
        visibility_timeout: Duration,
    ) -> AppResult<Self> {
        let queue_name = queue_name.into();
        if queue_name.trim().is_empty() {
            return Err(AppError::Validation(
                "admission queue name must not be empty".to_owned(),
            ));
        }

        let visibility_seconds = i32::try_from(visibility_timeout.as_secs())
            .map_err(|error| {
                AppError::Validation(format!("invalid queue visibility timeout: {error}"))
            })?
            .max(1);

        Ok(Self {
            pool,
            queue_name,
            visibility_seconds,
        })
    }

    /// Returns the queue this adapter reads.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        self.queue_name.as_str()
    }

    /// Appends one start request and returns its message id.
    pub async fn enqueue(&self, payload: &str, name: Option<&str>) -> AppResult<String> {
        let message_id = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO admission_requests (queue_name, payload, name)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(self.queue_name.as_str())
        .bind(payload)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::QueueUnavailable(format!(
                "failed to enqueue admission request on queue '{}': {error}",
                self.queue_name
            ))
        })?;

        Ok(message_id.to_string())
    }
}

#[async_trait]
impl AdmissionQueue for PostgresAdmissionQueue {
    async fn receive_one(&self) -> AppResult<Option<AdmissionRequest>> {
        let row = sqlx::query_as::<_, AdmissionRequestRow>(
            r#"
            WITH candidate AS (
                SELECT id
                FROM admission_requests
                WHERE queue_name = $1
                  AND visible_at <= now()
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE admission_requests requests
            SET
                receipt_handle = gen_random_uuid()::TEXT,
                visible_at = now() + make_interval(secs => $2::INT),
                receive_count = requests.receive_count + 1
            FROM candidate
            WHERE requests.id = candidate.id
            RETURNING requests.id, requests.payload, requests.name, requests.receipt_handle
            "#,
        )
        .bind(self.queue_name.as_str())
        .bind(self.visibility_seconds)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::QueueUnavailable(format!(
                "failed to receive from admission queue '{}': {error}",
                self.queue_name
            ))
        })?;

        Ok(row.map(|row| AdmissionRequest {
            message_id: row.id.to_string(),
            payload: row.payload,
            name: row.name,
            receipt_handle: row.receipt_handle,
        }))
    }

    async fn delete(&self, request: &AdmissionRequest) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM admission_requests
            WHERE queue_name = $1
              AND receipt_handle = $2
            "#,
        )
        .bind(self.queue_name.as_str())
        .bind(request.receipt_handle.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::QueueUnavailable(format!(
                "failed to delete admission request '{}' from queue '{}': {error}",
                request.message_id, self.queue_name
            ))
        })?;

        if result.rows_affected() == 0 {
            warn!(
                queue = %self.queue_name,
                message_id = %request.message_id,
                "receipt handle no longer current, message left for redelivery"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
