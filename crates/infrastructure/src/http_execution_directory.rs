use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobguard_application::ExecutionDirectory;
use jobguard_core::{AppError, AppResult};
use jobguard_domain::{
    DIRECTORY_MAX_RESULTS, DirectorySnapshot, InstanceId, InstanceStatus, JobId, JobInstance,
};
use serde::{Deserialize, Serialize};

/// Execution directory backed by a remote listing endpoint.
///
/// Calls `POST {base_url}/list-executions`. Retries belong to the caller's
/// retry policy, so each call here is a single attempt.
#[derive(Clone)]
pub struct HttpExecutionDirectory {
    http_client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpExecutionDirectory {
    /// Creates a directory client for the given base URL.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            bearer_token: None,
        }
    }

    /// Sends `Authorization: Bearer <token>` with every listing call.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/list-executions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ListExecutionsRequest<'a> {
    job_id: &'a str,
    status_filter: &'static str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct ListExecutionsResponse {
    executions: Option<Vec<ExecutionEntry>>,
}

#[derive(Debug, Deserialize)]
struct ExecutionEntry {
    identity: String,
    started_at: DateTime<Utc>,
    #[serde(default)]
    status: Option<String>,
}

fn snapshot_from_response(
    job_id: &JobId,
    response: ListExecutionsResponse,
) -> AppResult<DirectorySnapshot> {
    let entries = response.executions.ok_or_else(|| {
        AppError::EmptyDirectoryResponse(format!(
            "listing for job '{job_id}' returned no executions field"
        ))
    })?;

    let instances = entries
        .into_iter()
        .map(|entry| {
            let status = match entry.status.as_deref() {
                Some(value) => InstanceStatus::parse(value)?,
                None => InstanceStatus::Running,
            };
            Ok(JobInstance::new(
                InstanceId::new(entry.identity)?,
                entry.started_at,
                status,
            ))
        })
        .collect::<AppResult<Vec<_>>>()?;

    DirectorySnapshot::new(job_id.clone(), Utc::now(), instances)
}

#[async_trait]
impl ExecutionDirectory for HttpExecutionDirectory {
    async fn list_running(&self, job_id: &JobId) -> AppResult<DirectorySnapshot> {
        let mut request = self
            .http_client
            .post(self.endpoint())
            .json(&ListExecutionsRequest {
                job_id: job_id.as_str(),
                status_filter: InstanceStatus::Running.as_str(),
                max_results: DIRECTORY_MAX_RESULTS,
            });
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|error| {
            AppError::DirectoryUnavailable(format!(
                "execution directory transport error for job '{job_id}': {error}"
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::DirectoryUnavailable(format!(
                "execution directory returned status {status} for job '{job_id}': {body}"
            )));
        }

        let body = response
            .json::<ListExecutionsResponse>()
            .await
            .map_err(|error| {
                AppError::DirectoryUnavailable(format!(
                    "execution directory returned an unreadable body for job '{job_id}': {error}"
                ))
            })?;

        snapshot_from_response(job_id, body)
    }
}
