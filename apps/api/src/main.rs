//! Jobguard API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Duration;

use jobguard_application::{ExecutionDirectory, OldestWinsGateService, QueueGatedAdmitter};
use jobguard_core::AppError;
use jobguard_infrastructure::{
    HttpExecutionDirectory, PostgresAdmissionQueue, PostgresExecutionDirectory,
    PostgresJobLauncher,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::api_config::{ApiConfig, DirectoryBackend, init_tracing};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let directory: Arc<dyn ExecutionDirectory> = match &config.directory_backend {
        DirectoryBackend::Postgres => Arc::new(PostgresExecutionDirectory::new(pool.clone())),
        DirectoryBackend::Http {
            base_url,
            bearer_token,
        } => {
            let http_client = reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|error| {
                    AppError::Internal(format!("failed to build HTTP client: {error}"))
                })?;
            let directory = HttpExecutionDirectory::new(http_client, base_url.as_str());
            Arc::new(match bearer_token {
                Some(token) => directory.with_bearer_token(token.as_str()),
                None => directory,
            })
        }
    };

    let queue = Arc::new(PostgresAdmissionQueue::new(
        pool.clone(),
        config.queue_name.as_str(),
        config.queue_visibility,
    )?);
    let launcher = Arc::new(PostgresJobLauncher::new(pool));

    let gate_service = OldestWinsGateService::new(directory.clone(), config.retry_policy)
        .with_tie_policy(config.tie_policy);
    let tie_policy = gate_service.tie_policy();
    let admitter = QueueGatedAdmitter::new(config.job_id.clone(), queue, directory, launcher)
        .with_retry_policy(config.retry_policy);

    let app = api_router::build_router(AppState {
        gate_service,
        admitter,
        shared_secret: Arc::from(config.shared_secret.as_str()),
    });

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind API listener: {error}")))?;

    info!(
        %address,
        job_id = %config.job_id,
        queue = %config.queue_name,
        tie_policy = tie_policy.as_str(),
        retry_attempts = config.retry_policy.max_attempts(),
        "jobguard-api listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("API server failed: {error}")))
}
