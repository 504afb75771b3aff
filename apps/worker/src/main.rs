//! Jobguard worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use jobguard_application::{
    ControlLoop, ControlLoopConfig, DEFAULT_ADMISSION_INTERVAL, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_FIRST_DELAY, DEFAULT_RETRY_MAX_DELAY, DEFAULT_RETRY_MULTIPLIER,
    DEFAULT_WAIT_INTERVAL, ExecutionDirectory, JobLauncher, OldestWinsGateService,
    QueueGatedAdmitter, RetryPolicy,
};
use jobguard_core::{AppError, AppResult};
use jobguard_domain::{InstanceId, InstanceStatus, JobId, TiePolicy};
use jobguard_infrastructure::{
    HttpExecutionDirectory, PostgresAdmissionQueue, PostgresExecutionDirectory,
    PostgresJobLauncher,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerMode {
    Admitter,
    Guard { command: Vec<String> },
}

#[derive(Debug, Clone)]
enum DirectoryBackend {
    Postgres,
    Http {
        base_url: String,
        bearer_token: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct WorkerConfig {
    mode: WorkerMode,
    database_url: String,
    job_id: JobId,
    instance_id: Option<InstanceId>,
    instance_name: Option<String>,
    instance_input: String,
    queue_name: String,
    queue_visibility: Duration,
    admitter_interval: Duration,
    wait_interval: Duration,
    retry_policy: RetryPolicy,
    tie_policy: TiePolicy,
    directory_backend: DirectoryBackend,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load(env::args().skip(1).collect())?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let directory = build_directory(&config, pool.clone())?;

    match &config.mode {
        WorkerMode::Admitter => run_admitter(&config, pool, directory).await,
        WorkerMode::Guard { command } => run_guard(&config, pool, directory, command).await,
    }
}

async fn run_admitter(
    config: &WorkerConfig,
    pool: PgPool,
    directory: Arc<dyn ExecutionDirectory>,
) -> AppResult<()> {
    let queue = Arc::new(PostgresAdmissionQueue::new(
        pool.clone(),
        config.queue_name.as_str(),
        config.queue_visibility,
    )?);
    let launcher = Arc::new(PostgresJobLauncher::new(pool));
    let admitter = QueueGatedAdmitter::new(config.job_id.clone(), queue, directory, launcher)
        .with_retry_policy(config.retry_policy);

    info!(
        job_id = %admitter.job_id(),
        queue = %config.queue_name,
        interval_ms = duration_millis(config.admitter_interval),
        retry_attempts = config.retry_policy.max_attempts(),
        "jobguard-worker admitter started"
    );

    let report = admitter
        .run_schedule(config.admitter_interval, shutdown_signal())
        .await;

    info!(
        cycles = report.cycles,
        launched = report.launched,
        races_lost = report.races_lost,
        "jobguard-worker admitter stopped"
    );
    Ok(())
}

async fn run_guard(
    config: &WorkerConfig,
    pool: PgPool,
    directory: Arc<dyn ExecutionDirectory>,
    command: &[String],
) -> AppResult<()> {
    let launcher = PostgresJobLauncher::new(pool);

    let (instance_id, registered) = match &config.instance_id {
        Some(instance_id) => (instance_id.clone(), false),
        None => {
            let instance_id = launcher
                .start(
                    &config.job_id,
                    config.instance_input.as_str(),
                    config.instance_name.as_deref(),
                )
                .await?;
            info!(job_id = %config.job_id, instance_id = %instance_id, "registered guarded instance");
            (instance_id, true)
        }
    };

    let gate = OldestWinsGateService::new(directory, config.retry_policy)
        .with_tie_policy(config.tie_policy);
    info!(
        job_id = %config.job_id,
        instance_id = %instance_id,
        tie_policy = gate.tie_policy().as_str(),
        retry_attempts = config.retry_policy.max_attempts(),
        "waiting for gate admission"
    );
    let control_loop = ControlLoop::new(
        gate,
        ControlLoopConfig {
            wait_interval: config.wait_interval,
        },
        config.job_id.clone(),
        instance_id.clone(),
    );

    let body_instance_id = instance_id.clone();
    let guarded = control_loop.run_guarded(|outcome| async move {
        info!(
            job_id = %config.job_id,
            instance_id = %body_instance_id,
            polls = outcome.polls,
            "admitted, running job body"
        );
        run_command(command).await
    });

    let result = tokio::select! {
        result = guarded => Some(result),
        () = shutdown_signal() => None,
    };

    let status = final_status(result.as_ref());
    if registered
        && let Err(finish_error) = launcher.finish_instance(&instance_id, status).await
    {
        error!(
            instance_id = %instance_id,
            error = %finish_error,
            "failed to record final instance status"
        );
    }

    match result {
        None => {
            warn!(job_id = %config.job_id, instance_id = %instance_id, "guarded run aborted by shutdown signal");
            Ok(())
        }
        Some(Ok(true)) => {
            info!(instance_id = %instance_id, "job body finished successfully");
            Ok(())
        }
        Some(Ok(false)) => Err(AppError::Internal(format!(
            "job body of instance '{instance_id}' exited unsuccessfully"
        ))),
        Some(Err(run_error)) => {
            error!(instance_id = %instance_id, error = %run_error, "guarded run failed");
            Err(run_error)
        }
    }
}

fn final_status(result: Option<&AppResult<bool>>) -> InstanceStatus {
    match result {
        None => InstanceStatus::Aborted,
        Some(Ok(true)) => InstanceStatus::Succeeded,
        Some(_) => InstanceStatus::Failed,
    }
}

async fn run_command(command: &[String]) -> AppResult<bool> {
    let Some((program, arguments)) = command.split_first() else {
        return Err(AppError::Validation(
            "guard mode requires a command to run".to_owned(),
        ));
    };

    let status = tokio::process::Command::new(program)
        .args(arguments)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to spawn job body '{program}': {error}"))
        })?;

    Ok(status.success())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_directory(config: &WorkerConfig, pool: PgPool) -> AppResult<Arc<dyn ExecutionDirectory>> {
    match &config.directory_backend {
        DirectoryBackend::Postgres => Ok(Arc::new(PostgresExecutionDirectory::new(pool))),
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
            Ok(Arc::new(match bearer_token {
                Some(token) => directory.with_bearer_token(token.as_str()),
                None => directory,
            }))
        }
    }
}

impl WorkerMode {
    fn from_args(args: Vec<String>) -> AppResult<Self> {
        let mut args = args.into_iter();
        match args.next().as_deref() {
            None | Some("admitter") => Ok(Self::Admitter),
            Some("guard") => {
                let command: Vec<String> = args.skip_while(|arg| arg == "--").collect();
                if command.is_empty() {
                    return Err(AppError::Validation(
                        "usage: jobguard-worker guard -- <command> [args...]".to_owned(),
                    ));
                }
                Ok(Self::Guard { command })
            }
            Some(other) => Err(AppError::Validation(format!(
                "worker mode must be either 'admitter' or 'guard', got '{other}'"
            ))),
        }
    }
}

impl WorkerConfig {
    fn load(args: Vec<String>) -> AppResult<Self> {
        let mode = WorkerMode::from_args(args)?;
        let database_url = required_env("DATABASE_URL")?;
        let job_id = JobId::new(required_env("JOBGUARD_JOB_ID")?)?;
        let instance_id = optional_env("JOBGUARD_INSTANCE_ID")
            .map(InstanceId::new)
            .transpose()?;
        let instance_name = optional_env("JOBGUARD_INSTANCE_NAME");
        let instance_input = env::var("JOBGUARD_INPUT").unwrap_or_default();
        let queue_name =
            optional_env("JOBGUARD_QUEUE_NAME").unwrap_or_else(|| job_id.as_str().to_owned());

        let queue_visibility =
            Duration::from_secs(parse_env_u64("QUEUE_VISIBILITY_SECONDS", 300)?);
        let admitter_interval = Duration::from_millis(parse_env_u64(
            "ADMITTER_INTERVAL_MS",
            duration_millis(DEFAULT_ADMISSION_INTERVAL),
        )?);
        let wait_interval = Duration::from_millis(parse_env_u64(
            "GATE_WAIT_INTERVAL_MS",
            duration_millis(DEFAULT_WAIT_INTERVAL),
        )?);
        if admitter_interval.is_zero() || wait_interval.is_zero() {
            return Err(AppError::Validation(
                "ADMITTER_INTERVAL_MS and GATE_WAIT_INTERVAL_MS must be greater than zero"
                    .to_owned(),
            ));
        }

        let retry_policy = RetryPolicy::new(
            parse_env_u32("GATE_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?,
            Duration::from_millis(parse_env_u64(
                "GATE_RETRY_FIRST_DELAY_MS",
                duration_millis(DEFAULT_RETRY_FIRST_DELAY),
            )?),
            parse_env_u32("GATE_RETRY_MULTIPLIER", DEFAULT_RETRY_MULTIPLIER)?,
            DEFAULT_RETRY_MAX_DELAY,
        )?;
        let tie_policy = optional_env("GATE_TIE_POLICY")
            .map(|value| TiePolicy::parse(value.as_str()))
            .transpose()?
            .unwrap_or_default();

        let directory_backend = match env::var("DIRECTORY_BACKEND")
            .unwrap_or_else(|_| "postgres".to_owned())
            .as_str()
        {
            "postgres" => DirectoryBackend::Postgres,
            "http" => DirectoryBackend::Http {
                base_url: required_env("DIRECTORY_BASE_URL")?,
                bearer_token: optional_env("DIRECTORY_BEARER_TOKEN"),
            },
            other => {
                return Err(AppError::Validation(format!(
                    "DIRECTORY_BACKEND must be either 'postgres' or 'http', got '{other}'"
                )));
            }
        };

        Ok(Self {
            mode,
            database_url,
            job_id,
            instance_id,
            instance_name,
            instance_input,
            queue_name,
            queue_visibility,
            admitter_interval,
            wait_interval,
            retry_policy,
            tie_policy,
            directory_backend,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn required_env(name: &str) -> AppResult<String> {
    let value = env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        Err(_) => Ok(default),
    }
}
