use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use jobguard_application::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_FIRST_DELAY, DEFAULT_RETRY_MAX_DELAY,
    DEFAULT_RETRY_MULTIPLIER, RetryPolicy,
};
use jobguard_core::AppError;
use jobguard_domain::{JobId, TiePolicy};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub enum DirectoryBackend {
    Postgres,
    Http {
        base_url: String,
        bearer_token: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub job_id: JobId,
    pub shared_secret: String,
    pub api_host: String,
    pub api_port: u16,
    pub queue_name: String,
    pub queue_visibility: Duration,
    pub retry_policy: RetryPolicy,
    pub tie_policy: TiePolicy,
    pub directory_backend: DirectoryBackend,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = required_env("DATABASE_URL")?;
        let job_id = JobId::new(required_non_empty_env("JOBGUARD_JOB_ID")?)?;
        let shared_secret = required_non_empty_env("JOBGUARD_SHARED_SECRET")?;
        if shared_secret.len() < 16 {
            return Err(AppError::Validation(
                "JOBGUARD_SHARED_SECRET must be at least 16 characters".to_owned(),
            ));
        }

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let queue_name = env::var("JOBGUARD_QUEUE_NAME")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| job_id.as_str().to_owned());
        let queue_visibility =
            Duration::from_secs(parse_env_u64("QUEUE_VISIBILITY_SECONDS", 300)?);

        let retry_policy = RetryPolicy::new(
            parse_env_u32("GATE_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?,
            Duration::from_millis(parse_env_u64(
                "GATE_RETRY_FIRST_DELAY_MS",
                duration_millis(DEFAULT_RETRY_FIRST_DELAY),
            )?),
            parse_env_u32("GATE_RETRY_MULTIPLIER", DEFAULT_RETRY_MULTIPLIER)?,
            DEFAULT_RETRY_MAX_DELAY,
        )?;
        let tie_policy = match env::var("GATE_TIE_POLICY") {
            Ok(value) if !value.trim().is_empty() => TiePolicy::parse(value.trim())?,
            _ => TiePolicy::default(),
        };

        let directory_backend = match env::var("DIRECTORY_BACKEND")
            .unwrap_or_else(|_| "postgres".to_owned())
            .as_str()
        {
            "postgres" => DirectoryBackend::Postgres,
            "http" => DirectoryBackend::Http {
                base_url: required_non_empty_env("DIRECTORY_BASE_URL")?,
                bearer_token: env::var("DIRECTORY_BEARER_TOKEN")
                    .ok()
                    .filter(|value| !value.trim().is_empty()),
            },
            other => {
                return Err(AppError::Validation(format!(
                    "DIRECTORY_BACKEND must be either 'postgres' or 'http', got '{other}'"
                )));
            }
        };

        Ok(Self {
            migrate_only,
            database_url,
            job_id,
            shared_secret,
            api_host,
            api_port,
            queue_name,
            queue_visibility,
            retry_policy,
            tie_policy,
            directory_backend,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
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

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> Result<String, AppError> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, AppError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, AppError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        Err(_) => Ok(default),
    }
}
