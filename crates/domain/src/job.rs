use std::fmt::{Display, Formatter};

use chrono::{DateTime, SubsecRound, Utc};
use jobguard_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Identifier of one logical job, shared by every instance of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(NonEmptyString);

impl JobId {
    /// Creates a validated job identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value).map(Self)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for JobId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Opaque identity of one running attempt.
///
/// Ordering is plain string ordering and is the tie-break between instances
/// that share a start timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(NonEmptyString);

impl InstanceId {
    /// Creates a validated instance identity.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value).map(Self)
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for InstanceId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Lifecycle status reported by the execution directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance is executing.
    Running,
    /// Instance finished successfully.
    Succeeded,
    /// Instance finished with a failure.
    Failed,
    /// Instance exceeded its own timeout.
    TimedOut,
    /// Instance was stopped externally.
    Aborted,
}

impl InstanceStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Aborted => "aborted",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            "aborted" => Ok(Self::Aborted),
            _ => Err(AppError::Validation(format!(
                "unknown instance status '{value}'"
            ))),
        }
    }
}

/// One observed attempt of a job, as read from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    id: InstanceId,
    started_at: DateTime<Utc>,
    status: InstanceStatus,
}

impl JobInstance {
    /// Creates an observed instance; the start time is kept at millisecond resolution.
    #[must_use]
    pub fn new(id: InstanceId, started_at: DateTime<Utc>, status: InstanceStatus) -> Self {
        Self {
            id,
            started_at: started_at.trunc_subsecs(3),
            status,
        }
    }

    /// Creates a running instance.
    #[must_use]
    pub fn running(id: InstanceId, started_at: DateTime<Utc>) -> Self {
        Self::new(id, started_at, InstanceStatus::Running)
    }

    /// Returns the instance identity.
    #[must_use]
    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    /// Returns the start timestamp.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the reported status.
    #[must_use]
    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Returns whether the directory reports the instance as running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }
}
