use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use jobguard_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::job::{InstanceId, JobInstance};
use crate::snapshot::DirectorySnapshot;

/// Total age order over instances: earlier start first, then smaller identity.
#[must_use]
pub fn compare_age(left: &JobInstance, right: &JobInstance) -> Ordering {
    left.started_at()
        .cmp(&right.started_at())
        .then_with(|| left.id().cmp(right.id()))
}

/// How instances sharing the current instance's start timestamp are treated.
///
/// `Strict` is the fail-loud mode: tied instances count as pending, so a tied
/// oldest instance raises `InvariantViolation`. The default `IdentityTieBreak`
/// departs from it and admits the tied instance with the smallest identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Same-millisecond starts are ordered by identity.
    #[default]
    IdentityTieBreak,
    /// Same-millisecond starts block each other, so the identity winner
    /// fails the consistency check instead of proceeding.
    Strict,
}

impl TiePolicy {
    /// Returns stable configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentityTieBreak => "identity_tie_break",
            Self::Strict => "strict",
        }
    }

    /// Parses configuration value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "identity_tie_break" => Ok(Self::IdentityTieBreak),
            "strict" => Ok(Self::Strict),
            _ => Err(AppError::Validation(format!("unknown tie policy '{value}'"))),
        }
    }

    fn blocks(self, candidate: &JobInstance, current: &JobInstance) -> bool {
        match self {
            Self::IdentityTieBreak => compare_age(candidate, current) == Ordering::Less,
            Self::Strict => candidate.started_at() <= current.started_at(),
        }
    }
}

/// Identity and start time of one instance in a decision audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    /// Instance identity.
    pub identity: InstanceId,
    /// Instance start timestamp.
    pub start_time: DateTime<Utc>,
}

impl From<&JobInstance> for InstanceRef {
    fn from(instance: &JobInstance) -> Self {
        Self {
            identity: instance.id().clone(),
            start_time: instance.started_at(),
        }
    }
}

/// Outcome of one oldest-wins evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether the current instance is the oldest running one.
    pub can_proceed: bool,
    /// The instance that asked.
    pub current_instance: InstanceRef,
    /// Older (or tied, under the strict policy) instances blocking the current one.
    pub pending_instances: Vec<InstanceRef>,
}

/// Decides whether `current` may run the job body given one directory snapshot.
///
/// Only running entries take part. Fails with [`AppError::SelfNotFound`] when
/// `current` is not among them, and with [`AppError::InvariantViolation`] when
/// the oldest-entry check and the pending list disagree.
pub fn evaluate_gate(
    current: &InstanceId,
    snapshot: &DirectorySnapshot,
    policy: TiePolicy,
) -> AppResult<GateDecision> {
    let mut running: Vec<&JobInstance> = snapshot.running().collect();
    running.sort_by(|left, right| compare_age(left, right));

    let current_instance = running
        .iter()
        .copied()
        .find(|instance| instance.id() == current)
        .ok_or_else(|| AppError::SelfNotFound {
            job_id: snapshot.job_id().to_string(),
            identity: current.to_string(),
        })?;

    let pending_instances: Vec<InstanceRef> = running
        .iter()
        .copied()
        .filter(|instance| {
            instance.id() != current_instance.id() && policy.blocks(instance, current_instance)
        })
        .map(InstanceRef::from)
        .collect();

    let can_proceed = running
        .first()
        .is_some_and(|oldest| oldest.id() == current);

    if can_proceed != pending_instances.is_empty() {
        let pending = pending_instances
            .iter()
            .map(|pending| format!("{}@{}", pending.identity, pending.start_time.timestamp_millis()))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AppError::InvariantViolation(format!(
            "instance '{current}' of job '{}' (started {}) computed can_proceed={can_proceed} with pending instances [{pending}]",
            snapshot.job_id(),
            current_instance.started_at().timestamp_millis(),
        )));
    }

    Ok(GateDecision {
        can_proceed,
        current_instance: InstanceRef::from(current_instance),
        pending_instances,
    })
}
