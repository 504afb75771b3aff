use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use jobguard_core::{AppError, AppResult};
use jobguard_domain::{DirectorySnapshot, InstanceId, JobId, JobInstance, TiePolicy};

use crate::job_ports::ExecutionDirectory;
use crate::retry_policy::RetryPolicy;

use super::{ControlLoop, ControlLoopConfig, ControlLoopState, OldestWinsGateService};

#[derive(Debug, Clone)]
enum DirectoryReply {
    Running(Vec<(&'static str, i64)>),
    Unavailable,
    MissingList,
}

/// Replays scripted replies, repeating the last one once the script runs out.
struct FakeExecutionDirectory {
    replies: Mutex<VecDeque<DirectoryReply>>,
    last: Mutex<Option<DirectoryReply>>,
    calls: Mutex<u32>,
}

impl FakeExecutionDirectory {
    fn scripted(replies: Vec<DirectoryReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    async fn calls(&self) -> u32 {
        *self.calls.lock().await
    }
}

#[async_trait]
impl ExecutionDirectory for FakeExecutionDirectory {
    async fn list_running(&self, job_id: &JobId) -> AppResult<DirectorySnapshot> {
        *self.calls.lock().await += 1;

        let reply = match self.replies.lock().await.pop_front() {
            Some(reply) => {
                *self.last.lock().await = Some(reply.clone());
                reply
            }
            None => self
                .last
                .lock()
                .await
                .clone()
                .ok_or_else(|| AppError::Internal("no scripted reply".to_owned()))?,
        };

        match reply {
            DirectoryReply::Running(entries) => DirectorySnapshot::new(
                job_id.clone(),
                Utc::now(),
                entries
                    .into_iter()
                    .map(|(identity, millis)| {
                        JobInstance::running(instance(identity), at(millis))
                    })
                    .collect(),
            ),
            DirectoryReply::Unavailable => Err(AppError::DirectoryUnavailable(
                "ThrottlingException".to_owned(),
            )),
            DirectoryReply::MissingList => Err(AppError::EmptyDirectoryResponse(
                job_id.as_str().to_owned(),
            )),
        }
    }
}

fn instance(identity: &str) -> InstanceId {
    InstanceId::new(identity).unwrap_or_else(|_| unreachable!())
}

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

fn job() -> JobId {
    JobId::new("billing-export").unwrap_or_else(|_| unreachable!())
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), 2, Duration::from_millis(4))
        .unwrap_or_else(|_| unreachable!())
}

fn fast_loop() -> ControlLoopConfig {
    ControlLoopConfig {
        wait_interval: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn evaluate_grants_oldest_instance() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![("exec-b", 200), ("exec-a", 100)]),
    ]));
    let gate = OldestWinsGateService::new(directory.clone(), fast_retry());

    let decision = gate
        .evaluate(&job(), &instance("exec-a"))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(decision.can_proceed);
    assert!(decision.pending_instances.is_empty());
    assert_eq!(directory.calls().await, 1);
}

#[tokio::test]
async fn evaluate_retries_transient_fetch_failures() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Unavailable,
        DirectoryReply::Unavailable,
        DirectoryReply::Running(vec![("exec-b", 200), ("exec-a", 100)]),
    ]));
    let gate = OldestWinsGateService::new(directory.clone(), fast_retry());

    let decision = gate
        .evaluate(&job(), &instance("exec-b"))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(!decision.can_proceed);
    assert_eq!(decision.pending_instances.len(), 1);
    assert_eq!(directory.calls().await, 3);
}

#[tokio::test]
async fn evaluate_surfaces_exhausted_retries() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Unavailable,
    ]));
    let gate = OldestWinsGateService::new(directory.clone(), fast_retry());

    let result = gate.evaluate(&job(), &instance("exec-a")).await;

    assert!(matches!(result, Err(AppError::DirectoryUnavailable(_))));
    assert_eq!(directory.calls().await, 3);
}

#[tokio::test]
async fn evaluate_does_not_retry_missing_result_list() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::MissingList,
    ]));
    let gate = OldestWinsGateService::new(directory.clone(), fast_retry());

    let result = gate.evaluate(&job(), &instance("exec-a")).await;

    assert!(matches!(result, Err(AppError::EmptyDirectoryResponse(_))));
    assert_eq!(directory.calls().await, 1);
}

#[tokio::test]
async fn evaluate_does_not_retry_self_not_found() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![("exec-b", 200)]),
    ]));
    let gate = OldestWinsGateService::new(directory.clone(), fast_retry());

    let result = gate.evaluate(&job(), &instance("exec-a")).await;

    assert!(matches!(result, Err(AppError::SelfNotFound { .. })));
    assert_eq!(directory.calls().await, 1);
}

#[tokio::test]
async fn strict_tie_policy_fails_loudly_on_simultaneous_start() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![("exec-b", 100), ("exec-a", 100)]),
    ]));
    let gate = OldestWinsGateService::new(directory, fast_retry()).with_tie_policy(TiePolicy::Strict);
    assert_eq!(gate.tie_policy(), TiePolicy::Strict);

    let result = gate.evaluate(&job(), &instance("exec-a")).await;

    assert!(matches!(result, Err(AppError::InvariantViolation(_))));
}

#[tokio::test]
async fn control_loop_waits_until_older_instances_finish() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![("exec-c", 300), ("exec-b", 200), ("exec-a", 100)]),
        DirectoryReply::Running(vec![("exec-c", 300), ("exec-b", 200)]),
        DirectoryReply::Running(vec![("exec-c", 300)]),
    ]));
    let gate = OldestWinsGateService::new(directory.clone(), fast_retry());
    let control_loop = ControlLoop::new(gate, fast_loop(), job(), instance("exec-c"));

    let outcome = control_loop.run().await.unwrap_or_else(|_| unreachable!());

    assert!(outcome.decision.can_proceed);
    assert_eq!(outcome.polls, 3);
    assert_eq!(directory.calls().await, 3);
}

#[tokio::test]
async fn control_loop_steps_through_explicit_states() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![("exec-b", 200), ("exec-a", 100)]),
        DirectoryReply::Running(vec![("exec-b", 200)]),
    ]));
    let gate = OldestWinsGateService::new(directory, fast_retry());
    let mut control_loop = ControlLoop::new(gate, fast_loop(), job(), instance("exec-b"));

    assert_eq!(control_loop.state(), &ControlLoopState::Polling);

    assert!(control_loop.step().await.is_ok());
    assert!(matches!(
        control_loop.state(),
        ControlLoopState::Waiting { last_decision } if last_decision.pending_instances.len() == 1
    ));

    assert!(control_loop.step().await.is_ok());
    assert_eq!(control_loop.state(), &ControlLoopState::Polling);

    assert!(control_loop.step().await.is_ok());
    assert!(matches!(
        control_loop.state(),
        ControlLoopState::Proceeding { .. }
    ));

    assert!(control_loop.step().await.is_ok());
    assert_eq!(control_loop.polls(), 2);
}

#[tokio::test]
async fn control_loop_surfaces_fatal_errors() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![]),
    ]));
    let gate = OldestWinsGateService::new(directory, fast_retry());
    let control_loop = ControlLoop::new(gate, fast_loop(), job(), instance("exec-x"));

    let result = control_loop.run().await;

    assert!(matches!(result, Err(AppError::SelfNotFound { .. })));
}

#[tokio::test]
async fn run_guarded_only_invokes_body_after_admission() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![("exec-b", 200), ("exec-a", 100)]),
        DirectoryReply::Running(vec![("exec-b", 200)]),
    ]));
    let gate = OldestWinsGateService::new(directory.clone(), fast_retry());
    let control_loop = ControlLoop::new(gate, fast_loop(), job(), instance("exec-b"));

    let body_directory = directory.clone();
    let result = control_loop
        .run_guarded(|outcome| async move {
            assert!(outcome.decision.can_proceed);
            Ok(body_directory.calls().await)
        })
        .await;

    assert_eq!(result.ok(), Some(2));
}

#[tokio::test]
async fn waiting_instance_is_cancelled_by_enclosing_timeout() {
    let directory = Arc::new(FakeExecutionDirectory::scripted(vec![
        DirectoryReply::Running(vec![("exec-b", 200), ("exec-a", 100)]),
    ]));
    let gate = OldestWinsGateService::new(directory, fast_retry());
    let control_loop = ControlLoop::new(
        gate,
        ControlLoopConfig {
            wait_interval: Duration::from_secs(60),
        },
        job(),
        instance("exec-b"),
    );

    let result = tokio::time::timeout(Duration::from_millis(20), control_loop.run()).await;

    assert!(result.is_err());
}
