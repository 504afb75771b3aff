use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jobguard_core::{AppError, AppResult};
use jobguard_domain::{InstanceId, JobId};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::job_ports::{AdmissionQueue, ExecutionDirectory, JobLauncher};
use crate::retry_policy::RetryPolicy;

/// Default cadence between two admission cycles.
pub const DEFAULT_ADMISSION_INTERVAL: Duration = Duration::from_secs(60);

/// Result of one admission cycle. None of these are failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// No visible message was waiting.
    QueueEmpty,
    /// An instance is already running; the message stays queued.
    Deferred {
        /// Message left in the queue.
        message_id: String,
        /// Running instances reported by the directory.
        running_instances: usize,
    },
    /// A new instance was started and the message deleted.
    Launched {
        /// Message that was consumed.
        message_id: String,
        /// Identity of the new instance.
        instance_id: InstanceId,
    },
    /// The launch name already belonged to a running instance; the message
    /// stays queued and is redelivered after its visibility timeout.
    LaunchRaceLost {
        /// Message left in the queue.
        message_id: String,
    },
}

impl AdmissionOutcome {
    /// Returns stable outcome label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueEmpty => "queue_empty",
            Self::Deferred { .. } => "deferred",
            Self::Launched { .. } => "launched",
            Self::LaunchRaceLost { .. } => "launch_race_lost",
        }
    }
}

/// Totals for a run of scheduled admission cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionScheduleReport {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles that launched an instance.
    pub launched: u64,
    /// Cycles that left their message queued.
    pub deferred: u64,
    /// Cycles that found no message.
    pub empty: u64,
    /// Cycles that lost a launch race.
    pub races_lost: u64,
    /// Cycles that ended with an error.
    pub failed: u64,
}

impl AdmissionScheduleReport {
    fn record(&mut self, result: &AppResult<AdmissionOutcome>) {
        self.cycles = self.cycles.saturating_add(1);
        let counter = match result {
            Ok(AdmissionOutcome::QueueEmpty) => &mut self.empty,
            Ok(AdmissionOutcome::Deferred { .. }) => &mut self.deferred,
            Ok(AdmissionOutcome::Launched { .. }) => &mut self.launched,
            Ok(AdmissionOutcome::LaunchRaceLost { .. }) => &mut self.races_lost,
            Err(_) => &mut self.failed,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Admits queued start requests only while no instance of the job is running.
#[derive(Clone)]
pub struct QueueGatedAdmitter {
    job_id: JobId,
    queue: Arc<dyn AdmissionQueue>,
    directory: Arc<dyn ExecutionDirectory>,
    launcher: Arc<dyn JobLauncher>,
    retry_policy: RetryPolicy,
}

impl QueueGatedAdmitter {
    /// Creates an admitter for one job.
    #[must_use]
    pub fn new(
        job_id: JobId,
        queue: Arc<dyn AdmissionQueue>,
        directory: Arc<dyn ExecutionDirectory>,
        launcher: Arc<dyn JobLauncher>,
    ) -> Self {
        Self {
            job_id,
            queue,
            directory,
            launcher,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy used for the directory fetch.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the job this admitter guards.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Processes at most one admission request end to end.
    ///
    /// The request is deleted only after a successful launch, so a crash in
    /// between leads to redelivery; the launch name is the idempotency key
    /// that limits the duplicate. Queue calls and the directory fetch are
    /// retried on transient failures.
    pub async fn run_cycle(&self) -> AppResult<AdmissionOutcome> {
        let Some(request) = self
            .retry_policy
            .run("receive_one", || self.queue.receive_one())
            .await?
        else {
            debug!(job_id = %self.job_id, "admission queue empty");
            return Ok(AdmissionOutcome::QueueEmpty);
        };

        let snapshot = self
            .retry_policy
            .run("list_running", || self.directory.list_running(&self.job_id))
            .await?;

        let running_instances = snapshot.running_count();
        if running_instances > 0 {
            info!(
                job_id = %self.job_id,
                message_id = %request.message_id,
                running_instances,
                "instance already running, leaving request queued"
            );
            return Ok(AdmissionOutcome::Deferred {
                message_id: request.message_id,
                running_instances,
            });
        }

        let launch = self
            .launcher
            .start(&self.job_id, request.payload.as_str(), request.name.as_deref())
            .await;

        match launch {
            Ok(instance_id) => {
                self.retry_policy
                    .run("delete_request", || self.queue.delete(&request))
                    .await?;
                info!(
                    job_id = %self.job_id,
                    message_id = %request.message_id,
                    instance_id = %instance_id,
                    "admitted queued request"
                );
                Ok(AdmissionOutcome::Launched {
                    message_id: request.message_id,
                    instance_id,
                })
            }
            Err(AppError::LaunchRejected(reason)) => {
                warn!(
                    job_id = %self.job_id,
                    message_id = %request.message_id,
                    name = request.name.as_deref().unwrap_or_default(),
                    reason = %reason,
                    "launch name already running, request left for redelivery"
                );
                Ok(AdmissionOutcome::LaunchRaceLost {
                    message_id: request.message_id,
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Runs one cycle per `interval` until `shutdown` resolves.
    ///
    /// A failed cycle is logged and counted; the next tick starts a fresh one.
    pub async fn run_schedule<S>(&self, interval: Duration, shutdown: S) -> AdmissionScheduleReport
    where
        S: Future<Output = ()>,
    {
        let mut report = AdmissionScheduleReport::default();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    let result = self.run_cycle().await;
                    match &result {
                        Ok(outcome) => debug!(
                            job_id = %self.job_id,
                            outcome = outcome.as_str(),
                            "admission cycle finished"
                        ),
                        Err(error) => warn!(
                            job_id = %self.job_id,
                            error = %error,
                            "admission cycle failed"
                        ),
                    }
                    report.record(&result);
                }
            }
        }

        info!(
            job_id = %self.job_id,
            cycles = report.cycles,
            launched = report.launched,
            deferred = report.deferred,
            failed = report.failed,
            "admission schedule stopped"
        );
        report
    }
}
