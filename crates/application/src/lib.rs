//! Application services and ports.

#![forbid(unsafe_code)]

mod admission_service;
mod gate_service;
mod job_ports;
mod retry_policy;

pub use admission_service::{
    AdmissionOutcome, AdmissionScheduleReport, DEFAULT_ADMISSION_INTERVAL, QueueGatedAdmitter,
};
pub use gate_service::{
    ControlLoop, ControlLoopConfig, ControlLoopOutcome, ControlLoopState, DEFAULT_WAIT_INTERVAL,
    OldestWinsGateService,
};
pub use job_ports::{AdmissionQueue, AdmissionRequest, ExecutionDirectory, JobLauncher};
pub use retry_policy::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_FIRST_DELAY, DEFAULT_RETRY_MAX_DELAY,
    DEFAULT_RETRY_MULTIPLIER, RetryPolicy,
};
