//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod gate;
mod job;
mod snapshot;

pub use gate::{GateDecision, InstanceRef, TiePolicy, compare_age, evaluate_gate};
pub use job::{InstanceId, InstanceStatus, JobId, JobInstance};
pub use snapshot::{DIRECTORY_MAX_RESULTS, DirectorySnapshot};
