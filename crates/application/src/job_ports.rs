mod directory;
mod launcher;
mod queue;

pub use directory::ExecutionDirectory;
pub use launcher::JobLauncher;
pub use queue::{AdmissionQueue, AdmissionRequest};
