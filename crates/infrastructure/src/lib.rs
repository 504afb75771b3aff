//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_execution_directory;
mod in_memory_admission_queue;
mod in_memory_job_registry;
mod postgres_admission_queue;
mod postgres_execution_directory;
mod postgres_job_launcher;

pub use http_execution_directory::HttpExecutionDirectory;
pub use in_memory_admission_queue::InMemoryAdmissionQueue;
pub use in_memory_job_registry::InMemoryJobRegistry;
pub use postgres_admission_queue::PostgresAdmissionQueue;
pub use postgres_execution_directory::PostgresExecutionDirectory;
pub use postgres_job_launcher::PostgresJobLauncher;
