use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobguard_application::{ExecutionDirectory, JobLauncher};
use jobguard_core::{AppError, AppResult};
use jobguard_domain::{
    DIRECTORY_MAX_RESULTS, DirectorySnapshot, InstanceId, InstanceStatus, JobId, JobInstance,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredInstance {
    job_id: JobId,
    name: Option<String>,
    input: String,
    instance: JobInstance,
}

/// In-memory execution directory and launcher.
///
/// Snapshots are always current, unlike the real directory.
#[derive(Debug, Default)]
pub struct InMemoryJobRegistry {
    instances: RwLock<Vec<StoredInstance>>,
}

impl InMemoryJobRegistry {
    /// Creates an empty in-memory registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an instance observed elsewhere, with an explicit start time.
    pub async fn insert_instance(
        &self,
        job_id: JobId,
        instance_id: InstanceId,
        started_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut instances = self.instances.write().await;
        if instances
            .iter()
            .any(|stored| stored.instance.id() == &instance_id)
        {
            return Err(AppError::Validation(format!(
                "instance '{instance_id}' already exists"
            )));
        }

        instances.push(StoredInstance {
            job_id,
            name: None,
            input: String::new(),
            instance: JobInstance::running(instance_id, started_at),
        });
        Ok(())
    }

    /// Moves a running instance to a terminal status.
    pub async fn finish_instance(
        &self,
        instance_id: &InstanceId,
        status: InstanceStatus,
    ) -> AppResult<()> {
        if status == InstanceStatus::Running {
            return Err(AppError::Validation(
                "finish_instance requires a terminal status".to_owned(),
            ));
        }

        let mut instances = self.instances.write().await;
        let stored = instances
            .iter_mut()
            .find(|stored| stored.instance.id() == instance_id)
            .ok_or_else(|| {
                AppError::Validation(format!("instance '{instance_id}' does not exist"))
            })?;

        stored.instance = JobInstance::new(
            stored.instance.id().clone(),
            stored.instance.started_at(),
            status,
        );
        Ok(())
    }

    /// Returns the input an instance was started with.
    pub async fn input_of(&self, instance_id: &InstanceId) -> Option<String> {
        self.instances
            .read()
            .await
            .iter()
            .find(|stored| stored.instance.id() == instance_id)
            .map(|stored| stored.input.clone())
    }
}

#[async_trait]
impl ExecutionDirectory for InMemoryJobRegistry {
    async fn list_running(&self, job_id: &JobId) -> AppResult<DirectorySnapshot> {
        let mut running: Vec<JobInstance> = self
            .instances
            .read()
            .await
            .iter()
            .filter(|stored| &stored.job_id == job_id && stored.instance.is_running())
            .map(|stored| stored.instance.clone())
            .collect();
        running.sort_by_key(|instance| std::cmp::Reverse(instance.started_at()));
        running.truncate(DIRECTORY_MAX_RESULTS);

        DirectorySnapshot::new(job_id.clone(), Utc::now(), running)
    }
}

#[async_trait]
impl JobLauncher for InMemoryJobRegistry {
    async fn start(
        &self,
        job_id: &JobId,
        input: &str,
        name: Option<&str>,
    ) -> AppResult<InstanceId> {
        let mut instances = self.instances.write().await;

        if let Some(name) = name
            && instances.iter().any(|stored| {
                &stored.job_id == job_id
                    && stored.instance.is_running()
                    && stored.name.as_deref() == Some(name)
            })
        {
            return Err(AppError::LaunchRejected(format!(
                "job '{job_id}' already has a running instance named '{name}'"
            )));
        }

        let instance_id = InstanceId::new(format!("{job_id}:{}", Uuid::new_v4()))?;
        instances.push(StoredInstance {
            job_id: job_id.clone(),
            name: name.map(ToOwned::to_owned),
            input: input.to_owned(),
            instance: JobInstance::running(instance_id.clone(), Utc::now()),
        });

        Ok(instance_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use jobguard_application::{ExecutionDirectory, JobLauncher};
    use jobguard_core::AppError;
    use jobguard_domain::{InstanceId, InstanceStatus, JobId};

    use super::InMemoryJobRegistry;

    fn job(value: &str) -> JobId {
        JobId::new(value).unwrap_or_else(|_| unreachable!())
    }

    fn instance(value: &str) -> InstanceId {
        InstanceId::new(value).unwrap_or_else(|_| unreachable!())
    }

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
    }

    #[tokio::test]
    async fn directory_lists_running_instances_most_recent_first() {
        let registry = InMemoryJobRegistry::new();
        for (identity, millis) in [("a", 100), ("c", 300), ("b", 200)] {
            let inserted = registry
                .insert_instance(job("sync"), instance(identity), at(millis))
                .await;
            assert!(inserted.is_ok());
        }
        let other = registry
            .insert_instance(job("other"), instance("z"), at(50))
            .await;
        assert!(other.is_ok());

        let finished = registry
            .finish_instance(&instance("b"), InstanceStatus::Succeeded)
            .await;
        assert!(finished.is_ok());

        let snapshot = registry
            .list_running(&job("sync"))
            .await
            .unwrap_or_else(|_| unreachable!());
        let ids: Vec<&str> = snapshot
            .instances()
            .iter()
            .map(|instance| instance.id().as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn launcher_rejects_running_duplicate_name() {
        let registry = InMemoryJobRegistry::new();

        let first = registry
            .start(&job("sync"), "{}", Some("daily"))
            .await
            .unwrap_or_else(|_| unreachable!());
        let duplicate = registry.start(&job("sync"), "{}", Some("daily")).await;
        assert!(matches!(duplicate, Err(AppError::LaunchRejected(_))));

        let other_job = registry.start(&job("audit"), "{}", Some("daily")).await;
        assert!(other_job.is_ok());

        let finished = registry
            .finish_instance(&first, InstanceStatus::Failed)
            .await;
        assert!(finished.is_ok());
        let relaunch = registry.start(&job("sync"), "{}", Some("daily")).await;
        assert!(relaunch.is_ok());
    }

    #[tokio::test]
    async fn launcher_records_input_and_running_status() {
        let registry = InMemoryJobRegistry::new();

        let instance_id = registry
            .start(&job("sync"), "{\"full\":true}", None)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            registry.input_of(&instance_id).await.as_deref(),
            Some("{\"full\":true}")
        );
        let snapshot = registry
            .list_running(&job("sync"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(snapshot.running_count(), 1);
    }

    #[tokio::test]
    async fn finish_requires_terminal_status() {
        let registry = InMemoryJobRegistry::new();
        let instance_id = registry
            .start(&job("sync"), "", None)
            .await
            .unwrap_or_else(|_| unreachable!());

        let result = registry
            .finish_instance(&instance_id, InstanceStatus::Running)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
