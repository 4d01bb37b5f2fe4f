//! In-memory [`JobRepository`] backend.
//!
//! Executions live in [`DashMap`]s so compare-and-swap updates lock a single
//! entry; instance creation and launch checks share one mutex so two
//! concurrent launches of the same identity cannot both pass the restart
//! rules.

use super::{JobRepository, RepositoryError, RepositoryResult};
use crate::logging::log_repository_operation;
use crate::models::{ExecutionContext, JobExecution, JobInstance, JobParameters, StepExecution};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct InstanceTable {
    by_identity: HashMap<(String, String), i64>,
    by_id: HashMap<i64, JobInstance>,
    /// Job execution ids per instance, in creation order
    executions: HashMap<i64, Vec<i64>>,
}

#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    instances: Mutex<InstanceTable>,
    job_executions: DashMap<i64, JobExecution>,
    step_executions: DashMap<i64, StepExecution>,
    instance_ids: AtomicI64,
    job_execution_ids: AtomicI64,
    step_execution_ids: AtomicI64,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(sequence: &AtomicI64) -> i64 {
        sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn find_or_create_instance(
        &self,
        table: &mut InstanceTable,
        job_name: &str,
        parameters: &JobParameters,
    ) -> JobInstance {
        let identity = (job_name.to_string(), parameters.identity_key());
        if let Some(instance) = table
            .by_identity
            .get(&identity)
            .and_then(|id| table.by_id.get(id))
        {
            return instance.clone();
        }

        let instance = JobInstance {
            id: Self::next_id(&self.instance_ids),
            job_name: job_name.to_string(),
            identity_key: identity.1.clone(),
            created_at: Utc::now(),
        };
        table.by_identity.insert(identity, instance.id);
        table.by_id.insert(instance.id, instance.clone());
        table.executions.insert(instance.id, Vec::new());
        debug!(job_name, job_instance_id = instance.id, "Created job instance");
        instance
    }

    fn job_execution_ids(&self, job_instance_id: i64) -> Vec<i64> {
        self.instances
            .lock()
            .executions
            .get(&job_instance_id)
            .cloned()
            .unwrap_or_default()
    }

    fn steps_of(&self, job_execution_id: i64) -> Vec<StepExecution> {
        let mut steps: Vec<StepExecution> = self
            .step_executions
            .iter()
            .filter(|entry| entry.job_execution_id == job_execution_id)
            .map(|entry| entry.value().clone())
            .collect();
        steps.sort_by_key(|step| step.id);
        steps
    }

    /// Context stored by a compare-and-swap update. A terminal execution
    /// keeps its frozen context.
    fn next_context(
        terminal: bool,
        stored: &mut ExecutionContext,
        incoming: &ExecutionContext,
    ) -> ExecutionContext {
        if terminal {
            return std::mem::take(stored);
        }
        let mut context = incoming.clone();
        context.clear_dirty();
        context
    }

    fn load_job_execution(&self, job_execution_id: i64) -> Option<JobExecution> {
        let mut execution = self.job_executions.get(&job_execution_id)?.value().clone();
        execution.step_executions = self.steps_of(job_execution_id);
        Some(execution)
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_job_instance(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<JobInstance> {
        let mut table = self.instances.lock();
        Ok(self.find_or_create_instance(&mut table, job_name, parameters))
    }

    async fn get_job_instance(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<Option<JobInstance>> {
        let table = self.instances.lock();
        let identity = (job_name.to_string(), parameters.identity_key());
        Ok(table
            .by_identity
            .get(&identity)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<JobExecution> {
        let mut table = self.instances.lock();
        let instance = self.find_or_create_instance(&mut table, job_name, parameters);
        let previous = table.executions.get(&instance.id).cloned().unwrap_or_default();

        for id in &previous {
            let Some(prior) = self.job_executions.get(id) else {
                continue;
            };
            if prior.status.is_running() {
                return Err(RepositoryError::JobExecutionAlreadyRunning {
                    job_name: job_name.to_string(),
                    job_instance_id: instance.id,
                });
            }
            if prior.status == crate::state_machine::BatchStatus::Completed {
                return Err(RepositoryError::JobInstanceAlreadyComplete {
                    job_name: job_name.to_string(),
                    job_instance_id: instance.id,
                });
            }
        }

        let mut execution = JobExecution::new(
            Self::next_id(&self.job_execution_ids),
            instance.id,
            job_name,
            parameters.clone(),
        );
        if let Some(last) = previous.last().and_then(|id| self.job_executions.get(id)) {
            execution.execution_context = last.execution_context.clone();
        }
        execution.execution_context.clear_dirty();
        execution.last_updated = Some(Utc::now());

        self.job_executions.insert(execution.id, execution.clone());
        table
            .executions
            .entry(instance.id)
            .or_default()
            .push(execution.id);

        info!(
            job_name,
            job_instance_id = instance.id,
            job_execution_id = execution.id,
            restart = !previous.is_empty(),
            "Created job execution"
        );
        log_repository_operation(
            "create",
            "job_execution",
            Some(execution.id),
            &execution.status.to_string(),
            Some(execution.version),
            None,
        );
        Ok(execution)
    }

    async fn get_job_execution(&self, job_execution_id: i64) -> RepositoryResult<Option<JobExecution>> {
        Ok(self.load_job_execution(job_execution_id))
    }

    async fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<Option<JobExecution>> {
        let Some(instance) = self.get_job_instance(job_name, parameters).await? else {
            return Ok(None);
        };
        Ok(self
            .job_execution_ids(instance.id)
            .last()
            .and_then(|id| self.load_job_execution(*id)))
    }

    async fn update_job_execution(&self, execution: &JobExecution) -> RepositoryResult<i64> {
        let mut stored = self
            .job_executions
            .get_mut(&execution.id)
            .ok_or(RepositoryError::NotFound {
                entity: "job_execution",
                id: execution.id,
            })?;

        if stored.version != execution.version {
            warn!(
                job_execution_id = execution.id,
                expected_version = execution.version,
                actual_version = stored.version,
                "Rejected stale job execution update"
            );
            return Err(RepositoryError::OptimisticLockingFailure {
                entity: "job_execution",
                id: execution.id,
                expected_version: execution.version,
                actual_version: stored.version,
            });
        }

        let context = Self::next_context(
            stored.status.is_terminal(),
            &mut stored.execution_context,
            &execution.execution_context,
        );
        *stored = JobExecution {
            execution_context: context,
            step_executions: Vec::new(),
            version: execution.version + 1,
            last_updated: Some(Utc::now()),
            ..execution.clone()
        };
        Ok(stored.version)
    }

    async fn update_job_execution_context(&self, execution: &JobExecution) -> RepositoryResult<()> {
        let mut stored = self
            .job_executions
            .get_mut(&execution.id)
            .ok_or(RepositoryError::NotFound {
                entity: "job_execution",
                id: execution.id,
            })?;
        if stored.version != execution.version {
            warn!(
                job_execution_id = execution.id,
                expected_version = execution.version,
                actual_version = stored.version,
                "Rejected stale job execution context write"
            );
            return Err(RepositoryError::OptimisticLockingFailure {
                entity: "job_execution",
                id: execution.id,
                expected_version: execution.version,
                actual_version: stored.version,
            });
        }
        if stored.status.is_terminal() {
            return Err(RepositoryError::TerminalExecution {
                entity: "job_execution",
                id: execution.id,
                status: stored.status,
            });
        }
        stored.execution_context = execution.execution_context.clone();
        stored.execution_context.clear_dirty();
        Ok(())
    }

    async fn create_step_execution(
        &self,
        job_execution_id: i64,
        step_name: &str,
    ) -> RepositoryResult<StepExecution> {
        if !self.job_executions.contains_key(&job_execution_id) {
            return Err(RepositoryError::NotFound {
                entity: "job_execution",
                id: job_execution_id,
            });
        }
        let mut execution = StepExecution::new(
            Self::next_id(&self.step_execution_ids),
            job_execution_id,
            step_name,
        );
        execution.last_updated = Some(Utc::now());
        self.step_executions.insert(execution.id, execution.clone());
        debug!(
            job_execution_id,
            step_execution_id = execution.id,
            step_name,
            "Created step execution"
        );
        Ok(execution)
    }

    async fn get_step_execution(&self, step_execution_id: i64) -> RepositoryResult<Option<StepExecution>> {
        Ok(self
            .step_executions
            .get(&step_execution_id)
            .map(|entry| entry.value().clone()))
    }

    async fn update_step_execution(&self, execution: &StepExecution) -> RepositoryResult<i64> {
        let mut stored = self
            .step_executions
            .get_mut(&execution.id)
            .ok_or(RepositoryError::NotFound {
                entity: "step_execution",
                id: execution.id,
            })?;

        if stored.version != execution.version {
            warn!(
                step_execution_id = execution.id,
                expected_version = execution.version,
                actual_version = stored.version,
                "Rejected stale step execution update"
            );
            return Err(RepositoryError::OptimisticLockingFailure {
                entity: "step_execution",
                id: execution.id,
                expected_version: execution.version,
                actual_version: stored.version,
            });
        }

        let context = Self::next_context(
            stored.status.is_terminal(),
            &mut stored.execution_context,
            &execution.execution_context,
        );
        *stored = StepExecution {
            execution_context: context,
            version: execution.version + 1,
            last_updated: Some(Utc::now()),
            ..execution.clone()
        };
        Ok(stored.version)
    }

    async fn update_step_execution_context(&self, execution: &StepExecution) -> RepositoryResult<()> {
        let mut stored = self
            .step_executions
            .get_mut(&execution.id)
            .ok_or(RepositoryError::NotFound {
                entity: "step_execution",
                id: execution.id,
            })?;
        if stored.version != execution.version {
            warn!(
                step_execution_id = execution.id,
                expected_version = execution.version,
                actual_version = stored.version,
                "Rejected stale step execution context write"
            );
            return Err(RepositoryError::OptimisticLockingFailure {
                entity: "step_execution",
                id: execution.id,
                expected_version: execution.version,
                actual_version: stored.version,
            });
        }
        if stored.status.is_terminal() {
            return Err(RepositoryError::TerminalExecution {
                entity: "step_execution",
                id: execution.id,
                status: stored.status,
            });
        }
        stored.execution_context = execution.execution_context.clone();
        stored.execution_context.clear_dirty();
        Ok(())
    }

    async fn find_step_executions(&self, job_execution_id: i64) -> RepositoryResult<Vec<StepExecution>> {
        Ok(self.steps_of(job_execution_id))
    }

    async fn get_last_step_execution(
        &self,
        job_instance_id: i64,
        step_name: &str,
    ) -> RepositoryResult<Option<StepExecution>> {
        let job_executions = self.job_execution_ids(job_instance_id);
        Ok(self
            .step_executions
            .iter()
            .filter(|entry| {
                entry.step_name == step_name && job_executions.contains(&entry.job_execution_id)
            })
            .map(|entry| entry.value().clone())
            .max_by_key(|step| (step.start_time, step.id)))
    }

    async fn get_step_execution_count(&self, job_instance_id: i64, step_name: &str) -> RepositoryResult<u64> {
        let job_executions = self.job_execution_ids(job_instance_id);
        let count = self
            .step_executions
            .iter()
            .filter(|entry| {
                entry.step_name == step_name && job_executions.contains(&entry.job_execution_id)
            })
            .count();
        Ok(count as u64)
    }
}
