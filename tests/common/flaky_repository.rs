use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use stepwise_core::models::{JobExecution, JobInstance, JobParameters, StepExecution};
use stepwise_core::repository::{InMemoryJobRepository, JobRepository, RepositoryError, RepositoryResult};

/// Failure schedule for one kind of update
#[derive(Default)]
struct Injector {
    armed: AtomicBool,
    /// Successful updates left before failures begin
    budget: AtomicI64,
    /// Failures left before updates succeed again
    failures: AtomicI64,
}

impl Injector {
    fn arm(&self, successes: i64, failures: i64) {
        self.budget.store(successes, Ordering::SeqCst);
        self.failures.store(failures, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> RepositoryResult<()> {
        if !self.armed.load(Ordering::SeqCst) || self.budget.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Ok(());
        }
        if self.failures.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(RepositoryError::Storage("injected write failure".to_string()));
        }
        Ok(())
    }
}

/// In-memory repository whose step or job execution updates fail with a
/// storage error after a configurable number of successes
#[derive(Default)]
pub struct FlakyRepository {
    inner: InMemoryJobRepository,
    step_updates: Injector,
    job_updates: Injector,
}

impl FlakyRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Let `successes` more step execution updates through, then fail every one
    pub fn fail_step_updates_after(&self, successes: i64) {
        self.fail_step_updates(successes, i64::MAX);
    }

    /// Let `successes` step updates through, fail the next `failures`, then recover
    pub fn fail_step_updates(&self, successes: i64, failures: i64) {
        self.step_updates.arm(successes, failures);
    }

    /// Same schedule for job execution updates
    pub fn fail_job_updates(&self, successes: i64, failures: i64) {
        self.job_updates.arm(successes, failures);
    }

    pub fn heal(&self) {
        self.step_updates.armed.store(false, Ordering::SeqCst);
        self.job_updates.armed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobRepository for FlakyRepository {
    async fn create_job_instance(&self, job_name: &str, parameters: &JobParameters) -> RepositoryResult<JobInstance> {
        self.inner.create_job_instance(job_name, parameters).await
    }

    async fn get_job_instance(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<Option<JobInstance>> {
        self.inner.get_job_instance(job_name, parameters).await
    }

    async fn create_job_execution(&self, job_name: &str, parameters: &JobParameters) -> RepositoryResult<JobExecution> {
        self.inner.create_job_execution(job_name, parameters).await
    }

    async fn get_job_execution(&self, job_execution_id: i64) -> RepositoryResult<Option<JobExecution>> {
        self.inner.get_job_execution(job_execution_id).await
    }

    async fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<Option<JobExecution>> {
        self.inner.get_last_job_execution(job_name, parameters).await
    }

    async fn update_job_execution(&self, execution: &JobExecution) -> RepositoryResult<i64> {
        self.job_updates.check()?;
        self.inner.update_job_execution(execution).await
    }

    async fn update_job_execution_context(&self, execution: &JobExecution) -> RepositoryResult<()> {
        self.inner.update_job_execution_context(execution).await
    }

    async fn create_step_execution(&self, job_execution_id: i64, step_name: &str) -> RepositoryResult<StepExecution> {
        self.inner.create_step_execution(job_execution_id, step_name).await
    }

    async fn get_step_execution(&self, step_execution_id: i64) -> RepositoryResult<Option<StepExecution>> {
        self.inner.get_step_execution(step_execution_id).await
    }

    async fn update_step_execution(&self, execution: &StepExecution) -> RepositoryResult<i64> {
        self.step_updates.check()?;
        self.inner.update_step_execution(execution).await
    }

    async fn update_step_execution_context(&self, execution: &StepExecution) -> RepositoryResult<()> {
        self.inner.update_step_execution_context(execution).await
    }

    async fn find_step_executions(&self, job_execution_id: i64) -> RepositoryResult<Vec<StepExecution>> {
        self.inner.find_step_executions(job_execution_id).await
    }

    async fn get_last_step_execution(
        &self,
        job_instance_id: i64,
        step_name: &str,
    ) -> RepositoryResult<Option<StepExecution>> {
        self.inner.get_last_step_execution(job_instance_id, step_name).await
    }

    async fn get_step_execution_count(&self, job_instance_id: i64, step_name: &str) -> RepositoryResult<u64> {
        self.inner.get_step_execution_count(job_instance_id, step_name).await
    }
}
