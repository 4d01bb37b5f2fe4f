//! # Execution-State Repository
//!
//! Durable record of job instances, job executions and step executions, and
//! the checkpoint contexts attached to them. The step engine reports every
//! chunk boundary here and restarts read their resume point from here.
//!
//! ## Contract
//!
//! - Instance creation is idempotent per job name and identifying parameters.
//! - Execution updates are compare-and-swap on the `version` field: the
//!   caller passes the version it last saw, the repository bumps it by
//!   exactly one on success and rejects stale versions with
//!   [`RepositoryError::OptimisticLockingFailure`].
//! - A compare-and-swap update stores the execution context together with the
//!   record, so a rejected writer never leaves its checkpoint behind.
//! - Standalone context writes carry the same version check without bumping
//!   the version. Contexts are replaced wholesale and are frozen once the
//!   owning execution reaches a terminal status.
//! - Every operation may fail with [`RepositoryError::Storage`]; callers must
//!   never read that as success.
//!
//! Only the in-memory backend ships with the crate; durable backends
//! implement [`JobRepository`] themselves.
//!
//! ```rust
//! use stepwise_core::models::JobParameters;
//! use stepwise_core::repository::{InMemoryJobRepository, JobRepository};
//!
//! # tokio_test::block_on(async {
//! let repository = InMemoryJobRepository::new();
//! let params = JobParameters::builder().add_string("file", "orders.csv").build();
//!
//! let execution = repository.create_job_execution("import", &params).await.unwrap();
//! let step = repository.create_step_execution(execution.id, "load").await.unwrap();
//!
//! // A second writer holding the same version loses the race
//! let version = repository.update_step_execution(&step).await.unwrap();
//! assert_eq!(version, step.version + 1);
//! assert!(repository.update_step_execution(&step).await.is_err());
//! # });
//! ```

pub mod errors;
pub mod in_memory;

pub use errors::{RepositoryError, RepositoryResult};
pub use in_memory::InMemoryJobRepository;

use crate::models::{JobExecution, JobInstance, JobParameters, StepExecution};
use async_trait::async_trait;

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Existing instance for the identity, or a new one
    async fn create_job_instance(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<JobInstance>;

    async fn get_job_instance(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<Option<JobInstance>>;

    /// New execution attempt for the identity, creating the instance if needed.
    ///
    /// Fails with `JobExecutionAlreadyRunning` while any earlier attempt is
    /// still running and with `JobInstanceAlreadyComplete` once one attempt
    /// completed. A restart attempt starts from the last attempt's job context.
    async fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<JobExecution>;

    /// Execution with its step executions attached
    async fn get_job_execution(&self, job_execution_id: i64) -> RepositoryResult<Option<JobExecution>>;

    async fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> RepositoryResult<Option<JobExecution>>;

    /// Compare-and-swap update of the record and its context; returns the new version
    async fn update_job_execution(&self, execution: &JobExecution) -> RepositoryResult<i64>;

    /// Replace the stored context. Rejects a stale `version` and terminal executions.
    async fn update_job_execution_context(&self, execution: &JobExecution) -> RepositoryResult<()>;

    async fn create_step_execution(
        &self,
        job_execution_id: i64,
        step_name: &str,
    ) -> RepositoryResult<StepExecution>;

    async fn get_step_execution(&self, step_execution_id: i64) -> RepositoryResult<Option<StepExecution>>;

    /// Compare-and-swap update of the record and its context; returns the new
    /// version. A terminal execution keeps its stored context.
    async fn update_step_execution(&self, execution: &StepExecution) -> RepositoryResult<i64>;

    /// Replace the stored context. Rejects a stale `version` and terminal executions.
    async fn update_step_execution_context(&self, execution: &StepExecution) -> RepositoryResult<()>;

    /// Step executions of one job execution in creation order
    async fn find_step_executions(&self, job_execution_id: i64) -> RepositoryResult<Vec<StepExecution>>;

    /// Most recently started execution of `step_name` across every attempt of the instance
    async fn get_last_step_execution(
        &self,
        job_instance_id: i64,
        step_name: &str,
    ) -> RepositoryResult<Option<StepExecution>>;

    async fn get_step_execution_count(&self, job_instance_id: i64, step_name: &str) -> RepositoryResult<u64>;
}
