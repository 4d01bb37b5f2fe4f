use crate::state_machine::BatchStatus;
use thiserror::Error;

/// Failures raised by an execution-state repository.
///
/// Everything except [`RepositoryError::Storage`] is a business rejection:
/// the repository worked and refused the request. `Storage` means the backend
/// itself failed and the outcome of the call is unknown.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error(
        "Optimistic locking failure on {entity} {id}: expected version {expected_version}, found {actual_version}"
    )]
    OptimisticLockingFailure {
        entity: &'static str,
        id: i64,
        expected_version: i64,
        actual_version: i64,
    },

    #[error("A job execution is already running for job instance {job_instance_id} ({job_name})")]
    JobExecutionAlreadyRunning { job_name: String, job_instance_id: i64 },

    #[error("Job instance {job_instance_id} ({job_name}) already completed; launch with different parameters to run again")]
    JobInstanceAlreadyComplete { job_name: String, job_instance_id: i64 },

    #[error("Job {job_name} is not restartable")]
    JobRestartNotAllowed { job_name: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{entity} {id} is {status}; its execution context can no longer change")]
    TerminalExecution {
        entity: &'static str,
        id: i64,
        status: BatchStatus,
    },

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl RepositoryError {
    /// True when durable storage failed, as opposed to a rejected request
    pub fn is_durability_fault(&self) -> bool {
        matches!(self, RepositoryError::Storage(_))
    }

    pub fn is_optimistic_locking_failure(&self) -> bool {
        matches!(self, RepositoryError::OptimisticLockingFailure { .. })
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
