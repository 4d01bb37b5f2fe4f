use super::{ExecutionContext, ExitStatus, JobParameters, StepExecution};
use crate::state_machine::BatchStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attempt to run a job instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: i64,
    pub job_instance_id: i64,
    pub job_name: String,
    pub job_parameters: JobParameters,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    /// Optimistic locking version, bumped by every successful repository update
    pub version: i64,
    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub execution_context: ExecutionContext,
    /// Populated when loaded from the repository, ordered by creation
    pub step_executions: Vec<StepExecution>,
    pub failure_exceptions: Vec<String>,
}

impl JobExecution {
    pub fn new(
        id: i64,
        job_instance_id: i64,
        job_name: impl Into<String>,
        job_parameters: JobParameters,
    ) -> Self {
        Self {
            id,
            job_instance_id,
            job_name: job_name.into(),
            job_parameters,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            version: 0,
            create_time: Utc::now(),
            start_time: None,
            end_time: None,
            last_updated: None,
            execution_context: ExecutionContext::new(),
            step_executions: Vec::new(),
            failure_exceptions: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn is_stopping(&self) -> bool {
        self.status == BatchStatus::Stopping
    }

    pub fn add_failure(&mut self, failure: impl Into<String>) {
        self.failure_exceptions.push(failure.into());
    }
}
