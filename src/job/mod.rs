//! # Job Runner
//!
//! Runs named steps in order inside one job execution.
//!
//! The runner owns the launch and restart rules that sit above a single step:
//!
//! - a job that is not restartable refuses a second execution of the same instance
//! - a step that completed in an earlier execution is skipped unless it allows
//!   starting again
//! - a step that has been started `start_limit` times is refused
//! - a step that did not complete resumes from its last persisted context
//!
//! The first step that does not complete ends the job; the job status is the
//! most severe step status seen. The job-level execution context only records
//! what happened and is never used to position a step.

use crate::config::StepSettings;
use crate::error::{Result, StepwiseError};
use crate::logging::{log_error, log_step_operation};
use crate::models::{ExitStatus, JobExecution, JobParameters, StepExecution};
use crate::repository::{JobRepository, RepositoryError, RepositoryResult};
use crate::state_machine::{BatchStatus, ExecutionEvent, ExecutionStateMachine};
use crate::step::{ChunkOrientedStep, StepError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of running one step inside a job
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub execution: StepExecution,
    /// Error that ended the step, if it did not complete or stop
    pub error: Option<StepError>,
}

/// A step the job runner can drive
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn settings(&self) -> &StepSettings;

    /// Open and execute one step execution.
    ///
    /// `Err` means no execution ran; a failed run is an `Ok` outcome whose
    /// execution carries the terminal status.
    async fn run(
        &self,
        job_execution: &JobExecution,
        prior: Option<&StepExecution>,
    ) -> std::result::Result<StepOutcome, StepError>;
}

#[async_trait]
impl<I, O> Step for ChunkOrientedStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        ChunkOrientedStep::name(self)
    }

    fn settings(&self) -> &StepSettings {
        ChunkOrientedStep::settings(self)
    }

    async fn run(
        &self,
        job_execution: &JobExecution,
        prior: Option<&StepExecution>,
    ) -> std::result::Result<StepOutcome, StepError> {
        let run = self.open(job_execution, prior).await?;
        let error = run.execute().await.err();
        Ok(StepOutcome {
            execution: run.step_execution(),
            error,
        })
    }
}

/// Sequential job made of named steps
pub struct SimpleJob {
    name: String,
    repository: Arc<dyn JobRepository>,
    steps: Vec<Arc<dyn Step>>,
    restartable: bool,
}

impl std::fmt::Debug for SimpleJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleJob")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("restartable", &self.restartable)
            .finish()
    }
}

impl SimpleJob {
    pub fn new(name: impl Into<String>, repository: Arc<dyn JobRepository>) -> Self {
        Self {
            name: name.into(),
            repository,
            steps: Vec::new(),
            restartable: true,
        }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Launch a new execution of the instance identified by `parameters`.
    ///
    /// Launch rejections (already running, already complete, restart not
    /// allowed) are errors. Once the execution exists, step failures end up
    /// in the returned execution's status and exit status instead.
    #[instrument(skip_all, fields(job_name = %self.name))]
    pub async fn run(&self, parameters: &JobParameters) -> Result<JobExecution> {
        if !self.restartable
            && self
                .repository
                .get_last_job_execution(&self.name, parameters)
                .await?
                .is_some()
        {
            return Err(RepositoryError::JobRestartNotAllowed {
                job_name: self.name.clone(),
            }
            .into());
        }

        let mut execution = self
            .repository
            .create_job_execution(&self.name, parameters)
            .await?;
        let mut machine = ExecutionStateMachine::new(format!("job_execution:{}", execution.id));
        execution.status = machine.transition(ExecutionEvent::Start)?;
        execution.start_time = Some(Utc::now());
        execution.version = self.repository.update_job_execution(&execution).await?;

        log_step_operation("job_start", Some(execution.id), None, None, &execution.status.to_string(), None);

        let (status, exit_status) = self.run_steps(&mut execution).await;
        self.finish(execution, machine, status, exit_status).await
    }

    async fn run_steps(&self, execution: &mut JobExecution) -> (BatchStatus, ExitStatus) {
        let mut status = BatchStatus::Completed;
        let mut exit_status = ExitStatus::completed();

        for step in &self.steps {
            match self.is_stopping(execution.id).await {
                Ok(false) => {}
                Ok(true) => {
                    info!(job_execution_id = execution.id, next_step = step.name(), "Job stopping before step");
                    return (BatchStatus::Stopped, ExitStatus::stopped());
                }
                Err(err) => {
                    execution.add_failure(err.to_string());
                    return (BatchStatus::Unknown, ExitStatus::unknown().with_description(err.to_string()));
                }
            }

            let outcome = match self.run_step(step.as_ref(), execution).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(err) => {
                    let status = err.terminal_status();
                    execution.add_failure(err.to_string());
                    execution
                        .execution_context
                        .put(format!("{}.status", step.name()), status.to_string());
                    let exit_status = match status {
                        BatchStatus::Unknown => {
                            ExitStatus::unknown().with_description(ExitStatus::from_error(&err).description)
                        }
                        _ => ExitStatus::from_error(&err),
                    };
                    return (status, exit_status);
                }
            };

            let step_status = outcome.execution.status;
            execution
                .execution_context
                .put(format!("{}.status", step.name()), step_status.to_string());
            if let Some(err) = &outcome.error {
                execution.add_failure(err.to_string());
            }

            status = status.upgrade_to(step_status);
            exit_status = exit_status.and(outcome.execution.exit_status.clone());
            if step_status != BatchStatus::Completed {
                break;
            }
        }
        (status, exit_status)
    }

    /// `Ok(None)` when the step is skipped because it already completed
    async fn run_step(
        &self,
        step: &dyn Step,
        execution: &JobExecution,
    ) -> std::result::Result<Option<StepOutcome>, StepError> {
        let settings = step.settings();
        let last = self
            .repository
            .get_last_step_execution(execution.job_instance_id, step.name())
            .await?;

        if let Some(last) = &last {
            if last.status == BatchStatus::Completed && !settings.allow_start_if_complete {
                info!(
                    step_name = step.name(),
                    prior_step_execution_id = last.id,
                    "Step already completed, skipping"
                );
                return Ok(None);
            }
        }

        let starts = self
            .repository
            .get_step_execution_count(execution.job_instance_id, step.name())
            .await?;
        if starts >= u64::from(settings.start_limit) {
            return Err(StepError::StartLimitExceeded {
                step_name: step.name().to_string(),
                start_limit: settings.start_limit,
            });
        }

        step.run(execution, last.as_ref()).await.map(Some)
    }

    async fn is_stopping(&self, job_execution_id: i64) -> RepositoryResult<bool> {
        Ok(self
            .repository
            .get_job_execution(job_execution_id)
            .await?
            .is_some_and(|job| job.is_stopping()))
    }

    async fn finish(
        &self,
        mut execution: JobExecution,
        mut machine: ExecutionStateMachine,
        status: BatchStatus,
        exit_status: ExitStatus,
    ) -> Result<JobExecution> {
        // A stop request bumped the stored version
        match self.repository.get_job_execution(execution.id).await {
            Ok(Some(current)) => {
                execution.version = current.version;
                if current.is_stopping() {
                    machine =
                        ExecutionStateMachine::resume(format!("job_execution:{}", execution.id), BatchStatus::Stopping);
                }
            }
            Ok(None) => {}
            Err(err) => {
                log_error("job", "finish", &err.to_string(), Some(&self.name));
                self.mark_unknown(&mut execution, &err).await;
                return Err(err.into());
            }
        }

        let status = match status {
            BatchStatus::Completed => machine.transition(ExecutionEvent::Complete)?,
            BatchStatus::Stopped => {
                machine.transition(ExecutionEvent::RequestStop)?;
                machine.transition(ExecutionEvent::Stopped)?
            }
            BatchStatus::Unknown => machine.transition(ExecutionEvent::MarkUnknown(exit_status.description.clone()))?,
            _ => machine.transition(ExecutionEvent::fail_with_error(exit_status.description.clone()))?,
        };

        let persisted = self.persist_final(&mut execution, status, exit_status).await;
        if let Err(err) = persisted {
            log_error("job", "finish", &err.to_string(), Some(&self.name));
            self.mark_unknown(&mut execution, &err).await;
            return Err(err.into());
        }

        log_step_operation(
            "job_finish",
            Some(execution.id),
            None,
            None,
            &execution.status.to_string(),
            Some(&execution.exit_status.code),
        );

        Ok(self
            .repository
            .get_job_execution(execution.id)
            .await?
            .unwrap_or(execution))
    }

    async fn persist_final(
        &self,
        execution: &mut JobExecution,
        status: BatchStatus,
        exit_status: ExitStatus,
    ) -> RepositoryResult<()> {
        execution.status = status;
        execution.exit_status = exit_status;
        execution.end_time = Some(Utc::now());
        // The context is written with the terminal status and freezes with it
        execution.version = self.repository.update_job_execution(execution).await?;
        execution.execution_context.clear_dirty();
        Ok(())
    }

    /// Record UNKNOWN after the final update failed; best effort only
    async fn mark_unknown(&self, execution: &mut JobExecution, cause: &RepositoryError) {
        if let Ok(Some(current)) = self.repository.get_job_execution(execution.id).await {
            execution.version = current.version;
        }
        execution.status = BatchStatus::Unknown;
        execution.exit_status = ExitStatus::unknown().with_description(format!("final update failed: {cause}"));
        execution.add_failure(cause.to_string());
        execution.end_time = Some(Utc::now());

        match self.repository.update_job_execution(execution).await {
            Ok(version) => execution.version = version,
            Err(err) => warn!(
                job_execution_id = execution.id,
                error = %err,
                "Could not persist UNKNOWN status"
            ),
        }
    }
}

/// Mark a running job execution `STOPPING`.
///
/// Steps of the job observe the status between chunks and stop after the
/// chunks in flight commit. Returns `false` when the execution is no longer
/// running.
pub async fn request_stop(repository: &dyn JobRepository, job_execution_id: i64) -> Result<bool> {
    const ATTEMPTS: usize = 3;

    for _ in 0..ATTEMPTS {
        let Some(mut execution) = repository.get_job_execution(job_execution_id).await? else {
            return Err(RepositoryError::NotFound {
                entity: "job_execution",
                id: job_execution_id,
            }
            .into());
        };
        if !execution.is_running() {
            return Ok(false);
        }

        let mut machine = ExecutionStateMachine::resume(format!("job_execution:{job_execution_id}"), execution.status);
        execution.status = machine.transition(ExecutionEvent::RequestStop)?;
        match repository.update_job_execution(&execution).await {
            Ok(_) => {
                info!(job_execution_id, "Stop requested for job execution");
                return Ok(true);
            }
            Err(err) if err.is_optimistic_locking_failure() => {
                warn!(job_execution_id, "Job execution changed while requesting stop, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(StepwiseError::InvalidState(format!(
        "job execution {job_execution_id} kept changing while requesting stop"
    )))
}
