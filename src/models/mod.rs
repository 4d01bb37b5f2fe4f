//! # Execution Records
//!
//! Data model shared by the engine and the execution-state repository:
//! job instances, job and step executions, exit statuses, typed job
//! parameters and the execution context used for checkpointing.

pub mod execution_context;
pub mod exit_status;
pub mod job_execution;
pub mod job_instance;
pub mod job_parameters;
pub mod step_execution;

pub use execution_context::{ContextValue, ExecutionContext};
pub use exit_status::ExitStatus;
pub use job_execution::JobExecution;
pub use job_instance::JobInstance;
pub use job_parameters::{JobParameter, JobParameters, JobParametersBuilder, ParameterValue};
pub use step_execution::{StepCounters, StepExecution};
