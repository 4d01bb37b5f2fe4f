use super::{ExecutionContext, ExitStatus};
use crate::state_machine::BatchStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Progress counters of a step execution.
///
/// Counters only ever grow while the step runs. A restarted step begins from
/// the counters of the execution it resumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounters {
    pub read_count: u64,
    pub write_count: u64,
    /// Items a processor chose to drop, as opposed to error-driven skips
    pub filter_count: u64,
    pub read_skip_count: u64,
    pub process_skip_count: u64,
    pub write_skip_count: u64,
    pub rollback_count: u64,
    pub commit_count: u64,
}

impl StepCounters {
    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.process_skip_count + self.write_skip_count
    }
}

impl AddAssign for StepCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.read_count += rhs.read_count;
        self.write_count += rhs.write_count;
        self.filter_count += rhs.filter_count;
        self.read_skip_count += rhs.read_skip_count;
        self.process_skip_count += rhs.process_skip_count;
        self.write_skip_count += rhs.write_skip_count;
        self.rollback_count += rhs.rollback_count;
        self.commit_count += rhs.commit_count;
    }
}

/// One attempt to run one step within a job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: i64,
    pub job_execution_id: i64,
    pub step_name: String,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    pub counters: StepCounters,
    /// Optimistic locking version, bumped by every successful repository update
    pub version: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub execution_context: ExecutionContext,
    pub failure_exceptions: Vec<String>,
}

impl StepExecution {
    pub fn new(id: i64, job_execution_id: i64, step_name: impl Into<String>) -> Self {
        Self {
            id,
            job_execution_id,
            step_name: step_name.into(),
            status: BatchStatus::Starting,
            exit_status: ExitStatus::executing(),
            counters: StepCounters::default(),
            version: 0,
            start_time: Utc::now(),
            end_time: None,
            last_updated: None,
            execution_context: ExecutionContext::new(),
            failure_exceptions: Vec::new(),
        }
    }

    pub fn skip_count(&self) -> u64 {
        self.counters.skip_count()
    }

    pub fn add_failure(&mut self, failure: impl Into<String>) {
        self.failure_exceptions.push(failure.into());
    }

    /// Human readable summary used in logs and exit descriptions
    pub fn summary(&self) -> String {
        let c = &self.counters;
        format!(
            "{}: status={}, exit={}, read={}, written={}, filtered={}, skipped={} (read={}, process={}, write={}), commits={}, rollbacks={}",
            self.step_name,
            self.status,
            self.exit_status.code,
            c.read_count,
            c.write_count,
            c.filter_count,
            c.skip_count(),
            c.read_skip_count,
            c.process_skip_count,
            c.write_skip_count,
            c.commit_count,
            c.rollback_count
        )
    }
}
