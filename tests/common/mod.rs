//! Shared doubles for integration tests: item adapters with scripted
//! failures and a repository wrapper that injects storage faults.
#![allow(dead_code)]

pub mod doubles;
pub mod flaky_repository;
pub mod strategies;

pub use doubles::*;
pub use flaky_repository::*;

use std::sync::Arc;
use stepwise_core::models::{JobExecution, JobParameters};
use stepwise_core::repository::{InMemoryJobRepository, JobRepository};

pub fn repository() -> Arc<dyn JobRepository> {
    Arc::new(InMemoryJobRepository::new())
}

pub fn params(run: i64) -> JobParameters {
    JobParameters::builder().add_long("run", run).build()
}

/// Fresh job execution for driving a step directly
pub async fn launch(repository: &Arc<dyn JobRepository>, job_name: &str, run: i64) -> JobExecution {
    repository
        .create_job_execution(job_name, &params(run))
        .await
        .expect("job execution")
}

pub fn numbers(range: std::ops::RangeInclusive<u32>) -> Vec<u32> {
    range.collect()
}
