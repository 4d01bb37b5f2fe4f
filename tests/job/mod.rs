//! Job runner: stop requests against a running job execution and restarts
//! across several steps.

use crate::common::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stepwise_core::item::{ChunkContext, ItemError, ItemProcessor, ListItemReader};
use stepwise_core::job;
use stepwise_core::models::ExitStatus;
use stepwise_core::repository::JobRepository;
use stepwise_core::{BatchStatus, ChunkOrientedStep, SimpleJob};

/// Asks the whole job to stop the first time it sees `trigger`
struct StopJobOn {
    trigger: u32,
    repository: Arc<dyn JobRepository>,
    fired: Arc<AtomicBool>,
}

#[async_trait]
impl ItemProcessor<u32, u32> for StopJobOn {
    async fn process(&self, item: &u32, ctx: &ChunkContext) -> Result<Option<u32>, ItemError> {
        if *item == self.trigger && !self.fired.swap(true, Ordering::SeqCst) {
            let stopped = job::request_stop(self.repository.as_ref(), ctx.step().job_execution_id)
                .await
                .map_err(|e| ItemError::other(e.to_string()))?;
            assert!(stopped);
        }
        Ok(Some(*item))
    }
}

fn build_steps(
    repository: &Arc<dyn JobRepository>,
    fired: &Arc<AtomicBool>,
    first_writer: &PoisonWriter,
    second_writer: &PoisonWriter,
) -> SimpleJob {
    let first = ChunkOrientedStep::builder("extract", Arc::clone(repository))
        .reader(ListItemReader::new("extract", numbers(1..=10)))
        .processor(StopJobOn {
            trigger: 3,
            repository: Arc::clone(repository),
            fired: Arc::clone(fired),
        })
        .writer(first_writer.clone())
        .chunk_size(2)
        .build()
        .expect("extract step");
    let second = ChunkOrientedStep::builder("publish", Arc::clone(repository))
        .reader(ListItemReader::new("publish", numbers(100..=102)))
        .pass_through()
        .writer(second_writer.clone())
        .build()
        .expect("publish step");

    SimpleJob::new("stoppable", Arc::clone(repository))
        .step(first)
        .step(second)
}

#[tokio::test]
async fn test_stop_request_stops_job_and_restart_finishes_it() {
    let repository = repository();
    let fired = Arc::new(AtomicBool::new(false));
    let extracted = PoisonWriter::default();
    let published = PoisonWriter::default();

    let stopped = build_steps(&repository, &fired, &extracted, &published)
        .run(&params(1))
        .await
        .expect("first run");

    assert_eq!(stopped.status, BatchStatus::Stopped);
    assert_eq!(stopped.exit_status.code, ExitStatus::STOPPED);
    // The chunk holding the trigger still commits
    assert_eq!(extracted.written(), numbers(1..=4));
    assert!(published.written().is_empty());
    assert_eq!(stopped.step_executions.len(), 1);
    assert_eq!(
        stopped.execution_context.get_string("extract.status"),
        Some("STOPPED")
    );

    let finished = build_steps(&repository, &fired, &extracted, &published)
        .run(&params(1))
        .await
        .expect("restart");

    assert_eq!(finished.status, BatchStatus::Completed);
    assert_eq!(finished.job_instance_id, stopped.job_instance_id);
    assert_eq!(extracted.written(), numbers(1..=10));
    assert_eq!(published.written(), numbers(100..=102));

    let resumed = repository
        .get_last_step_execution(finished.job_instance_id, "extract")
        .await
        .expect("lookup")
        .expect("extract execution");
    assert_eq!(resumed.counters.read_count, 10);
    assert_eq!(resumed.counters.write_count, 10);
}

#[tokio::test]
async fn test_rerunnable_step_runs_again_on_restart() {
    let repository = repository();
    let audit = PoisonWriter::default();
    let load_fails = Arc::new(AtomicBool::new(true));

    let build = |load_fails: Arc<AtomicBool>| {
        let audit_step = ChunkOrientedStep::builder("audit", Arc::clone(&repository))
            .reader(ListItemReader::new("audit", numbers(1..=2)))
            .pass_through()
            .writer(audit.clone())
            .allow_start_if_complete(true)
            .build()
            .expect("audit step");
        let load_step = ChunkOrientedStep::<u32, u32>::builder("load", Arc::clone(&repository))
            .reader(ListItemReader::new("load", numbers(1..=2)))
            .processor_fn(move |item: &u32| {
                if load_fails.load(Ordering::SeqCst) {
                    Err(ItemError::other("target offline"))
                } else {
                    Ok(Some(*item))
                }
            })
            .writer(PoisonWriter::default())
            .build()
            .expect("load step");
        SimpleJob::new("rerun", Arc::clone(&repository))
            .step(audit_step)
            .step(load_step)
    };

    let failed = build(Arc::clone(&load_fails)).run(&params(1)).await.expect("first run");
    assert_eq!(failed.status, BatchStatus::Failed);
    assert_eq!(failed.execution_context.get_string("audit.status"), Some("COMPLETED"));
    assert_eq!(failed.execution_context.get_string("load.status"), Some("FAILED"));

    load_fails.store(false, Ordering::SeqCst);
    let finished = build(Arc::clone(&load_fails)).run(&params(1)).await.expect("restart");

    assert_eq!(finished.status, BatchStatus::Completed);
    assert_eq!(finished.step_executions.len(), 2);
    assert_eq!(audit.written(), vec![1, 2, 1, 2]);
}

#[tokio::test]
async fn test_completed_instance_cannot_run_again() {
    let repository = repository();
    let job = SimpleJob::new("once", Arc::clone(&repository)).step(
        ChunkOrientedStep::builder("copy", Arc::clone(&repository))
            .reader(ListItemReader::new("copy", numbers(1..=3)))
            .pass_through()
            .writer(PoisonWriter::default())
            .build()
            .expect("step"),
    );

    let done = job.run(&params(1)).await.expect("first run");
    assert_eq!(done.status, BatchStatus::Completed);

    let err = job.run(&params(1)).await.expect_err("instance already complete");
    assert!(err.to_string().contains("already completed"), "{err}");
}

#[tokio::test]
async fn test_stop_request_for_unknown_execution() {
    let repository = repository();
    let err = job::request_stop(repository.as_ref(), 77)
        .await
        .expect_err("no such execution");
    assert!(err.to_string().contains("not found"), "{err}");
}

#[tokio::test]
async fn test_failed_final_job_update_records_unknown() {
    let flaky = FlakyRepository::new();
    let repository: Arc<dyn JobRepository> = flaky.clone();
    let parameters = params(5);
    let writer = PoisonWriter::default();
    let job = SimpleJob::new("ledger", Arc::clone(&repository)).step(
        ChunkOrientedStep::builder("post", Arc::clone(&repository))
            .reader(ListItemReader::new("entries", numbers(1..=3)))
            .pass_through()
            .writer(writer.clone())
            .build()
            .expect("step"),
    );

    // The start update goes through, the final one fails, the UNKNOWN record lands
    flaky.fail_job_updates(1, 1);
    let err = job.run(&parameters).await.expect_err("final update fails");
    assert!(err.to_string().contains("injected write failure"), "{err}");
    assert_eq!(writer.written(), numbers(1..=3));

    let stored = repository
        .get_last_job_execution("ledger", &parameters)
        .await
        .expect("lookup")
        .expect("job execution");
    assert_eq!(stored.status, BatchStatus::Unknown);
    assert_eq!(stored.exit_status.code, ExitStatus::UNKNOWN);
    assert!(stored.exit_status.description.contains("final update failed"));
    assert_eq!(stored.step_executions[0].status, BatchStatus::Completed);

    // No longer counted as running, so the instance can be launched again
    let relaunched = job.run(&parameters).await.expect("relaunch");
    assert_eq!(relaunched.status, BatchStatus::Completed);
    assert_eq!(relaunched.job_instance_id, stored.job_instance_id);
    assert_eq!(writer.written(), numbers(1..=3));
}
