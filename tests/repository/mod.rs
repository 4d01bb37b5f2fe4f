//! Execution-state repository contract, exercised against the in-memory
//! implementation.

use crate::common::*;
use std::collections::HashSet;
use std::sync::Arc;
use stepwise_core::models::{JobParameters, ParameterValue};
use stepwise_core::repository::{InMemoryJobRepository, JobRepository, RepositoryError};
use stepwise_core::BatchStatus;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_from_same_version_have_one_winner() {
    let repository = repository();
    let job = launch(&repository, "cas-job", 1).await;
    let step = repository
        .create_step_execution(job.id, "contended")
        .await
        .expect("step execution");

    let mut writers = tokio::task::JoinSet::new();
    for writer in 0..16u64 {
        let repository = Arc::clone(&repository);
        let mut copy = step.clone();
        writers.spawn(async move {
            copy.counters.write_count = writer + 1;
            repository.update_step_execution(&copy).await
        });
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    while let Some(joined) = writers.join_next().await {
        match joined.expect("writer task") {
            Ok(version) => winners.push(version),
            Err(err) => {
                assert!(err.is_optimistic_locking_failure(), "unexpected error: {err}");
                conflicts += 1;
            }
        }
    }

    assert_eq!(winners, vec![step.version + 1]);
    assert_eq!(conflicts, 15);

    let stored = repository
        .get_step_execution(step.id)
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.version, step.version + 1);
    assert!((1..=16).contains(&stored.counters.write_count));
}

#[tokio::test]
async fn test_stale_job_execution_update_is_rejected() {
    let repository = repository();
    let mut job = launch(&repository, "stale-job", 1).await;
    let stale = job.clone();

    job.status = BatchStatus::Started;
    job.version = repository.update_job_execution(&job).await.expect("update");

    let err = repository
        .update_job_execution(&stale)
        .await
        .expect_err("stale version");
    match err {
        RepositoryError::OptimisticLockingFailure {
            entity,
            expected_version,
            actual_version,
            ..
        } => {
            assert_eq!(entity, "job_execution");
            assert_eq!(expected_version, stale.version);
            assert_eq!(actual_version, job.version);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instance_creation_is_idempotent() {
    let repository = repository();
    let parameters = JobParameters::builder()
        .add_string("region", "eu")
        .add_long("day", 20)
        .build();

    let mut creators = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let repository = Arc::clone(&repository);
        let parameters = parameters.clone();
        creators.spawn(async move { repository.create_job_instance("ingest", &parameters).await });
    }

    let mut ids = HashSet::new();
    while let Some(joined) = creators.join_next().await {
        ids.insert(joined.expect("task").expect("instance").id);
    }
    assert_eq!(ids.len(), 1);

    // Identity ignores insertion order and non-identifying parameters
    let reordered = JobParameters::builder()
        .add_long("day", 20)
        .add_string("region", "eu")
        .add_non_identifying("requested_by", ParameterValue::String("ops".to_string()))
        .build();
    let found = repository
        .get_job_instance("ingest", &reordered)
        .await
        .expect("lookup")
        .expect("same instance");
    assert!(ids.contains(&found.id));

    let other_day = JobParameters::builder()
        .add_string("region", "eu")
        .add_long("day", 21)
        .build();
    assert!(repository
        .get_job_instance("ingest", &other_day)
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn test_launch_refused_while_running() {
    let repository = repository();
    let first = launch(&repository, "busy", 1).await;

    let err = repository
        .create_job_execution("busy", &params(1))
        .await
        .expect_err("still running");
    assert!(matches!(
        err,
        RepositoryError::JobExecutionAlreadyRunning { job_instance_id, .. } if job_instance_id == first.job_instance_id
    ));
}

#[tokio::test]
async fn test_launch_refused_once_complete() {
    let repository = repository();
    let mut job = launch(&repository, "done", 1).await;
    job.status = BatchStatus::Completed;
    repository.update_job_execution(&job).await.expect("complete");

    let err = repository
        .create_job_execution("done", &params(1))
        .await
        .expect_err("already complete");
    assert!(matches!(err, RepositoryError::JobInstanceAlreadyComplete { .. }));

    // Different identifying parameters are a different instance
    repository
        .create_job_execution("done", &params(2))
        .await
        .expect("new instance");
}

#[tokio::test]
async fn test_relaunch_after_failure_inherits_job_context() {
    let repository = repository();
    let mut first = launch(&repository, "retry-later", 1).await;
    first.execution_context.put("cursor", "page-7");
    repository
        .update_job_execution_context(&first)
        .await
        .expect("context");
    first.status = BatchStatus::Failed;
    repository.update_job_execution(&first).await.expect("fail");

    let second = repository
        .create_job_execution("retry-later", &params(1))
        .await
        .expect("relaunch");

    assert_ne!(second.id, first.id);
    assert_eq!(second.job_instance_id, first.job_instance_id);
    assert_eq!(second.execution_context.get_string("cursor"), Some("page-7"));

    let last = repository
        .get_last_job_execution("retry-later", &params(1))
        .await
        .expect("lookup")
        .expect("last execution");
    assert_eq!(last.id, second.id);
}

#[tokio::test]
async fn test_context_frozen_after_terminal_status() {
    let repository = repository();
    let job = launch(&repository, "frozen", 1).await;
    let mut step = repository
        .create_step_execution(job.id, "load")
        .await
        .expect("step execution");

    step.execution_context.put("numbers.read.count", 3_i64);
    repository
        .update_step_execution_context(&step)
        .await
        .expect("context while running");

    step.status = BatchStatus::Completed;
    step.version = repository.update_step_execution(&step).await.expect("complete");

    step.execution_context.put("numbers.read.count", 99_i64);
    let err = repository
        .update_step_execution_context(&step)
        .await
        .expect_err("terminal context is frozen");
    assert!(matches!(
        err,
        RepositoryError::TerminalExecution {
            status: BatchStatus::Completed,
            ..
        }
    ));

    let stored = repository
        .get_step_execution(step.id)
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.execution_context.get_long("numbers.read.count"), Some(3));
}

#[tokio::test]
async fn test_step_queries_span_job_executions() {
    let repository = repository();
    let mut first = launch(&repository, "history", 1).await;
    let mut attempt = repository
        .create_step_execution(first.id, "load")
        .await
        .expect("first attempt");
    attempt.status = BatchStatus::Failed;
    repository.update_step_execution(&attempt).await.expect("fail step");
    first.status = BatchStatus::Failed;
    repository.update_job_execution(&first).await.expect("fail job");

    let second = repository
        .create_job_execution("history", &params(1))
        .await
        .expect("relaunch");
    let retry = repository
        .create_step_execution(second.id, "load")
        .await
        .expect("second attempt");

    assert_eq!(
        repository
            .get_step_execution_count(first.job_instance_id, "load")
            .await
            .expect("count"),
        2
    );
    let last = repository
        .get_last_step_execution(first.job_instance_id, "load")
        .await
        .expect("lookup")
        .expect("last");
    assert_eq!(last.id, retry.id);

    let in_first = repository.find_step_executions(first.id).await.expect("find");
    assert_eq!(in_first.len(), 1);
    assert_eq!(in_first[0].status, BatchStatus::Failed);
}

#[tokio::test]
async fn test_missing_records() {
    let repository = InMemoryJobRepository::new();
    assert!(repository.get_job_execution(404).await.expect("lookup").is_none());
    assert!(matches!(
        repository.create_step_execution(404, "load").await,
        Err(RepositoryError::NotFound {
            entity: "job_execution",
            id: 404
        })
    ));
}

#[tokio::test]
async fn test_stale_writer_cannot_replace_checkpoint() {
    let repository = repository();
    let job = launch(&repository, "checkpointed", 1).await;
    let step = repository
        .create_step_execution(job.id, "load")
        .await
        .expect("step execution");
    let mut stale = step.clone();

    let mut fresh = step;
    fresh.execution_context.put("numbers.read.count", 10_i64);
    fresh.version = repository.update_step_execution(&fresh).await.expect("fresh update");

    stale.execution_context.put("numbers.read.count", 0_i64);
    let err = repository
        .update_step_execution_context(&stale)
        .await
        .expect_err("stale context write");
    assert!(matches!(
        err,
        RepositoryError::OptimisticLockingFailure {
            entity: "step_execution",
            expected_version: 0,
            actual_version: 1,
            ..
        }
    ));
    assert!(repository.update_step_execution(&stale).await.is_err());

    let stored = repository
        .get_step_execution(fresh.id)
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.execution_context.get_long("numbers.read.count"), Some(10));
    assert_eq!(stored.version, 1);

    // Job contexts follow the same rule
    let mut stale_job = job.clone();
    let mut fresh_job = job;
    fresh_job.execution_context.put("load.status", "STARTED");
    repository.update_job_execution(&fresh_job).await.expect("fresh job update");
    stale_job.execution_context.put("load.status", "FAILED");
    assert!(repository
        .update_job_execution_context(&stale_job)
        .await
        .expect_err("stale job context write")
        .is_optimistic_locking_failure());

    let stored_job = repository
        .get_job_execution(fresh_job.id)
        .await
        .expect("lookup")
        .expect("stored job");
    assert_eq!(stored_job.execution_context.get_string("load.status"), Some("STARTED"));
}
