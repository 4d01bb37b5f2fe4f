//! Retry, skip and scan behaviour of a single chunk-oriented step.

use crate::common::*;
use std::sync::Arc;
use stepwise_core::config::FaultToleranceConfig;
use stepwise_core::item::{CollectingItemWriter, ItemError, ListItemReader};
use stepwise_core::models::ExitStatus;
use stepwise_core::resilience::{Classification, Classifier, ErrorKind, KindClassifier, KindHierarchy, SkipPhase};
use stepwise_core::{BatchStatus, ChunkOrientedStep, StepError};

fn data_skippable() -> Arc<dyn Classifier> {
    Arc::new(
        KindClassifier::builder(KindHierarchy::standard())
            .rule(ErrorKind::DATA, Classification::Skippable)
            .build()
            .expect("classifier"),
    )
}

#[tokio::test]
async fn test_write_failure_is_isolated_by_scan() {
    let repository = repository();
    let job = launch(&repository, "scan-job", 1).await;
    let writer = PoisonWriter::new([2]);
    let events = RecordingListener::default();

    let step = ChunkOrientedStep::builder("load", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=3)))
        .pass_through()
        .writer(writer.clone())
        .chunk_size(3)
        .skip_limit(1)
        .skip_classifier(data_skippable())
        .listener(events.clone())
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    let status = run.execute().await.expect("execute");

    assert_eq!(status, BatchStatus::Completed);
    assert_eq!(writer.written(), vec![1, 3]);

    let counters = run.counters();
    assert_eq!(counters.read_count, 3);
    assert_eq!(counters.write_count, 2);
    assert_eq!(counters.write_skip_count, 1);
    assert_eq!(counters.skip_count(), 1);
    // The failed batch plus the failed isolated write of item 2
    assert_eq!(counters.rollback_count, 2);
    // Data chunk plus the empty chunk that observed end of input
    assert_eq!(counters.commit_count, 2);

    assert!(events.events().contains(&"skip_in_write:2".to_string()));

    let stored = repository
        .get_step_execution(run.identity().step_execution_id)
        .await
        .expect("lookup")
        .expect("stored step execution");
    assert_eq!(stored.counters, counters);
    assert_eq!(stored.exit_status.code, ExitStatus::COMPLETED);
}

#[tokio::test]
async fn test_zero_skip_limit_fails_on_first_skippable_error() {
    let repository = repository();
    let job = launch(&repository, "strict-job", 1).await;
    let writer = PoisonWriter::new([2]);

    let step = ChunkOrientedStep::builder("load", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=3)))
        .pass_through()
        .writer(writer.clone())
        .chunk_size(3)
        .skip_limit(0)
        .skip_classifier(data_skippable())
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    let err = run.execute().await.expect_err("skip limit of zero");

    match &err {
        StepError::SkipLimitExceeded { limit, phase, .. } => {
            assert_eq!(*limit, 0);
            assert_eq!(*phase, SkipPhase::Write);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(run.status(), BatchStatus::Failed);

    // The scan still ran: item 1 committed on its own, item 2 hit the limit
    let counters = run.counters();
    assert_eq!(counters.skip_count(), 0);
    assert_eq!(counters.write_count, 1);
    assert_eq!(counters.rollback_count, 2);
    assert_eq!(counters.commit_count, 0);
    assert_eq!(writer.written(), vec![1]);

    let execution = run.step_execution();
    assert_eq!(execution.exit_status.code, ExitStatus::FAILED);
    assert!(!execution.failure_exceptions.is_empty());
}

#[tokio::test]
async fn test_retry_then_skip_from_configured_tables() {
    let repository = repository();
    let job = launch(&repository, "retry-job", 1).await;
    let tables = FaultToleranceConfig {
        retryable: vec!["transient".to_string()],
        skippable: vec!["transient".to_string()],
        ..FaultToleranceConfig::default()
    };
    let processor = CountingProcessor::failing_on([3], |item| ItemError::transient(format!("busy on {item}")));
    let writer = PoisonWriter::default();

    let step = ChunkOrientedStep::builder("transform", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=5)))
        .processor(processor.clone())
        .writer(writer.clone())
        .chunk_size(5)
        .retry_limit(2)
        .skip_limit(1)
        .retry_classifier(Arc::new(tables.retry_classifier().expect("retry classifier")))
        .skip_classifier(Arc::new(tables.skip_classifier().expect("skip classifier")))
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    let status = run.execute().await.expect("execute");

    assert_eq!(status, BatchStatus::Completed);
    assert_eq!(processor.attempts(3), 2);
    assert_eq!(processor.attempts(1), 1);
    assert_eq!(writer.written(), vec![1, 2, 4, 5]);

    let counters = run.counters();
    assert_eq!(counters.process_skip_count, 1);
    assert_eq!(counters.write_count, 4);
    assert_eq!(counters.rollback_count, 0);
}

#[tokio::test]
async fn test_retry_alone_recovers_without_skipping() {
    let repository = repository();
    let job = launch(&repository, "recover-job", 1).await;
    let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let seen = Arc::clone(&attempts);
    let retry = Arc::new(
        KindClassifier::builder(KindHierarchy::standard())
            .rule(ErrorKind::TRANSIENT, Classification::Retryable)
            .build()
            .expect("classifier"),
    );

    let step = ChunkOrientedStep::builder("transform", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=2)))
        .processor_fn(move |item: &u32| {
            if *item == 2 && seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                return Err(ItemError::new(ErrorKind::TIMEOUT, "slow backend"));
            }
            Ok(Some(*item * 10))
        })
        .writer(CollectingItemWriter::new())
        .retry_limit(3)
        .retry_classifier(retry)
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    assert_eq!(run.execute().await.expect("execute"), BatchStatus::Completed);
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(run.counters().skip_count(), 0);
    assert_eq!(run.counters().write_count, 2);
}

#[tokio::test]
async fn test_unreadable_items_are_skipped() {
    let repository = repository();
    let job = launch(&repository, "read-skip-job", 1).await;
    let writer = PoisonWriter::default();
    let events = RecordingListener::default();
    let reader = ScriptedReader::new(
        "rows",
        vec![
            Ok(1),
            Err(ItemError::new(ErrorKind::PARSE, "row 2 is garbled")),
            Ok(3),
            Ok(4),
        ],
    );

    let step = ChunkOrientedStep::builder("import", repository.clone())
        .reader(reader)
        .pass_through()
        .writer(writer.clone())
        .chunk_size(2)
        .skip_limit(5)
        .skip_classifier(data_skippable())
        .listener(events.clone())
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    assert_eq!(run.execute().await.expect("execute"), BatchStatus::Completed);

    assert_eq!(writer.written(), vec![1, 3, 4]);
    let counters = run.counters();
    assert_eq!(counters.read_count, 3);
    assert_eq!(counters.read_skip_count, 1);
    assert!(events
        .events()
        .contains(&"skip_in_read:row 2 is garbled".to_string()));
}

#[tokio::test]
async fn test_non_skippable_read_failure_is_fatal() {
    let repository = repository();
    let job = launch(&repository, "read-fatal-job", 1).await;
    let reader = ScriptedReader::new("rows", vec![Ok(1), Err(ItemError::other("disk gone"))]);

    let step = ChunkOrientedStep::builder("import", repository.clone())
        .reader(reader)
        .pass_through()
        .writer(PoisonWriter::default())
        .skip_limit(5)
        .skip_classifier(data_skippable())
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    let err = run.execute().await.expect_err("fatal read");

    assert!(matches!(err, StepError::Fatal { phase: SkipPhase::Read, .. }));
    assert_eq!(run.status(), BatchStatus::Failed);
    assert_eq!(run.counters().rollback_count, 1);
}

#[tokio::test]
async fn test_filtered_items_are_counted_not_written() {
    let repository = repository();
    let job = launch(&repository, "filter-job", 1).await;
    let writer = CollectingItemWriter::new();

    let step = ChunkOrientedStep::builder("evens", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=6)))
        .processor_fn(|item: &u32| Ok((item % 2 == 0).then_some(*item)))
        .writer(writer.clone())
        .chunk_size(4)
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    assert_eq!(run.execute().await.expect("execute"), BatchStatus::Completed);

    assert_eq!(writer.items(), vec![2, 4, 6]);
    let counters = run.counters();
    assert_eq!(counters.read_count, 6);
    assert_eq!(counters.filter_count, 3);
    assert_eq!(counters.write_count, 3);
    assert_eq!(counters.skip_count(), 0);
}

#[tokio::test]
async fn test_non_skippable_write_during_scan_fails_step() {
    let repository = repository();
    let job = launch(&repository, "scan-fatal-job", 1).await;
    // The batch fails on item 2 with a data error; item 3 alone fails with a resource error
    let writer = PoisonWriter::new([2, 3]).with_error(|item| {
        if item == 2 {
            ItemError::data("row rejected")
        } else {
            ItemError::new(ErrorKind::RESOURCE, "pool exhausted")
        }
    });

    let step = ChunkOrientedStep::builder("load", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=3)))
        .pass_through()
        .writer(writer.clone())
        .chunk_size(3)
        .skip_limit(3)
        .skip_classifier(data_skippable())
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    let err = run.execute().await.expect_err("resource failure is fatal");

    match err {
        StepError::NonSkippableWrite { chunk_id, index, .. } => {
            assert_eq!(chunk_id, 0);
            assert_eq!(index, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(run.status(), BatchStatus::Failed);
    // Item 1 committed in its own transaction before the scan failed
    assert_eq!(writer.written(), vec![1]);
    assert_eq!(run.counters().write_count, 1);
    assert_eq!(run.counters().write_skip_count, 1);
}

#[tokio::test]
async fn test_item_that_writes_alone_is_not_skipped() {
    let repository = repository();
    let job = launch(&repository, "glitch-job", 1).await;
    let writer = PoisonWriter::default().glitch_once([3]);
    let events = RecordingListener::default();

    let step = ChunkOrientedStep::builder("load", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=4)))
        .pass_through()
        .writer(writer.clone())
        .chunk_size(2)
        .skip_limit(1)
        .skip_classifier(data_skippable())
        .listener(events.clone())
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    assert_eq!(run.execute().await.expect("execute"), BatchStatus::Completed);

    assert_eq!(writer.written(), vec![1, 2, 3, 4]);
    let counters = run.counters();
    assert_eq!(counters.write_count, 4);
    assert_eq!(counters.skip_count(), 0);
    assert_eq!(counters.rollback_count, 1);
    assert!(!events.events().iter().any(|event| event.starts_with("skip_in_write")));
}

#[tokio::test]
async fn test_scan_runs_after_skip_budget_is_spent() {
    let repository = repository();
    let job = launch(&repository, "spent-budget-job", 1).await;
    // Item 1 never writes; the batch holding 3 fails once and clears on its own
    let writer = PoisonWriter::new([1]).glitch_once([3]);

    let step = ChunkOrientedStep::builder("load", repository.clone())
        .reader(ListItemReader::new("numbers", numbers(1..=4)))
        .pass_through()
        .writer(writer.clone())
        .chunk_size(2)
        .skip_limit(1)
        .skip_classifier(data_skippable())
        .build()
        .expect("step");

    let run = step.open(&job, None).await.expect("open");
    let status = run.execute().await.expect("execute");

    assert_eq!(status, BatchStatus::Completed);
    assert_eq!(writer.written(), vec![2, 3, 4]);
    let counters = run.counters();
    assert_eq!(counters.write_skip_count, 1);
    assert_eq!(counters.write_count, 3);
    // Both failed batches plus the isolated write of item 1
    assert_eq!(counters.rollback_count, 3);
}
