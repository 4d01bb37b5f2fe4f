//! # Step Executor
//!
//! Outer control loop of a chunk-oriented step.
//!
//! ## Lifecycle
//!
//! ```text
//! open ──► STARTING ──execute──► STARTED ──► chunks ──► COMPLETED
//!                                   │                 ├► FAILED   (fatal chunk failure)
//!                                   │                 └► UNKNOWN  (state could not be persisted)
//!                                   └─stop─► STOPPING ──► STOPPED
//! ```
//!
//! [`ChunkOrientedStep::open`] creates the step execution in the repository
//! and, when resuming a failed or stopped attempt, copies its counters and
//! execution context. [`StepRun::execute`] then drives chunks until input
//! ends, a stop is observed or a chunk fails.
//!
//! ## Commit sync point
//!
//! Chunks run concurrently under the worker pool but commit one at a time.
//! Inside the sync point a chunk re-checks the step-wide skip limit, commits
//! its transaction, folds its contribution into the counters, advances the
//! checkpoint watermark and persists the step execution with a versioned
//! update.
//!
//! ## Stop requests
//!
//! Between chunks every worker checks the local stop flag and the parent job
//! execution's status in the repository. A job marked `STOPPING` stops the
//! step like a local request. Chunks already running are completed.

use super::chunk::CheckpointWatermark;
use super::chunk_processor::{ChunkOutcome, ChunkProcessor};
use super::chunk_provider::ChunkProvider;
use super::contribution::StepContribution;
use super::listener::{CompositeStepListener, StepListener};
use super::transaction::{ResourcelessTransactionManager, Transaction, TransactionManager};
use super::worker_pool::{run_sequential, ChunkLoopExit, ChunkSignal, ChunkTask, WorkerPool};
use super::StepError;
use crate::config::{ConfigurationError, StepSettings};
use crate::item::{
    FnItemProcessor, ItemError, ItemProcessor, ItemReader, ItemWriter, PassThroughItemProcessor, StepIdentity,
};
use crate::logging::{log_chunk_operation, log_error, log_step_operation};
use crate::models::{ExecutionContext, ExitStatus, JobExecution, StepCounters, StepExecution};
use crate::repository::{JobRepository, RepositoryError};
use crate::resilience::{Classification, Classifier, KindClassifier, RetryController, SkipController};
use crate::state_machine::{BatchStatus, ExecutionEvent, ExecutionStateMachine};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

struct StepCore<I, O> {
    name: String,
    settings: StepSettings,
    provider: ChunkProvider<I>,
    processor: ChunkProcessor<I, O>,
    repository: Arc<dyn JobRepository>,
    transactions: Arc<dyn TransactionManager>,
    listener: CompositeStepListener<I, O>,
}

/// Definition of a chunk-oriented step; cheap to clone and reusable across
/// job executions
pub struct ChunkOrientedStep<I, O> {
    core: Arc<StepCore<I, O>>,
}

impl<I, O> Clone for ChunkOrientedStep<I, O> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<I, O> std::fmt::Debug for ChunkOrientedStep<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkOrientedStep")
            .field("name", &self.core.name)
            .field("settings", &self.core.settings)
            .finish()
    }
}

impl<I, O> ChunkOrientedStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn builder(name: impl Into<String>, repository: Arc<dyn JobRepository>) -> ChunkOrientedStepBuilder<I, O> {
        ChunkOrientedStepBuilder::new(name, repository)
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn settings(&self) -> &StepSettings {
        &self.core.settings
    }

    /// Create the step execution for `job_execution`.
    ///
    /// With a `prior` attempt that did not complete, the new execution starts
    /// from the prior counters and execution context. A prior attempt in
    /// `UNKNOWN` is refused: its outcome was never confirmed.
    #[instrument(skip_all, fields(step_name = %self.core.name, job_execution_id = job_execution.id))]
    pub async fn open(
        &self,
        job_execution: &JobExecution,
        prior: Option<&StepExecution>,
    ) -> Result<StepRun<I, O>, StepError> {
        let core = &self.core;

        if let Some(prior) = prior.filter(|prior| prior.status == BatchStatus::Unknown) {
            return Err(StepError::UnknownPriorExecution {
                step_name: core.name.clone(),
                step_execution_id: prior.id,
            });
        }

        let mut execution = core
            .repository
            .create_step_execution(job_execution.id, &core.name)
            .await?;

        let resumed = prior.filter(|prior| prior.status != BatchStatus::Completed);
        if let Some(prior) = resumed {
            execution.counters = prior.counters;
            execution.execution_context = prior.execution_context.clone();
            execution.version = core.repository.update_step_execution(&execution).await?;
            execution.execution_context.clear_dirty();
            info!(
                step_execution_id = execution.id,
                prior_step_execution_id = prior.id,
                read_count = execution.counters.read_count,
                "Resuming step from prior execution"
            );
        }

        let identity = Arc::new(StepIdentity {
            job_name: job_execution.job_name.clone(),
            job_execution_id: job_execution.id,
            step_name: core.name.clone(),
            step_execution_id: execution.id,
        });

        Ok(StepRun {
            inner: Arc::new(RunInner {
                core: Arc::clone(core),
                identity,
                stop: Arc::new(AtomicBool::new(false)),
                executed: AtomicBool::new(false),
                initial_counters: execution.counters,
                machine: parking_lot::Mutex::new(ExecutionStateMachine::new(format!(
                    "step_execution:{}",
                    execution.id
                ))),
                snapshot: parking_lot::RwLock::new(execution.clone()),
                commit: tokio::sync::Mutex::new(CommitState {
                    execution,
                    watermark: CheckpointWatermark::new(),
                }),
            }),
        })
    }
}

/// Cloneable handle that asks a running step to stop after its current chunks
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct CommitState {
    execution: StepExecution,
    watermark: CheckpointWatermark,
}

struct RunInner<I, O> {
    core: Arc<StepCore<I, O>>,
    identity: Arc<StepIdentity>,
    stop: Arc<AtomicBool>,
    executed: AtomicBool,
    initial_counters: StepCounters,
    machine: parking_lot::Mutex<ExecutionStateMachine>,
    /// Authoritative execution record; also the single commit sync point
    commit: tokio::sync::Mutex<CommitState>,
    /// Last persisted state, readable without waiting for the sync point
    snapshot: parking_lot::RwLock<StepExecution>,
}

/// One execution of a step: the control surface handed to the job layer
pub struct StepRun<I, O> {
    inner: Arc<RunInner<I, O>>,
}

impl<I, O> StepRun<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Run the step to a terminal status.
    ///
    /// Returns `COMPLETED` or `STOPPED`. A step that ends `FAILED` or
    /// `UNKNOWN` returns the error that ended it; the terminal status is then
    /// available from [`StepRun::status`].
    #[instrument(skip(self), fields(step_name = %self.inner.identity.step_name, step_execution_id = self.inner.identity.step_execution_id))]
    pub async fn execute(&self) -> Result<BatchStatus, StepError> {
        if self.inner.executed.swap(true, Ordering::SeqCst) {
            return Err(StepError::AlreadyExecuted);
        }
        let inner = &self.inner;

        let outcome = match inner.start().await {
            Ok(()) => {
                let looped = if inner.core.settings.concurrency_limit > 1 {
                    WorkerPool::new(inner.core.settings.concurrency_limit)
                        .run(Arc::clone(inner))
                        .await
                } else {
                    run_sequential(inner.as_ref()).await
                };
                let closed = inner.close_streams().await;
                match (looped, closed) {
                    (Ok(_), Err(err)) => Err(err),
                    (looped, _) => looped,
                }
            }
            Err(err) => Err(err),
        };

        inner.finish(outcome).await
    }

    /// Ask the step to stop once the chunks currently running have committed
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.inner.stop),
        }
    }

    /// Execution context as of the last persisted update
    pub fn execution_context(&self) -> ExecutionContext {
        self.inner.snapshot.read().execution_context.clone()
    }

    /// Counters as of the last persisted update
    pub fn counters(&self) -> StepCounters {
        self.inner.snapshot.read().counters
    }

    pub fn status(&self) -> BatchStatus {
        self.inner.snapshot.read().status
    }

    pub fn step_execution(&self) -> StepExecution {
        self.inner.snapshot.read().clone()
    }

    pub fn identity(&self) -> &StepIdentity {
        &self.inner.identity
    }
}

impl<I, O> RunInner<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    async fn start(&self) -> Result<(), StepError> {
        let status = self.machine.lock().transition(ExecutionEvent::Start)?;

        let mut state = self.commit.lock().await;
        state.execution.status = status;
        state.execution.start_time = Utc::now();
        self.core
            .listener
            .before_step(&state.execution)
            .await
            .map_err(|e| StepError::listener("before_step", e))?;
        self.persist(&mut state.execution).await?;

        log_step_operation(
            "start",
            Some(self.identity.job_execution_id),
            Some(self.identity.step_execution_id),
            Some(&self.identity.step_name),
            &status.to_string(),
            None,
        );

        let context = state.execution.execution_context.clone();
        drop(state);

        self.core.provider.open(&context).await.map_err(StepError::Stream)?;
        self.core
            .processor
            .writer()
            .open(&context)
            .await
            .map_err(StepError::Stream)?;
        Ok(())
    }

    async fn close_streams(&self) -> Result<(), StepError> {
        let reader = self.core.provider.close().await;
        let writer = self.core.processor.writer().close().await;
        reader.and(writer).map_err(StepError::Stream)
    }

    /// CAS-update the execution together with its context
    async fn persist(&self, execution: &mut StepExecution) -> Result<(), RepositoryError> {
        execution.last_updated = Some(Utc::now());
        execution.version = self.core.repository.update_step_execution(execution).await?;
        execution.execution_context.clear_dirty();
        *self.snapshot.write() = execution.clone();
        Ok(())
    }

    async fn stop_requested(&self) -> Result<bool, StepError> {
        if !self.stop.load(Ordering::SeqCst) {
            let job = self
                .core
                .repository
                .get_job_execution(self.identity.job_execution_id)
                .await?;
            if !job.is_some_and(|job| job.is_stopping()) {
                return Ok(false);
            }
            info!(
                job_execution_id = self.identity.job_execution_id,
                "Parent job execution is stopping, stopping step"
            );
            self.stop.store(true, Ordering::SeqCst);
        }

        let mut machine = self.machine.lock();
        if machine.current_state() != BatchStatus::Stopping {
            machine.transition(ExecutionEvent::RequestStop)?;
        }
        Ok(true)
    }

    async fn run_chunk_inner(&self) -> Result<ChunkSignal, StepError> {
        if self.stop_requested().await? {
            return Ok(ChunkSignal::Stopped);
        }
        if self.core.provider.is_exhausted() {
            return Ok(ChunkSignal::Exhausted);
        }

        let core = &self.core;
        let transaction = core.transactions.begin().await?;
        let committed_skips = self.snapshot.read().counters.skip_count();
        let mut contribution = StepContribution::new();

        let provided = match core
            .provider
            .provide::<O>(
                &self.identity,
                Arc::clone(&transaction),
                committed_skips,
                &core.listener,
                &mut contribution,
            )
            .await
        {
            Ok(Some(provided)) => provided,
            Ok(None) => {
                core.transactions.rollback(&transaction).await?;
                return Ok(ChunkSignal::Exhausted);
            }
            Err(err) => return Err(self.fail_chunk(&transaction, None, contribution, err).await),
        };
        let ctx = provided.context;
        let chunk_id = ctx.chunk_id();

        if let Err(e) = core.listener.before_chunk(&ctx).await {
            let err = StepError::listener("before_chunk", e);
            return Err(self.fail_chunk(&transaction, Some(chunk_id), contribution, err).await);
        }

        let outcome = match core
            .processor
            .process(&provided.chunk, &ctx, committed_skips, &core.listener, &mut contribution)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail_chunk(&transaction, Some(chunk_id), contribution, err).await),
        };

        if let Err(err) = self
            .commit_chunk(&transaction, chunk_id, provided.checkpoint, &mut contribution)
            .await
        {
            return Err(self.fail_chunk(&transaction, Some(chunk_id), contribution, err).await);
        }

        log_chunk_operation(
            "commit",
            self.identity.step_execution_id,
            chunk_id,
            if outcome == ChunkOutcome::Scanned {
                "scanned"
            } else {
                "committed"
            },
            Some(provided.chunk.len() as u64),
            None,
        );

        core.listener
            .after_chunk(&ctx, &contribution)
            .await
            .map_err(|e| StepError::listener("after_chunk", e))?;

        Ok(if provided.chunk.is_end_of_input() {
            ChunkSignal::Exhausted
        } else {
            ChunkSignal::Continue
        })
    }

    async fn commit_chunk(
        &self,
        transaction: &Transaction,
        chunk_id: u64,
        checkpoint: ExecutionContext,
        contribution: &mut StepContribution,
    ) -> Result<(), StepError> {
        let mut state = self.commit.lock().await;

        let skip_limit = self.core.processor.skip_controller().limit();
        let total_skips = state.execution.counters.skip_count() + contribution.skip_count();
        if total_skips > skip_limit {
            if let Some((phase, cause)) = contribution.skips().last() {
                return Err(StepError::SkipLimitExceeded {
                    limit: skip_limit,
                    phase: *phase,
                    source: cause.clone(),
                });
            }
        }

        if transaction.is_active() {
            self.core.transactions.commit(transaction).await?;
        }

        state.execution.counters += contribution.to_counters(true);
        contribution.mark_folded();
        if let Some(latest) = state.watermark.commit(chunk_id, checkpoint) {
            state.execution.execution_context.put_all(&latest);
        }
        let checkpointed_chunks = state.watermark.committed_prefix();

        let CommitState { execution, .. } = &mut *state;
        self.persist(execution).await?;

        debug!(
            chunk_id,
            checkpointed_chunks,
            version = execution.version,
            read_count = execution.counters.read_count,
            write_count = execution.counters.write_count,
            skip_count = execution.counters.skip_count(),
            "Chunk committed"
        );
        Ok(())
    }

    /// Roll back a failed chunk, record the rollback and hand the error back
    async fn fail_chunk(
        &self,
        transaction: &Transaction,
        chunk_id: Option<u64>,
        mut contribution: StepContribution,
        err: StepError,
    ) -> StepError {
        if transaction.is_active() {
            match self.core.transactions.rollback(transaction).await {
                Ok(()) => contribution.rollback_count += 1,
                Err(rollback_err) => warn!(
                    error = %rollback_err,
                    "Rollback of failed chunk did not complete"
                ),
            }
        }

        // A folded contribution is already in the counters
        if !contribution.is_folded() {
            let mut state = self.commit.lock().await;
            state.execution.counters.rollback_count += contribution.rollback_count;
            state.execution.counters.write_count += contribution.isolated_write_count();
        }

        if let Some(chunk_id) = chunk_id {
            log_chunk_operation(
                "rollback",
                self.identity.step_execution_id,
                chunk_id,
                "failed",
                None,
                Some(&err.to_string()),
            );
        }
        self.core.listener.after_chunk_error(&self.identity, &err).await;
        err
    }

    async fn finish(&self, outcome: Result<ChunkLoopExit, StepError>) -> Result<BatchStatus, StepError> {
        let mut state = self.commit.lock().await;

        let (event, mut exit_status) = match &outcome {
            Ok(ChunkLoopExit::Completed) => {
                let before = self.initial_counters;
                let now = state.execution.counters;
                let exit = if now.read_count == before.read_count && now.read_skip_count == before.read_skip_count {
                    ExitStatus::noop()
                } else {
                    ExitStatus::completed()
                };
                (ExecutionEvent::Complete, exit)
            }
            Ok(ChunkLoopExit::Stopped) => (ExecutionEvent::Stopped, ExitStatus::stopped()),
            Err(err) if err.terminal_status() == BatchStatus::Unknown => (
                ExecutionEvent::MarkUnknown(err.to_string()),
                ExitStatus::unknown().with_description(ExitStatus::from_error(err).description),
            ),
            Err(err) => (
                ExecutionEvent::fail_with_error(err.to_string()),
                ExitStatus::from_error(err),
            ),
        };

        let status = {
            let mut machine = self.machine.lock();
            match machine.transition(event) {
                Ok(status) => status,
                Err(transition_err) => {
                    error!(error = %transition_err, "Invalid terminal transition, marking step failed");
                    machine
                        .transition(ExecutionEvent::fail_with_error(transition_err.to_string()))
                        .unwrap_or(BatchStatus::Failed)
                }
            }
        };

        if let Err(err) = &outcome {
            state.execution.add_failure(err.to_string());
        }
        state.execution.status = status;
        state.execution.end_time = Some(Utc::now());
        state.execution.exit_status = exit_status.clone();

        if let Some(listener_exit) = self.core.listener.after_step(&state.execution).await {
            exit_status = exit_status.and(listener_exit);
            state.execution.exit_status = exit_status;
        }

        let CommitState { execution, .. } = &mut *state;
        if let Err(persist_err) = self.persist(execution).await {
            self.mark_unknown(execution, &persist_err).await;
            log_error(
                "step_executor",
                "finish",
                &persist_err.to_string(),
                Some(&execution.summary()),
            );
            return Err(outcome.err().unwrap_or(StepError::Repository(persist_err)));
        }

        log_step_operation(
            "finish",
            Some(self.identity.job_execution_id),
            Some(self.identity.step_execution_id),
            Some(&self.identity.step_name),
            &execution.status.to_string(),
            Some(&execution.summary()),
        );

        match outcome {
            Ok(_) => Ok(execution.status),
            Err(err) => Err(err),
        }
    }

    /// Record UNKNOWN after the final update failed; best effort only
    async fn mark_unknown(&self, execution: &mut StepExecution, cause: &RepositoryError) {
        *self.machine.lock() =
            ExecutionStateMachine::resume(format!("step_execution:{}", execution.id), BatchStatus::Unknown);
        execution.status = BatchStatus::Unknown;
        execution.exit_status = ExitStatus::unknown().with_description(format!("final update failed: {cause}"));
        execution.add_failure(cause.to_string());

        match self.core.repository.update_step_execution(execution).await {
            Ok(version) => execution.version = version,
            Err(err) => warn!(
                step_execution_id = execution.id,
                error = %err,
                "Could not persist UNKNOWN status"
            ),
        }
        *self.snapshot.write() = execution.clone();
    }
}

#[async_trait]
impl<I, O> ChunkTask for RunInner<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    async fn run_chunk(&self) -> Result<ChunkSignal, StepError> {
        self.run_chunk_inner().await
    }
}

/// Builder for [`ChunkOrientedStep`]
pub struct ChunkOrientedStepBuilder<I, O> {
    name: String,
    repository: Arc<dyn JobRepository>,
    settings: StepSettings,
    reader: Option<Box<dyn ItemReader<I>>>,
    processor: Option<Arc<dyn ItemProcessor<I, O>>>,
    writer: Option<Arc<dyn ItemWriter<O>>>,
    retry_classifier: Option<Arc<dyn Classifier>>,
    skip_classifier: Option<Arc<dyn Classifier>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    listener: CompositeStepListener<I, O>,
}

impl<I, O> ChunkOrientedStepBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, repository: Arc<dyn JobRepository>) -> Self {
        Self {
            name: name.into(),
            repository,
            settings: StepSettings::default(),
            reader: None,
            processor: None,
            writer: None,
            retry_classifier: None,
            skip_classifier: None,
            transactions: None,
            listener: CompositeStepListener::new(),
        }
    }

    /// Take every limit from configuration
    pub fn settings(mut self, settings: StepSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn reader(mut self, reader: impl ItemReader<I> + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    pub fn processor(mut self, processor: impl ItemProcessor<I, O> + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn processor_fn<F>(self, func: F) -> Self
    where
        F: Fn(&I) -> Result<Option<O>, ItemError> + Send + Sync + 'static,
    {
        self.processor(FnItemProcessor::new(func))
    }

    pub fn writer(mut self, writer: impl ItemWriter<O> + 'static) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// Writer shared with the caller, for example to inspect it afterwards
    pub fn shared_writer(mut self, writer: Arc<dyn ItemWriter<O>>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.settings.chunk_size = chunk_size;
        self
    }

    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.settings.retry_limit = retry_limit;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.settings.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn skip_limit(mut self, skip_limit: u64) -> Self {
        self.settings.skip_limit = skip_limit;
        self
    }

    pub fn concurrency_limit(mut self, concurrency_limit: usize) -> Self {
        self.settings.concurrency_limit = concurrency_limit;
        self
    }

    pub fn start_limit(mut self, start_limit: u32) -> Self {
        self.settings.start_limit = start_limit;
        self
    }

    pub fn allow_start_if_complete(mut self, allow: bool) -> Self {
        self.settings.allow_start_if_complete = allow;
        self
    }

    pub fn retry_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.retry_classifier = Some(classifier);
        self
    }

    pub fn skip_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.skip_classifier = Some(classifier);
        self
    }

    /// Use one classifier for both retry and skip decisions
    pub fn classifier(self, classifier: Arc<dyn Classifier>) -> Self {
        self.retry_classifier(Arc::clone(&classifier))
            .skip_classifier(classifier)
    }

    pub fn transaction_manager(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn listener(mut self, listener: impl StepListener<I, O> + 'static) -> Self {
        self.listener.register(Arc::new(listener));
        self
    }

    pub fn build(self) -> Result<ChunkOrientedStep<I, O>, ConfigurationError> {
        self.settings.validate()?;

        let reader = self.reader.ok_or_else(|| ConfigurationError::MissingComponent {
            step: self.name.clone(),
            component: "reader",
        })?;
        let processor = self.processor.ok_or_else(|| ConfigurationError::MissingComponent {
            step: self.name.clone(),
            component: "processor",
        })?;
        let writer = self.writer.ok_or_else(|| ConfigurationError::MissingComponent {
            step: self.name.clone(),
            component: "writer",
        })?;

        let fatal: Arc<dyn Classifier> = Arc::new(KindClassifier::uniform(Classification::Fatal));
        let retry_classifier = self.retry_classifier.unwrap_or_else(|| Arc::clone(&fatal));
        let skip_classifier = self.skip_classifier.unwrap_or(fatal);

        let retry = RetryController::new(self.settings.retry_limit, retry_classifier)
            .with_backoff(Duration::from_millis(self.settings.retry_backoff_ms));
        let skip = SkipController::new(self.settings.skip_limit, skip_classifier);
        let transactions = self
            .transactions
            .unwrap_or_else(|| Arc::new(ResourcelessTransactionManager::new()));

        debug!(step_name = %self.name, settings = ?self.settings, "Built chunk-oriented step");

        Ok(ChunkOrientedStep {
            core: Arc::new(StepCore {
                provider: ChunkProvider::new(reader, self.settings.chunk_size, skip.clone()),
                processor: ChunkProcessor::new(processor, writer, retry, skip, Arc::clone(&transactions)),
                name: self.name,
                settings: self.settings,
                repository: self.repository,
                transactions,
                listener: self.listener,
            }),
        })
    }
}

impl<T> ChunkOrientedStepBuilder<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Hand items to the writer unchanged
    pub fn pass_through(self) -> Self {
        self.processor(PassThroughItemProcessor)
    }
}
