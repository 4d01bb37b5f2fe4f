//! # Worker Pool
//!
//! Runs chunks of one step run concurrently on a bounded number of tokio
//! tasks. Slots are handed out by a semaphore; a worker keeps its permit for
//! the duration of one chunk.
//!
//! ## Termination
//!
//! - End of input or a stop signal from any worker ends dispatch; chunks
//!   already running finish normally.
//! - The first failure ends dispatch and becomes the pool's result once every
//!   in-flight worker has been joined. Later failures are logged only.

use super::StepError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

/// Result of running a single chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSignal {
    /// More input may remain
    Continue,
    /// The reader reported end of input
    Exhausted,
    /// A stop was requested before the chunk started
    Stopped,
}

/// How the chunk loop of a step run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLoopExit {
    Completed,
    Stopped,
}

/// One unit of work a worker can run repeatedly
#[async_trait]
pub trait ChunkTask: Send + Sync + 'static {
    async fn run_chunk(&self) -> Result<ChunkSignal, StepError>;
}

/// Drive `task` one chunk at a time until input ends or a stop is observed
pub async fn run_sequential<T: ChunkTask + ?Sized>(task: &T) -> Result<ChunkLoopExit, StepError> {
    loop {
        match task.run_chunk().await? {
            ChunkSignal::Continue => continue,
            ChunkSignal::Exhausted => return Ok(ChunkLoopExit::Completed),
            ChunkSignal::Stopped => return Ok(ChunkLoopExit::Stopped),
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    exhausted: bool,
    stopped: bool,
    failure: Option<StepError>,
}

impl PoolState {
    fn is_done(&self) -> bool {
        self.exhausted || self.stopped || self.failure.is_some()
    }

    fn record(&mut self, joined: Result<Result<ChunkSignal, StepError>, JoinError>) {
        match joined {
            Ok(Ok(ChunkSignal::Continue)) => {}
            Ok(Ok(ChunkSignal::Exhausted)) => self.exhausted = true,
            Ok(Ok(ChunkSignal::Stopped)) => self.stopped = true,
            Ok(Err(err)) => self.fail(err),
            Err(join_error) => self.fail(StepError::WorkerPanicked(join_error.to_string())),
        }
    }

    fn fail(&mut self, err: StepError) {
        if self.failure.is_none() {
            error!(error = %err, "Chunk worker failed, stopping dispatch");
            self.failure = Some(err);
        } else {
            warn!(error = %err, "Additional chunk worker failure after step already failing");
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<T: ChunkTask>(&self, task: Arc<T>) -> Result<ChunkLoopExit, StepError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();
        let mut state = PoolState::default();
        let mut dispatched = 0_u64;

        while !state.is_done() {
            tokio::select! {
                biased;
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    state.record(joined);
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    let Ok(permit) = permit else {
                        break;
                    };
                    let task = Arc::clone(&task);
                    dispatched += 1;
                    workers.spawn(async move {
                        let _permit = permit;
                        task.run_chunk().await
                    });
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            state.record(joined);
        }

        debug!(
            concurrency = self.concurrency,
            dispatched,
            exhausted = state.exhausted,
            stopped = state.stopped,
            "Worker pool drained"
        );

        match state.failure {
            Some(err) => Err(err),
            None if state.stopped => Ok(ChunkLoopExit::Stopped),
            None => Ok(ChunkLoopExit::Completed),
        }
    }
}
