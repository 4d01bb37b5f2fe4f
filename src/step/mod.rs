//! # Chunk-Oriented Step Engine
//!
//! Runs one step as a series of chunks. Each chunk reads up to `chunk_size`
//! items, processes them, writes the output as one batch and commits inside a
//! single transaction, then reports its counters and checkpoint to the
//! execution-state repository.
//!
//! ## Architecture
//!
//! ```text
//! ChunkOrientedStep::open ──► StepRun::execute
//!                                  │
//!                    ┌─────────────┴──────────────┐
//!                    │ sequential   │ WorkerPool  │
//!                    └─────────────┬──────────────┘
//!                                  ▼  per chunk
//!          begin tx ─► ChunkProvider (read, read-skip, checkpoint)
//!                   ─► ChunkProcessor (process, retry, skip, write, scan)
//!                   ─► commit tx ─► sync point (counters, watermark, CAS update)
//! ```
//!
//! ## Failure handling
//!
//! - Retry and skip are resolved inside the chunk and never escalate unless a
//!   limit is exceeded or the failure is classified fatal.
//! - A fatal chunk failure rolls back the chunk, counts the rollback and fails
//!   the step with the triggering cause attached.
//! - Any failure to persist state moves the step to `UNKNOWN`.

pub mod chunk;
pub mod chunk_processor;
pub mod chunk_provider;
pub mod contribution;
pub mod listener;
pub mod step_executor;
pub mod transaction;
pub mod worker_pool;

pub use chunk::{CheckpointWatermark, Chunk};
pub use chunk_processor::{ChunkOutcome, ChunkProcessor};
pub use chunk_provider::{ChunkProvider, ProvidedChunk};
pub use contribution::StepContribution;
pub use listener::{CompositeStepListener, StepListener};
pub use step_executor::{ChunkOrientedStep, ChunkOrientedStepBuilder, StepRun, StopHandle};
pub use transaction::{
    ResourcelessTransactionManager, Transaction, TransactionError, TransactionManager, TransactionState,
};
pub use worker_pool::{ChunkLoopExit, ChunkSignal, ChunkTask, WorkerPool};

use crate::item::ItemError;
use crate::repository::RepositoryError;
use crate::resilience::SkipPhase;
use crate::state_machine::{BatchStatus, StateMachineError};
use thiserror::Error;

/// Failure that ends a step run
#[derive(Debug, Error, Clone)]
pub enum StepError {
    #[error("Fatal {phase} failure: {source}")]
    Fatal {
        phase: SkipPhase,
        #[source]
        source: ItemError,
    },

    #[error("Skip limit of {limit} exceeded during {phase}: {source}")]
    SkipLimitExceeded {
        limit: u64,
        phase: SkipPhase,
        #[source]
        source: ItemError,
    },

    #[error("Non-skippable write failure for item {index} of chunk {chunk_id}: {source}")]
    NonSkippableWrite {
        chunk_id: u64,
        index: usize,
        #[source]
        source: ItemError,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Item stream failure: {0}")]
    Stream(#[source] ItemError),

    #[error("Step {step_name} reached its start limit of {start_limit}")]
    StartLimitExceeded { step_name: String, start_limit: u32 },

    #[error("Step {step_name} cannot restart from step execution {step_execution_id} with status UNKNOWN")]
    UnknownPriorExecution { step_name: String, step_execution_id: i64 },

    #[error("Worker failed: {0}")]
    WorkerPanicked(String),

    #[error("Listener {hook} failed: {message}")]
    Listener { hook: &'static str, message: String },

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Step run was already executed")]
    AlreadyExecuted,
}

impl StepError {
    /// Terminal status a step ends in when this error stops it
    pub fn terminal_status(&self) -> BatchStatus {
        match self {
            StepError::Repository(_) => BatchStatus::Unknown,
            _ => BatchStatus::Failed,
        }
    }

    /// The item failure behind this error, if any
    pub fn item_error(&self) -> Option<&ItemError> {
        match self {
            StepError::Fatal { source, .. }
            | StepError::SkipLimitExceeded { source, .. }
            | StepError::NonSkippableWrite { source, .. }
            | StepError::Stream(source) => Some(source),
            _ => None,
        }
    }

    pub(crate) fn listener(hook: &'static str, error: anyhow::Error) -> Self {
        StepError::Listener {
            hook,
            message: format!("{error:#}"),
        }
    }
}
