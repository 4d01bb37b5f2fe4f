//! # Chunk Provider
//!
//! Assembles chunks from the step's reader. The reader sits behind one async
//! mutex: a worker holds it for the whole chunk so the items of one chunk are
//! contiguous in read order, chunk ids follow read order, and the checkpoint
//! captured right after reading matches exactly the items handed out so far.
//!
//! Read failures are never retried; re-reading would return the next item
//! rather than the failed one. They are either skipped or fatal.

use super::chunk::Chunk;
use super::contribution::StepContribution;
use super::listener::StepListener;
use super::transaction::Transaction;
use super::StepError;
use crate::item::{ChunkContext, ItemError, ItemReader, StepIdentity};
use crate::models::ExecutionContext;
use crate::resilience::{SkipController, SkipDecision, SkipPhase};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct ReaderState<I> {
    reader: Box<dyn ItemReader<I>>,
    next_chunk_id: u64,
}

/// A chunk together with the context it was read under and the reader
/// position right after it
#[derive(Debug)]
pub struct ProvidedChunk<I> {
    pub chunk: Chunk<I>,
    pub context: ChunkContext,
    pub checkpoint: ExecutionContext,
}

pub struct ChunkProvider<I> {
    state: Mutex<ReaderState<I>>,
    exhausted: AtomicBool,
    chunk_size: usize,
    skip: SkipController,
}

impl<I> std::fmt::Debug for ChunkProvider<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkProvider")
            .field("chunk_size", &self.chunk_size)
            .field("exhausted", &self.exhausted.load(Ordering::SeqCst))
            .finish()
    }
}

impl<I> ChunkProvider<I>
where
    I: Send + Sync + 'static,
{
    pub fn new(reader: Box<dyn ItemReader<I>>, chunk_size: usize, skip: SkipController) -> Self {
        Self {
            state: Mutex::new(ReaderState {
                reader,
                next_chunk_id: 0,
            }),
            exhausted: AtomicBool::new(false),
            chunk_size: chunk_size.max(1),
            skip,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// True once the reader reported end of input for the current run
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Restore the reader from the resumed execution context and reset chunk numbering
    pub async fn open(&self, execution_context: &ExecutionContext) -> Result<(), ItemError> {
        let mut state = self.state.lock().await;
        state.reader.open(execution_context).await?;
        state.next_chunk_id = 0;
        self.exhausted.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn close(&self) -> Result<(), ItemError> {
        self.state.lock().await.reader.close().await
    }

    /// Read the next chunk.
    ///
    /// Returns `None` without reading when another worker already hit end of
    /// input. `committed_skips` is the step-wide skip count already committed;
    /// skips made here are recorded on `contribution`.
    pub async fn provide<O>(
        &self,
        step: &Arc<StepIdentity>,
        transaction: Arc<Transaction>,
        committed_skips: u64,
        listener: &dyn StepListener<I, O>,
        contribution: &mut StepContribution,
    ) -> Result<Option<ProvidedChunk<I>>, StepError>
    where
        O: Send + Sync + 'static,
    {
        let mut state = self.state.lock().await;
        if self.is_exhausted() {
            return Ok(None);
        }

        let chunk_id = state.next_chunk_id;
        state.next_chunk_id += 1;
        let context = ChunkContext::new(Arc::clone(step), chunk_id, transaction);

        let mut items = Vec::with_capacity(self.chunk_size);
        let mut end_of_input = false;
        while items.len() < self.chunk_size {
            match state.reader.read(&context).await {
                Ok(Some(item)) => {
                    contribution.read_count += 1;
                    items.push(item);
                }
                Ok(None) => {
                    end_of_input = true;
                    self.exhausted.store(true, Ordering::SeqCst);
                    break;
                }
                Err(error) => {
                    listener.on_read_error(&error).await;
                    let current = committed_skips + contribution.skip_count();
                    match self.skip.decide(&error, current) {
                        SkipDecision::Skip => {
                            warn!(
                                step_name = %step.step_name,
                                chunk_id,
                                error = %error,
                                "Skipping unreadable item"
                            );
                            listener.on_skip_in_read(&error).await;
                            contribution.record_skip(SkipPhase::Read, error);
                        }
                        SkipDecision::LimitExceeded => {
                            return Err(StepError::SkipLimitExceeded {
                                limit: self.skip.limit(),
                                phase: SkipPhase::Read,
                                source: error,
                            });
                        }
                        SkipDecision::NotSkippable => {
                            return Err(StepError::Fatal {
                                phase: SkipPhase::Read,
                                source: error,
                            });
                        }
                    }
                }
            }
        }

        let mut checkpoint = ExecutionContext::new();
        state
            .reader
            .update(&mut checkpoint)
            .await
            .map_err(StepError::Stream)?;

        debug!(
            step_name = %step.step_name,
            chunk_id,
            items = items.len(),
            end_of_input,
            "Chunk read"
        );

        Ok(Some(ProvidedChunk {
            chunk: Chunk::new(chunk_id, items, end_of_input),
            context,
            checkpoint,
        }))
    }
}
