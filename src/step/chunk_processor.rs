//! # Chunk Processor
//!
//! Drives one chunk through processing and writing.
//!
//! ## Processing
//!
//! Every item is processed under the retry controller. A processor returning
//! `None` filters the item; a failure that survives retry is either skipped
//! (the item leaves the chunk) or ends the step.
//!
//! ## Writing and scanning
//!
//! The writer receives the whole output in one call. When that call still
//! fails after retry with a failure classified skippable, the chunk
//! transaction is rolled back and the output is rewritten one item at a time, each in its own
//! transaction, to find the item that fails on its own:
//!
//! ```text
//! write([1,2,3]) ✗ ─► rollback ─► write([1]) ✓ commit
//!                                write([2]) ✗ rollback, skip 2
//!                                write([3]) ✓ commit
//! ```
//!
//! Blame is always established by the isolated write. An item that succeeds
//! on its own is written even if it was part of the failed batch, so the scan
//! runs even when the skip budget is already spent; the limit is checked only
//! when an isolated write fails.

use super::chunk::Chunk;
use super::contribution::StepContribution;
use super::listener::StepListener;
use super::transaction::TransactionManager;
use super::StepError;
use crate::item::{ChunkContext, ItemProcessor, ItemWriter};
use crate::resilience::{RetryController, SkipController, SkipDecision, SkipPhase};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the chunk's output reached the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Nothing left to write after processing
    Empty,
    /// One batch write inside the chunk transaction
    Written,
    /// The batch write failed and items were written one by one in their own
    /// transactions; the chunk transaction is already rolled back
    Scanned,
}

pub struct ChunkProcessor<I, O> {
    processor: Arc<dyn ItemProcessor<I, O>>,
    writer: Arc<dyn ItemWriter<O>>,
    retry: RetryController,
    skip: SkipController,
    transactions: Arc<dyn TransactionManager>,
}

impl<I, O> std::fmt::Debug for ChunkProcessor<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkProcessor")
            .field("retry", &self.retry)
            .field("skip", &self.skip)
            .finish()
    }
}

impl<I, O> ChunkProcessor<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(
        processor: Arc<dyn ItemProcessor<I, O>>,
        writer: Arc<dyn ItemWriter<O>>,
        retry: RetryController,
        skip: SkipController,
        transactions: Arc<dyn TransactionManager>,
    ) -> Self {
        Self {
            processor,
            writer,
            retry,
            skip,
            transactions,
        }
    }

    pub fn writer(&self) -> &Arc<dyn ItemWriter<O>> {
        &self.writer
    }

    pub fn skip_controller(&self) -> &SkipController {
        &self.skip
    }

    /// Process and write `chunk` inside the transaction of `ctx`
    pub async fn process(
        &self,
        chunk: &Chunk<I>,
        ctx: &ChunkContext,
        committed_skips: u64,
        listener: &dyn StepListener<I, O>,
        contribution: &mut StepContribution,
    ) -> Result<ChunkOutcome, StepError> {
        let outputs = self
            .transform(chunk, ctx, committed_skips, listener, contribution)
            .await?;
        if outputs.is_empty() {
            return Ok(ChunkOutcome::Empty);
        }
        self.write(&outputs, ctx, committed_skips, listener, contribution)
            .await
    }

    async fn transform(
        &self,
        chunk: &Chunk<I>,
        ctx: &ChunkContext,
        committed_skips: u64,
        listener: &dyn StepListener<I, O>,
        contribution: &mut StepContribution,
    ) -> Result<Vec<O>, StepError> {
        let processor = &*self.processor;
        let mut outputs = Vec::with_capacity(chunk.len());

        for item in chunk.items() {
            let result = self
                .retry
                .attempt("process", move |_| processor.process(item, ctx))
                .await;

            match result {
                Ok((Some(output), _)) => outputs.push(output),
                Ok((None, _)) => contribution.filter_count += 1,
                Err(failure) => {
                    let current = committed_skips + contribution.skip_count();
                    match self.skip.decide(&failure.error, current) {
                        SkipDecision::Skip => {
                            warn!(
                                chunk_id = ctx.chunk_id(),
                                attempts = failure.attempts,
                                retries_exhausted = failure.exhausted,
                                error = %failure.error,
                                "Skipping item that failed processing"
                            );
                            listener.on_skip_in_process(item, &failure.error).await;
                            contribution.record_skip(SkipPhase::Process, failure.error);
                        }
                        SkipDecision::LimitExceeded => {
                            return Err(StepError::SkipLimitExceeded {
                                limit: self.skip.limit(),
                                phase: SkipPhase::Process,
                                source: failure.error,
                            });
                        }
                        SkipDecision::NotSkippable => {
                            return Err(StepError::Fatal {
                                phase: SkipPhase::Process,
                                source: failure.error,
                            });
                        }
                    }
                }
            }
        }
        Ok(outputs)
    }

    async fn write(
        &self,
        outputs: &[O],
        ctx: &ChunkContext,
        committed_skips: u64,
        listener: &dyn StepListener<I, O>,
        contribution: &mut StepContribution,
    ) -> Result<ChunkOutcome, StepError> {
        let writer = &*self.writer;
        let failure = match self
            .retry
            .attempt("write", move |_| writer.write(outputs, ctx))
            .await
        {
            Ok(_) => {
                contribution.write_count += outputs.len() as u64;
                return Ok(ChunkOutcome::Written);
            }
            Err(failure) => failure,
        };

        // Gated on classification only; the scan checks the limit per item
        if !self.skip.is_skippable(&failure.error) {
            return Err(StepError::Fatal {
                phase: SkipPhase::Write,
                source: failure.error,
            });
        }

        info!(
            chunk_id = ctx.chunk_id(),
            items = outputs.len(),
            attempts = failure.attempts,
            retries_exhausted = failure.exhausted,
            error = %failure.error,
            "Chunk write failed, scanning items individually"
        );
        self.transactions.rollback(ctx.transaction()).await?;
        contribution.rollback_count += 1;

        self.scan(outputs, ctx, committed_skips, listener, contribution)
            .await?;
        Ok(ChunkOutcome::Scanned)
    }

    async fn scan(
        &self,
        outputs: &[O],
        ctx: &ChunkContext,
        committed_skips: u64,
        listener: &dyn StepListener<I, O>,
        contribution: &mut StepContribution,
    ) -> Result<(), StepError> {
        let writer = &*self.writer;

        for (index, item) in outputs.iter().enumerate() {
            let transaction = self.transactions.begin().await?;
            let item_ctx = ctx.with_transaction(Arc::clone(&transaction));
            let single = std::slice::from_ref(item);
            let scoped = &item_ctx;

            match self
                .retry
                .attempt("scan", move |_| writer.write(single, scoped))
                .await
            {
                Ok(_) => {
                    self.transactions.commit(&transaction).await?;
                    contribution.record_isolated_write();
                    debug!(chunk_id = ctx.chunk_id(), index, "Scanned item written");
                }
                Err(failure) => {
                    self.transactions.rollback(&transaction).await?;
                    contribution.rollback_count += 1;

                    let current = committed_skips + contribution.skip_count();
                    match self.skip.decide(&failure.error, current) {
                        SkipDecision::Skip => {
                            warn!(
                                chunk_id = ctx.chunk_id(),
                                index,
                                error = %failure.error,
                                "Skipping item that failed an isolated write"
                            );
                            listener.on_skip_in_write(item, &failure.error).await;
                            contribution.record_skip(SkipPhase::Write, failure.error);
                        }
                        SkipDecision::LimitExceeded => {
                            return Err(StepError::SkipLimitExceeded {
                                limit: self.skip.limit(),
                                phase: SkipPhase::Write,
                                source: failure.error,
                            });
                        }
                        SkipDecision::NotSkippable => {
                            return Err(StepError::NonSkippableWrite {
                                chunk_id: ctx.chunk_id(),
                                index,
                                source: failure.error,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
