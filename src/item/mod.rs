//! # Item Pipeline Adapters
//!
//! The narrow contract the step engine drives: a reader yielding the next
//! item or end of input, a processor transforming or dropping items, and a
//! writer receiving each chunk's output as one ordered batch.
//!
//! ## Access model
//!
//! - [`ItemReader`] methods take `&mut self`. The engine keeps the reader
//!   behind a single lock so reads are mutually exclusive even when chunks
//!   run on several workers, and read order stays the checkpoint order.
//! - [`ItemProcessor`] and [`ItemWriter`] take `&self` and are shared between
//!   concurrently running chunks.
//!
//! ## Checkpoint hooks
//!
//! Readers restore their position in `open` from the step's execution
//! context and record it in `update` after each chunk is read. `close` runs
//! once when the step run ends, whatever the outcome.

pub mod context;
pub mod error;
pub mod support;

pub use context::{ChunkContext, StepIdentity};
pub use error::ItemError;
pub use support::{CollectingItemWriter, FnItemProcessor, ListItemReader, PassThroughItemProcessor};

use crate::models::ExecutionContext;
use async_trait::async_trait;

/// Source of input items
#[async_trait]
pub trait ItemReader<I>: Send
where
    I: Send + 'static,
{
    /// Next item, or `None` once input is exhausted
    async fn read(&mut self, ctx: &ChunkContext) -> Result<Option<I>, ItemError>;

    async fn open(&mut self, _execution_context: &ExecutionContext) -> Result<(), ItemError> {
        Ok(())
    }

    async fn update(&mut self, _execution_context: &mut ExecutionContext) -> Result<(), ItemError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ItemError> {
        Ok(())
    }
}

/// Item transformation. Returning `Ok(None)` filters the item out of the chunk.
#[async_trait]
pub trait ItemProcessor<I, O>: Send + Sync
where
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    async fn process(&self, item: &I, ctx: &ChunkContext) -> Result<Option<O>, ItemError>;
}

/// Sink receiving one chunk's worth of output per call
#[async_trait]
pub trait ItemWriter<O>: Send + Sync
where
    O: Send + Sync + 'static,
{
    async fn write(&self, items: &[O], ctx: &ChunkContext) -> Result<(), ItemError>;

    async fn open(&self, _execution_context: &ExecutionContext) -> Result<(), ItemError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ItemError> {
        Ok(())
    }
}
