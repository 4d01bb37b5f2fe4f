//! # Step Listeners
//!
//! Explicit callback interface for collaborators that need to observe a step
//! run. Every hook has a no-op default, so implementors override only what
//! they use. Step and chunk hooks may fail the step; error and skip hooks
//! are notifications only.

use super::contribution::StepContribution;
use super::StepError;
use crate::item::{ChunkContext, ItemError, StepIdentity};
use crate::models::{ExitStatus, StepExecution};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait StepListener<I, O>: Send + Sync
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    async fn before_step(&self, _step_execution: &StepExecution) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returned exit status is combined with the step's own by severity
    async fn after_step(&self, _step_execution: &StepExecution) -> Option<ExitStatus> {
        None
    }

    /// Called once the chunk's items are read, before they are processed
    async fn before_chunk(&self, _ctx: &ChunkContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the chunk committed
    async fn after_chunk(&self, _ctx: &ChunkContext, _contribution: &StepContribution) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after a chunk rolled back because of `error`
    async fn after_chunk_error(&self, _step: &StepIdentity, _error: &StepError) {}

    async fn on_read_error(&self, _error: &ItemError) {}

    async fn on_skip_in_read(&self, _error: &ItemError) {}

    async fn on_skip_in_process(&self, _item: &I, _error: &ItemError) {}

    async fn on_skip_in_write(&self, _item: &O, _error: &ItemError) {}
}

/// Fans every hook out to the registered listeners in registration order
pub struct CompositeStepListener<I, O> {
    listeners: Vec<Arc<dyn StepListener<I, O>>>,
}

impl<I, O> Default for CompositeStepListener<I, O> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<I, O> std::fmt::Debug for CompositeStepListener<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeStepListener")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<I, O> CompositeStepListener<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn StepListener<I, O>>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[async_trait]
impl<I, O> StepListener<I, O> for CompositeStepListener<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    async fn before_step(&self, step_execution: &StepExecution) -> anyhow::Result<()> {
        for listener in &self.listeners {
            listener.before_step(step_execution).await?;
        }
        Ok(())
    }

    async fn after_step(&self, step_execution: &StepExecution) -> Option<ExitStatus> {
        let mut combined: Option<ExitStatus> = None;
        for listener in &self.listeners {
            if let Some(status) = listener.after_step(step_execution).await {
                combined = Some(match combined {
                    Some(previous) => previous.and(status),
                    None => status,
                });
            }
        }
        combined
    }

    async fn before_chunk(&self, ctx: &ChunkContext) -> anyhow::Result<()> {
        for listener in &self.listeners {
            listener.before_chunk(ctx).await?;
        }
        Ok(())
    }

    async fn after_chunk(&self, ctx: &ChunkContext, contribution: &StepContribution) -> anyhow::Result<()> {
        for listener in &self.listeners {
            listener.after_chunk(ctx, contribution).await?;
        }
        Ok(())
    }

    async fn after_chunk_error(&self, step: &StepIdentity, error: &StepError) {
        for listener in &self.listeners {
            listener.after_chunk_error(step, error).await;
        }
    }

    async fn on_read_error(&self, error: &ItemError) {
        for listener in &self.listeners {
            listener.on_read_error(error).await;
        }
    }

    async fn on_skip_in_read(&self, error: &ItemError) {
        for listener in &self.listeners {
            listener.on_skip_in_read(error).await;
        }
    }

    async fn on_skip_in_process(&self, item: &I, error: &ItemError) {
        for listener in &self.listeners {
            listener.on_skip_in_process(item, error).await;
        }
    }

    async fn on_skip_in_write(&self, item: &O, error: &ItemError) {
        for listener in &self.listeners {
            listener.on_skip_in_write(item, error).await;
        }
    }
}
