//! Ready-made adapters for simple steps and tests.

use super::{ChunkContext, ItemError, ItemProcessor, ItemReader, ItemWriter};
use crate::models::ExecutionContext;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Restartable reader over an in-memory list.
///
/// The position is saved under `<name>.read.count` so a restarted step
/// continues after the last committed item.
#[derive(Debug, Clone)]
pub struct ListItemReader<T> {
    name: String,
    items: Vec<T>,
    position: usize,
}

impl<T> ListItemReader<T> {
    pub fn new(name: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            name: name.into(),
            items,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn position_key(&self) -> String {
        format!("{}.read.count", self.name)
    }
}

#[async_trait]
impl<T> ItemReader<T> for ListItemReader<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn read(&mut self, _ctx: &ChunkContext) -> Result<Option<T>, ItemError> {
        let item = self.items.get(self.position).cloned();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    async fn open(&mut self, execution_context: &ExecutionContext) -> Result<(), ItemError> {
        let key = self.position_key();
        self.position = match execution_context.get_long(&key) {
            Some(count) if count < 0 => {
                return Err(ItemError::data(format!("negative restart position {count} under {key}")));
            }
            Some(count) => usize::try_from(count).unwrap_or(usize::MAX).min(self.items.len()),
            None => 0,
        };
        debug!(reader = %self.name, position = self.position, "Reader opened");
        Ok(())
    }

    async fn update(&mut self, execution_context: &mut ExecutionContext) -> Result<(), ItemError> {
        let position = i64::try_from(self.position)
            .map_err(|_| ItemError::other(format!("reader position {} out of range", self.position)))?;
        execution_context.put(self.position_key(), position);
        Ok(())
    }
}

/// Processor that hands every item through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughItemProcessor;

#[async_trait]
impl<T> ItemProcessor<T, T> for PassThroughItemProcessor
where
    T: Clone + Send + Sync + 'static,
{
    async fn process(&self, item: &T, _ctx: &ChunkContext) -> Result<Option<T>, ItemError> {
        Ok(Some(item.clone()))
    }
}

/// Processor backed by a synchronous closure
pub struct FnItemProcessor<F> {
    func: F,
}

impl<F> FnItemProcessor<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<I, O, F> ItemProcessor<I, O> for FnItemProcessor<F>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
    F: Fn(&I) -> Result<Option<O>, ItemError> + Send + Sync,
{
    async fn process(&self, item: &I, _ctx: &ChunkContext) -> Result<Option<O>, ItemError> {
        (self.func)(item)
    }
}

/// Writer that publishes items only when the enclosing transaction commits.
///
/// Writes inside a transaction that later rolls back never become visible.
#[derive(Debug, Clone)]
pub struct CollectingItemWriter<T> {
    committed: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for CollectingItemWriter<T> {
    fn default() -> Self {
        Self {
            committed: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> CollectingItemWriter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<T> {
        self.committed.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.committed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.lock().is_empty()
    }
}

#[async_trait]
impl<T> ItemWriter<T> for CollectingItemWriter<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn write(&self, items: &[T], ctx: &ChunkContext) -> Result<(), ItemError> {
        let batch = items.to_vec();
        let committed = Arc::clone(&self.committed);
        ctx.transaction().on_commit(move || committed.lock().extend(batch));
        Ok(())
    }
}
