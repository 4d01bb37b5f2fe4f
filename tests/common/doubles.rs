use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stepwise_core::item::{ChunkContext, ItemError, ItemProcessor, ItemReader, ItemWriter};
use stepwise_core::models::ExecutionContext;
use stepwise_core::step::{StepContribution, StepListener, StopHandle};

/// Reader whose script yields items and read failures in order.
///
/// Restartable through `<name>.read.count` like `ListItemReader`.
pub struct ScriptedReader {
    name: String,
    script: Vec<Result<u32, ItemError>>,
    position: usize,
}

impl ScriptedReader {
    pub fn new(name: &str, script: Vec<Result<u32, ItemError>>) -> Self {
        Self {
            name: name.to_string(),
            script,
            position: 0,
        }
    }
}

#[async_trait]
impl ItemReader<u32> for ScriptedReader {
    async fn read(&mut self, _ctx: &ChunkContext) -> Result<Option<u32>, ItemError> {
        let Some(next) = self.script.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        next.clone().map(Some)
    }

    async fn open(&mut self, execution_context: &ExecutionContext) -> Result<(), ItemError> {
        let key = format!("{}.read.count", self.name);
        self.position = execution_context.get_long(&key).unwrap_or(0) as usize;
        Ok(())
    }

    async fn update(&mut self, execution_context: &mut ExecutionContext) -> Result<(), ItemError> {
        execution_context.put(format!("{}.read.count", self.name), self.position as i64);
        Ok(())
    }
}

/// Writer that fails every batch holding a poisoned item.
///
/// Items are published when the chunk transaction commits, so rolled-back
/// batches never show up in `written`. Glitching items fail the first
/// multi-item batch that holds them and write fine afterwards.
#[derive(Clone, Default)]
pub struct PoisonWriter {
    poison: Arc<HashSet<u32>>,
    glitches: Arc<Mutex<HashSet<u32>>>,
    written: Arc<Mutex<Vec<u32>>>,
    calls: Arc<AtomicUsize>,
    make_error: Option<fn(u32) -> ItemError>,
}

impl PoisonWriter {
    /// Poisoned items fail with a data error
    pub fn new(poison: impl IntoIterator<Item = u32>) -> Self {
        Self {
            poison: Arc::new(poison.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn glitch_once(self, items: impl IntoIterator<Item = u32>) -> Self {
        self.glitches.lock().extend(items);
        self
    }

    pub fn with_error(mut self, make_error: fn(u32) -> ItemError) -> Self {
        self.make_error = Some(make_error);
        self
    }

    pub fn written(&self) -> Vec<u32> {
        self.written.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemWriter<u32> for PoisonWriter {
    async fn write(&self, items: &[u32], ctx: &ChunkContext) -> Result<(), ItemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(bad) = items.iter().find(|item| self.poison.contains(item)) {
            let make_error = self
                .make_error
                .unwrap_or(|item| ItemError::data(format!("cannot write {item}")));
            return Err(make_error(*bad));
        }
        if items.len() > 1 {
            let mut glitches = self.glitches.lock();
            if let Some(item) = items.iter().find(|item| glitches.remove(*item)) {
                return Err(ItemError::data(format!("transient glitch on {item}")));
            }
        }
        let batch = items.to_vec();
        let written = Arc::clone(&self.written);
        ctx.transaction().on_commit(move || written.lock().extend(batch));
        Ok(())
    }
}

/// Processor that fails chosen items and counts every attempt per item
#[derive(Clone, Default)]
pub struct CountingProcessor {
    failing: Arc<HashSet<u32>>,
    attempts: Arc<Mutex<BTreeMap<u32, usize>>>,
    make_error: Option<fn(u32) -> ItemError>,
}

impl CountingProcessor {
    pub fn failing_on(items: impl IntoIterator<Item = u32>, make_error: fn(u32) -> ItemError) -> Self {
        Self {
            failing: Arc::new(items.into_iter().collect()),
            attempts: Arc::default(),
            make_error: Some(make_error),
        }
    }

    pub fn attempts(&self, item: u32) -> usize {
        self.attempts.lock().get(&item).copied().unwrap_or(0)
    }

    /// Items processed at least once, ascending
    pub fn seen(&self) -> Vec<u32> {
        self.attempts.lock().keys().copied().collect()
    }
}

#[async_trait]
impl ItemProcessor<u32, u32> for CountingProcessor {
    async fn process(&self, item: &u32, _ctx: &ChunkContext) -> Result<Option<u32>, ItemError> {
        *self.attempts.lock().entry(*item).or_insert(0) += 1;
        match self.make_error {
            Some(make_error) if self.failing.contains(item) => Err(make_error(*item)),
            _ => Ok(Some(*item)),
        }
    }
}

/// Listener recording hook calls as strings, in order
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl StepListener<u32, u32> for RecordingListener {
    async fn before_step(&self, _step_execution: &stepwise_core::StepExecution) -> anyhow::Result<()> {
        self.push("before_step".to_string());
        Ok(())
    }

    async fn after_step(&self, step_execution: &stepwise_core::StepExecution) -> Option<stepwise_core::ExitStatus> {
        self.push(format!("after_step:{}", step_execution.status));
        None
    }

    async fn after_chunk(&self, ctx: &ChunkContext, _contribution: &StepContribution) -> anyhow::Result<()> {
        self.push(format!("after_chunk:{}", ctx.chunk_id()));
        Ok(())
    }

    async fn after_chunk_error(&self, _step: &stepwise_core::StepIdentity, error: &stepwise_core::StepError) {
        self.push(format!("after_chunk_error:{error}"));
    }

    async fn on_skip_in_read(&self, error: &ItemError) {
        self.push(format!("skip_in_read:{}", error.message()));
    }

    async fn on_skip_in_process(&self, item: &u32, _error: &ItemError) {
        self.push(format!("skip_in_process:{item}"));
    }

    async fn on_skip_in_write(&self, item: &u32, _error: &ItemError) {
        self.push(format!("skip_in_write:{item}"));
    }
}

/// Requests a local stop once the given chunk has committed
#[derive(Clone, Default)]
pub struct StopAfterChunk {
    chunk_id: u64,
    handle: Arc<std::sync::OnceLock<StopHandle>>,
}

impl StopAfterChunk {
    pub fn new(chunk_id: u64) -> Self {
        Self {
            chunk_id,
            handle: Arc::default(),
        }
    }

    pub fn arm(&self, handle: StopHandle) {
        let _ = self.handle.set(handle);
    }
}

#[async_trait]
impl StepListener<u32, u32> for StopAfterChunk {
    async fn after_chunk(&self, ctx: &ChunkContext, _contribution: &StepContribution) -> anyhow::Result<()> {
        if ctx.chunk_id() == self.chunk_id {
            if let Some(handle) = self.handle.get() {
                handle.request_stop();
            }
        }
        Ok(())
    }
}
