use crate::models::ExecutionContext;
use std::collections::BTreeMap;

/// Items read for one transaction attempt, in read order
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<I> {
    id: u64,
    items: Vec<I>,
    end_of_input: bool,
}

impl<I> Chunk<I> {
    pub fn new(id: u64, items: Vec<I>, end_of_input: bool) -> Self {
        Self {
            id,
            items,
            end_of_input,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn items(&self) -> &[I] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The reader signalled end of input while this chunk was read
    pub fn is_end_of_input(&self) -> bool {
        self.end_of_input
    }
}

/// Tracks which reader checkpoint may be persisted.
///
/// Chunk ids are handed out in read order. Chunks may commit out of order
/// under the worker pool, so a checkpoint becomes persistable only once every
/// chunk read before it has committed too.
#[derive(Debug, Default)]
pub struct CheckpointWatermark {
    next: u64,
    pending: BTreeMap<u64, ExecutionContext>,
}

impl CheckpointWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed chunk. Returns the newest checkpoint that is now
    /// contiguous with everything committed before it.
    pub fn commit(&mut self, chunk_id: u64, checkpoint: ExecutionContext) -> Option<ExecutionContext> {
        self.pending.insert(chunk_id, checkpoint);
        let mut latest = None;
        while let Some(checkpoint) = self.pending.remove(&self.next) {
            latest = Some(checkpoint);
            self.next += 1;
        }
        latest
    }

    /// Number of leading chunks covered by persisted checkpoints
    pub fn committed_prefix(&self) -> u64 {
        self.next
    }
}
