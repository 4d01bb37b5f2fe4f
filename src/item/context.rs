use crate::step::transaction::Transaction;
use std::sync::Arc;

/// Identity of the step run an adapter call belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepIdentity {
    pub job_name: String,
    pub job_execution_id: i64,
    pub step_name: String,
    pub step_execution_id: i64,
}

/// Explicit per-call context handed to every reader, processor and writer call.
///
/// Carries the step identity, the chunk the call belongs to and the
/// transaction the call runs in. During a write-failure scan the same chunk id
/// is paired with a fresh per-item transaction.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    step: Arc<StepIdentity>,
    chunk_id: u64,
    transaction: Arc<Transaction>,
}

impl ChunkContext {
    pub fn new(step: Arc<StepIdentity>, chunk_id: u64, transaction: Arc<Transaction>) -> Self {
        Self {
            step,
            chunk_id,
            transaction,
        }
    }

    pub fn step(&self) -> &StepIdentity {
        &self.step
    }

    pub fn chunk_id(&self) -> u64 {
        self.chunk_id
    }

    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }

    /// Same step and chunk, different transaction
    pub fn with_transaction(&self, transaction: Arc<Transaction>) -> Self {
        Self {
            step: Arc::clone(&self.step),
            chunk_id: self.chunk_id,
            transaction,
        }
    }
}
