//! # Transaction Boundary
//!
//! Every chunk runs inside one [`Transaction`] obtained from a
//! [`TransactionManager`]; the write-failure scan opens one extra transaction
//! per item. Adapters that hold transactional resources register
//! synchronization callbacks on the transaction they were handed in their
//! [`ChunkContext`](crate::item::ChunkContext) and publish or discard their
//! work when it completes.
//!
//! ```text
//! begin ──► Active ──commit──► Committed   (on_commit callbacks run)
//!              │
//!              └──rollback──► RolledBack   (on_rollback callbacks run)
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

type Synchronization = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "active"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::RolledBack => write!(f, "rolled_back"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Transaction {id} is already {state}")]
    NotActive { id: u64, state: TransactionState },

    #[error("Transaction resource failure: {0}")]
    Resource(String),
}

#[derive(Default)]
struct Synchronizations {
    on_commit: Vec<Synchronization>,
    on_rollback: Vec<Synchronization>,
}

/// One transactional attempt
pub struct Transaction {
    id: u64,
    state: Mutex<TransactionState>,
    synchronizations: Mutex<Synchronizations>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Active),
            synchronizations: Mutex::new(Synchronizations::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Run `callback` once this transaction commits
    pub fn on_commit(&self, callback: impl FnOnce() + Send + 'static) {
        self.synchronizations.lock().on_commit.push(Box::new(callback));
    }

    /// Run `callback` once this transaction rolls back
    pub fn on_rollback(&self, callback: impl FnOnce() + Send + 'static) {
        self.synchronizations.lock().on_rollback.push(Box::new(callback));
    }

    /// Move to `Committed` and run the commit callbacks in registration order
    pub fn complete_commit(&self) -> Result<(), TransactionError> {
        self.complete(TransactionState::Committed)
    }

    /// Move to `RolledBack` and run the rollback callbacks in registration order
    pub fn complete_rollback(&self) -> Result<(), TransactionError> {
        self.complete(TransactionState::RolledBack)
    }

    fn complete(&self, target: TransactionState) -> Result<(), TransactionError> {
        {
            let mut state = self.state.lock();
            if *state != TransactionState::Active {
                return Err(TransactionError::NotActive {
                    id: self.id,
                    state: *state,
                });
            }
            *state = target;
        }

        let callbacks = {
            let mut sync = self.synchronizations.lock();
            let commit = std::mem::take(&mut sync.on_commit);
            let rollback = std::mem::take(&mut sync.on_rollback);
            if target == TransactionState::Committed {
                commit
            } else {
                rollback
            }
        };

        debug!(
            transaction_id = self.id,
            outcome = %target,
            callbacks = callbacks.len(),
            "Transaction completed"
        );

        for callback in callbacks {
            callback();
        }
        Ok(())
    }
}

/// Source of transactional boundaries for chunk processing
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Arc<Transaction>, TransactionError>;

    async fn commit(&self, transaction: &Transaction) -> Result<(), TransactionError>;

    async fn rollback(&self, transaction: &Transaction) -> Result<(), TransactionError>;
}

/// Transaction manager for steps without a transactional resource.
///
/// Commit and rollback only drive the registered synchronization callbacks.
#[derive(Debug, Default)]
pub struct ResourcelessTransactionManager {
    next_id: AtomicU64,
}

impl ResourcelessTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionManager for ResourcelessTransactionManager {
    async fn begin(&self) -> Result<Arc<Transaction>, TransactionError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(Transaction::new(id)))
    }

    async fn commit(&self, transaction: &Transaction) -> Result<(), TransactionError> {
        transaction.complete_commit()
    }

    async fn rollback(&self, transaction: &Transaction) -> Result<(), TransactionError> {
        transaction.complete_rollback()
    }
}
