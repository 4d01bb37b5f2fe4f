use crate::config::ConfigurationError;
use crate::item::ItemError;
use crate::repository::RepositoryError;
use crate::state_machine::StateMachineError;
use crate::step::StepError;
use thiserror::Error;

/// Crate-level error taxonomy.
///
/// Component errors keep their own enums; this type is what callers of the
/// public entry points see once a failure has left the component that raised it.
#[derive(Debug, Error)]
pub enum StepwiseError {
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Item error: {0}")]
    Item(#[from] ItemError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl StepwiseError {
    /// True when the failure came from durable storage rather than business logic
    pub fn is_durability_fault(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_durability_fault(),
            Self::Step(StepError::Repository(err)) => err.is_durability_fault(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StepwiseError>;
