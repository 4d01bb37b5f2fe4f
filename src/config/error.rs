//! Configuration Error Types
//!
//! Specific, actionable errors for loading and validating configuration and
//! for assembling steps from it.

use crate::resilience::ClassifierError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Sources could not be read, parsed or merged
    #[error("Failed to load configuration: {error}")]
    LoadError { error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// A classification list names a kind the hierarchy does not declare
    #[error("Unknown error kind '{kind}' in {field}")]
    UnknownErrorKind { field: String, kind: String },

    /// Error-kind declarations that never reach the root
    #[error("Error kind declarations form a cycle involving: {kinds:?}")]
    CyclicKindDeclaration { kinds: Vec<String> },

    /// A step was built without one of its item adapters
    #[error("Step '{step}' has no {component} configured")]
    MissingComponent {
        step: String,
        component: &'static str,
    },

    #[error("Classifier configuration error: {0}")]
    Classifier(#[from] ClassifierError),
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn load_error(error: impl std::fmt::Display) -> Self {
        Self::LoadError {
            error: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
