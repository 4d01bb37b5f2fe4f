//! # Stepwise Configuration System
//!
//! Layered, validated configuration for step runs.
//!
//! ## Architecture
//!
//! - **Base file**: `<dir>/stepwise.toml`
//! - **Environment overlay**: `<dir>/environments/<env>.toml`
//! - **Environment variables**: `STEPWISE__<SECTION>__<KEY>`, e.g.
//!   `STEPWISE__STEP__CHUNK_SIZE=50`
//! - **Explicit Validation**: every loaded configuration is validated before use
//!
//! Every field has a default, so an empty directory yields a usable
//! configuration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stepwise_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let settings = manager.config().step.clone();
//! let skip_classifier = manager.config().fault_tolerance.skip_classifier()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::resilience::{Classification, ErrorKind, KindClassifier, KindHierarchy};
use serde::{Deserialize, Serialize};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepwiseConfig {
    pub step: StepSettings,
    pub fault_tolerance: FaultToleranceConfig,
    pub repository: RepositoryConfig,
    pub logging: LoggingConfig,
}

impl StepwiseConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> ConfigResult<()> {
        self.step.validate()?;
        self.fault_tolerance.validate()?;
        self.repository.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Limits and switches of one chunk-oriented step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSettings {
    /// Items per chunk transaction
    pub chunk_size: usize,
    /// Total invocations allowed for one item-level operation; 0 and 1 disable retry
    pub retry_limit: u32,
    pub retry_backoff_ms: u64,
    /// Step-wide skips allowed; 0 disables skipping
    pub skip_limit: u64,
    /// Chunks run in parallel; 1 runs sequentially
    pub concurrency_limit: usize,
    /// Executions of the step allowed per job instance
    pub start_limit: u32,
    /// Run the step again on restart even if it already completed
    pub allow_start_if_complete: bool,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            retry_limit: 0,
            retry_backoff_ms: 0,
            skip_limit: 0,
            concurrency_limit: 1,
            start_limit: u32::MAX,
            allow_start_if_complete: false,
        }
    }
}

impl StepSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "step.chunk_size",
                "0",
                "chunk size must be greater than 0",
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "step.concurrency_limit",
                "0",
                "concurrency limit must be greater than 0",
            ));
        }
        if self.start_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "step.start_limit",
                "0",
                "start limit must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// One `{ name, parent }` entry of the error-kind hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorKindDeclaration {
    pub name: String,
    #[serde(default = "root_kind_name")]
    pub parent: String,
}

fn root_kind_name() -> String {
    ErrorKind::ROOT.as_str().to_string()
}

/// Retry and skip classification tables.
///
/// The retry classifier is built from `retryable` and `fatal`, the skip
/// classifier from `skippable` and `fatal`. A kind listed as both retryable
/// and skippable is retried first and skipped once retries run out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultToleranceConfig {
    pub retryable: Vec<String>,
    pub skippable: Vec<String>,
    pub fatal: Vec<String>,
    pub default_classification: Classification,
    /// Kinds declared on top of the standard hierarchy
    pub kinds: Vec<ErrorKindDeclaration>,
}

impl Default for FaultToleranceConfig {
    fn default() -> Self {
        Self {
            retryable: Vec::new(),
            skippable: Vec::new(),
            fatal: Vec::new(),
            default_classification: Classification::Fatal,
            kinds: Vec::new(),
        }
    }
}

impl FaultToleranceConfig {
    /// Standard hierarchy extended with the declared kinds.
    ///
    /// Declarations may appear in any order; a parent only has to be declared
    /// somewhere in the list.
    pub fn hierarchy(&self) -> ConfigResult<KindHierarchy> {
        let mut hierarchy = KindHierarchy::standard();
        let mut pending: Vec<&ErrorKindDeclaration> = self.kinds.iter().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut remaining = Vec::new();
            for declaration in pending {
                let parent = ErrorKind::new(declaration.parent.clone());
                if parent.is_root() || hierarchy.is_declared(&parent) {
                    hierarchy.declare(declaration.name.clone(), declaration.parent.clone())?;
                } else {
                    remaining.push(declaration);
                }
            }

            if remaining.len() == before {
                let names: Vec<&str> = remaining.iter().map(|d| d.name.as_str()).collect();
                if let Some(orphan) = remaining
                    .iter()
                    .find(|d| !names.contains(&d.parent.as_str()))
                {
                    return Err(ConfigurationError::UnknownErrorKind {
                        field: format!("fault_tolerance.kinds.{}.parent", orphan.name),
                        kind: orphan.parent.clone(),
                    });
                }
                return Err(ConfigurationError::CyclicKindDeclaration {
                    kinds: names.into_iter().map(str::to_string).collect(),
                });
            }
            pending = remaining;
        }
        Ok(hierarchy)
    }

    pub fn retry_classifier(&self) -> ConfigResult<KindClassifier> {
        self.classifier(&self.retryable, Classification::Retryable)
    }

    pub fn skip_classifier(&self) -> ConfigResult<KindClassifier> {
        self.classifier(&self.skippable, Classification::Skippable)
    }

    fn classifier(&self, kinds: &[String], classification: Classification) -> ConfigResult<KindClassifier> {
        let mut builder = KindClassifier::builder(self.hierarchy()?)
            .default_classification(self.default_classification);
        // Explicitly fatal kinds are registered first so they win ties
        for kind in &self.fatal {
            builder = builder.rule(ErrorKind::new(kind.clone()), Classification::Fatal);
        }
        for kind in kinds {
            builder = builder.rule(ErrorKind::new(kind.clone()), classification);
        }
        Ok(builder.build()?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let hierarchy = self.hierarchy()?;
        let lists = [
            ("fault_tolerance.retryable", &self.retryable),
            ("fault_tolerance.skippable", &self.skippable),
            ("fault_tolerance.fatal", &self.fatal),
        ];
        for (field, kinds) in lists {
            for kind in kinds {
                let declared = ErrorKind::new(kind.clone());
                if !declared.is_root() && !hierarchy.is_declared(&declared) {
                    return Err(ConfigurationError::UnknownErrorKind {
                        field: field.to_string(),
                        kind: kind.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Only `memory` ships with the crate
    pub backend: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
        }
    }
}

impl RepositoryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        match self.backend.as_str() {
            "memory" => Ok(()),
            other => Err(ConfigurationError::invalid_value(
                "repository.backend",
                other,
                "supported backends: memory",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: Option<String>,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: "text".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        match self.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigurationError::invalid_value(
                "logging.format",
                other,
                "expected 'text' or 'json'",
            )),
        }
    }
}
