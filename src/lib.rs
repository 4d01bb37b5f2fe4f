#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Stepwise Core
//!
//! Restartable, fault-tolerant execution of chunk-oriented batch steps.
//!
//! ## Overview
//!
//! A step reads a bounded input, transforms it and writes it in chunks. Each
//! chunk runs inside its own transaction; after every commit the step's
//! counters and checkpoint are persisted, so a failed or stopped run resumes
//! from its last committed chunk instead of from the start.
//!
//! ## Key Features
//!
//! - **Retry and skip**: failures are classified per error kind; transient
//!   faults are retried per item, bad items are skipped up to a limit
//! - **Write scanning**: a failed chunk write is replayed item by item to find
//!   the offending item
//! - **Optimistic concurrency**: every execution update is a compare-and-swap
//!   on a version number
//! - **Worker pool**: chunks of one step can run concurrently while commits
//!   stay serialized
//! - **Restart**: prior counters and checkpoints carry over, completed steps
//!   are skipped, start limits are enforced
//!
//! ## Module Organization
//!
//! - [`step`] - Step execution engine, chunk processing and worker pool
//! - [`item`] - Reader, processor and writer contracts plus ready-made adapters
//! - [`resilience`] - Error classification, retry and skip controllers
//! - [`repository`] - Execution-state repository contract and in-memory backend
//! - [`job`] - Sequential job runner with restart rules
//! - [`models`] - Job and step execution records and execution contexts
//! - [`state_machine`] - Execution status transitions
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging
//! - [`error`] - Crate-level error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stepwise_core::item::{CollectingItemWriter, ListItemReader};
//! use stepwise_core::job::SimpleJob;
//! use stepwise_core::models::JobParameters;
//! use stepwise_core::repository::{InMemoryJobRepository, JobRepository};
//! use stepwise_core::step::ChunkOrientedStep;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
//!
//! let step = ChunkOrientedStep::builder("copy_numbers", Arc::clone(&repository))
//!     .reader(ListItemReader::new("numbers", (1..=100).collect::<Vec<u32>>()))
//!     .pass_through()
//!     .writer(CollectingItemWriter::new())
//!     .chunk_size(10)
//!     .build()?;
//!
//! let execution = SimpleJob::new("copy", Arc::clone(&repository))
//!     .step(step)
//!     .run(&JobParameters::builder().add_long("run", 1).build())
//!     .await?;
//! println!("job finished with {}", execution.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod item;
pub mod job;
pub mod logging;
pub mod models;
pub mod repository;
pub mod resilience;
pub mod state_machine;
pub mod step;

pub use config::{ConfigManager, ConfigurationError, StepSettings, StepwiseConfig};
pub use error::{Result, StepwiseError};
pub use item::{ChunkContext, ItemError, ItemProcessor, ItemReader, ItemWriter, StepIdentity};
pub use job::{SimpleJob, Step, StepOutcome};
pub use models::{ExecutionContext, ExitStatus, JobExecution, JobInstance, JobParameters, StepCounters, StepExecution};
pub use repository::{InMemoryJobRepository, JobRepository, RepositoryError};
pub use resilience::{Classification, Classifier, ErrorKind, KindClassifier, KindHierarchy};
pub use state_machine::BatchStatus;
pub use step::{ChunkOrientedStep, StepError, StepRun, StopHandle};
