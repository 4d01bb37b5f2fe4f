//! # Resilience Module
//!
//! Fault tolerance for item processing: classification of failures, bounded
//! retry of item-level operations and limit-checked skipping of bad items.
//!
//! ## Architecture
//!
//! - **Classification**: [`KindClassifier`] resolves an [`ErrorKind`] to
//!   retryable, skippable or fatal using the most specific declared ancestor
//! - **Retry**: [`RetryController`] re-invokes one operation inside the open transaction
//! - **Skip**: [`SkipController`] enforces the step-wide skip limit
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use stepwise_core::resilience::{
//!     Classification, ErrorKind, KindClassifier, KindHierarchy, SkipController,
//! };
//! use stepwise_core::item::ItemError;
//!
//! let classifier = KindClassifier::builder(KindHierarchy::standard())
//!     .rule(ErrorKind::DATA, Classification::Skippable)
//!     .build()
//!     .unwrap();
//! let skip = SkipController::new(10, Arc::new(classifier));
//!
//! assert!(skip.should_skip(&ItemError::data("unparseable row"), 0));
//! ```

pub mod error_classifier;
pub mod retry;
pub mod skip;

pub use error_classifier::{
    Classification, Classifier, ClassifierError, ErrorKind, KindClassifier, KindClassifierBuilder,
    KindHierarchy,
};
pub use retry::{RetryController, RetryFailure};
pub use skip::{SkipController, SkipDecision, SkipPhase};
