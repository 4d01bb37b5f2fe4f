//! # Skip Controller
//!
//! Decides whether a failed item may be dropped from its chunk. A skip is
//! allowed only for failures classified as skippable and only while the
//! step-wide skip count stays within the configured limit. Anything else is a
//! fatal escalation.

use super::error_classifier::{Classification, Classifier};
use crate::item::ItemError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stage of the chunk pipeline where an item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipPhase {
    Read,
    Process,
    Write,
}

impl fmt::Display for SkipPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipPhase::Read => write!(f, "read"),
            SkipPhase::Process => write!(f, "process"),
            SkipPhase::Write => write!(f, "write"),
        }
    }
}

/// Outcome of a skip check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
    Skip,
    /// Skippable, but one more skip would exceed the limit
    LimitExceeded,
    /// The classifier does not allow skipping this failure
    NotSkippable,
}

#[derive(Clone)]
pub struct SkipController {
    limit: u64,
    classifier: Arc<dyn Classifier>,
}

impl fmt::Debug for SkipController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipController")
            .field("limit", &self.limit)
            .field("classifier", &"Classifier")
            .finish()
    }
}

impl SkipController {
    /// A limit of zero disables skipping
    pub fn new(limit: u64, classifier: Arc<dyn Classifier>) -> Self {
        Self { limit, classifier }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Classification check that ignores the skip count
    pub fn is_skippable(&self, error: &ItemError) -> bool {
        self.classifier.classify(error) == Classification::Skippable
    }

    pub fn decide(&self, error: &ItemError, current_skip_count: u64) -> SkipDecision {
        if self.classifier.classify(error) != Classification::Skippable {
            return SkipDecision::NotSkippable;
        }
        if current_skip_count.saturating_add(1) <= self.limit {
            SkipDecision::Skip
        } else {
            SkipDecision::LimitExceeded
        }
    }

    /// True only if the failure is skippable and one more skip fits the limit
    pub fn should_skip(&self, error: &ItemError, current_skip_count: u64) -> bool {
        self.decide(error, current_skip_count) == SkipDecision::Skip
    }
}
