//! # Retry Controller
//!
//! Re-invokes a single item-level operation while the classifier reports the
//! failure as retryable and the attempt budget allows it. Re-invocations run
//! inside the caller's open transaction; the controller never touches the
//! surrounding chunk.

use super::error_classifier::{Classification, Classifier};
use crate::item::ItemError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Failure surfaced after the controller gave up on an operation
#[derive(Debug, Clone)]
pub struct RetryFailure {
    /// The failure of the final attempt
    pub error: ItemError,
    /// How many times the operation ran, including the first call
    pub attempts: u32,
    /// True when the failure was retryable but the attempt budget ran out
    pub exhausted: bool,
}

/// Bounded retry of item-level operations
#[derive(Clone)]
pub struct RetryController {
    limit: u32,
    backoff: Duration,
    classifier: Arc<dyn Classifier>,
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("limit", &self.limit)
            .field("backoff", &self.backoff)
            .field("classifier", &"Classifier")
            .finish()
    }
}

impl RetryController {
    /// `limit` is the maximum number of invocations of one operation.
    /// A limit of zero or one disables retrying.
    pub fn new(limit: u32, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            limit,
            backoff: Duration::ZERO,
            classifier,
        }
    }

    /// Controller that never retries
    pub fn disabled(classifier: Arc<dyn Classifier>) -> Self {
        Self::new(0, classifier)
    }

    /// Fixed pause between attempts
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    fn is_retryable(&self, error: &ItemError) -> bool {
        self.classifier.classify(error) == Classification::Retryable
    }

    /// Run `operation`, re-invoking it on retryable failures.
    ///
    /// The closure receives the 1-based attempt number. On success the value is
    /// returned together with the number of attempts it took.
    pub async fn attempt<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<(T, u32), RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ItemError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation(attempts).await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation = label, attempts, "Operation succeeded after retry");
                    }
                    return Ok((value, attempts));
                }
                Err(error) => {
                    let retryable = self.is_retryable(&error);
                    if retryable && attempts < self.limit {
                        warn!(
                            operation = label,
                            attempt = attempts,
                            limit = self.limit,
                            error = %error,
                            "Retrying failed operation"
                        );
                        if !self.backoff.is_zero() {
                            tokio::time::sleep(self.backoff).await;
                        }
                        continue;
                    }
                    return Err(RetryFailure {
                        error,
                        attempts,
                        exhausted: retryable,
                    });
                }
            }
        }
    }
}
