use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job name plus the identifying parameters it was launched with.
///
/// Instances are immutable once created; every launch attempt becomes a
/// separate [`JobExecution`](super::JobExecution) under the same instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: i64,
    pub job_name: String,
    /// Canonical form of the identifying parameters
    pub identity_key: String,
    pub created_at: DateTime<Utc>,
}
