use serde::{Deserialize, Serialize};
use std::fmt;

/// Status shared by job and step executions.
///
/// The declaration order doubles as severity order, used when several
/// statuses must be folded into one (for example a job derived from its steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Finished successfully
    Completed,
    /// Created but not yet running
    Starting,
    /// Running
    Started,
    /// Stop requested, finishing the in-flight chunk
    Stopping,
    /// Stopped cooperatively before input was exhausted
    Stopped,
    /// Aborted by an unrecoverable error
    Failed,
    /// Outcome could not be durably confirmed
    Unknown,
}

impl BatchStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Stopped | Self::Unknown
        )
    }

    /// Check if an execution in this state still counts as running
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Started | Self::Stopping)
    }

    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Failed | Self::Stopped | Self::Unknown)
    }

    /// The more severe of the two statuses
    pub fn upgrade_to(self, other: BatchStatus) -> BatchStatus {
        self.max(other)
    }
}

impl Default for BatchStatus {
    fn default() -> Self {
        Self::Starting
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "COMPLETED"),
            Self::Starting => write!(f, "STARTING"),
            Self::Started => write!(f, "STARTED"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(Self::Completed),
            "STARTING" => Ok(Self::Starting),
            "STARTED" => Ok(Self::Started),
            "STOPPING" => Ok(Self::Stopping),
            "STOPPED" => Ok(Self::Stopped),
            "FAILED" => Ok(Self::Failed),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(format!("Invalid batch status: {s}")),
        }
    }
}
