use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code and description reported to whatever launched the run.
///
/// Codes are free-form strings; the well-known ones below carry a severity so
/// that several statuses can be folded with [`ExitStatus::and`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub code: String,
    pub description: String,
}

impl ExitStatus {
    pub const UNKNOWN: &'static str = "UNKNOWN";
    pub const EXECUTING: &'static str = "EXECUTING";
    pub const COMPLETED: &'static str = "COMPLETED";
    pub const NOOP: &'static str = "NOOP";
    pub const FAILED: &'static str = "FAILED";
    pub const STOPPED: &'static str = "STOPPED";

    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: String::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    pub fn executing() -> Self {
        Self::new(Self::EXECUTING)
    }

    pub fn completed() -> Self {
        Self::new(Self::COMPLETED)
    }

    pub fn noop() -> Self {
        Self::new(Self::NOOP)
    }

    pub fn failed() -> Self {
        Self::new(Self::FAILED)
    }

    pub fn stopped() -> Self {
        Self::new(Self::STOPPED)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append to the description, keeping what is already there
    pub fn add_description(mut self, description: impl AsRef<str>) -> Self {
        let description = description.as_ref();
        if description.is_empty() || self.description.contains(description) {
            return self;
        }
        if !self.description.is_empty() {
            self.description.push_str("; ");
        }
        self.description.push_str(description);
        self
    }

    /// Failure status whose description holds the full error chain
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut description = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            description.push_str(&format!("\ncaused by: {cause}"));
            source = cause.source();
        }
        Self::failed().with_description(description)
    }

    fn severity(&self) -> u8 {
        match self.code.as_str() {
            Self::EXECUTING => 1,
            Self::COMPLETED => 2,
            Self::NOOP => 3,
            Self::STOPPED => 4,
            Self::FAILED => 5,
            Self::UNKNOWN => 6,
            _ => 7,
        }
    }

    /// Combine two statuses: the more severe code wins and descriptions are joined
    pub fn and(self, other: ExitStatus) -> ExitStatus {
        let (winner, loser) = if other.severity() > self.severity() {
            (other, self)
        } else {
            (self, other)
        };
        winner.add_description(loser.description)
    }

    pub fn is_running(&self) -> bool {
        self.code == Self::EXECUTING || self.code == Self::UNKNOWN
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::executing()
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.description)
        }
    }
}
