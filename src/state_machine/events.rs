use serde::{Deserialize, Serialize};

/// Events that can trigger job or step status transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    /// Begin processing
    Start,
    /// Cooperative stop requested from outside
    RequestStop,
    /// Input exhausted and every chunk committed
    Complete,
    /// Stop request honoured between chunks
    Stopped,
    /// Unrecoverable error with its description
    Fail(String),
    /// The repository could not confirm the outcome
    MarkUnknown(String),
}

impl ExecutionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::RequestStop => "request_stop",
            Self::Complete => "complete",
            Self::Stopped => "stopped",
            Self::Fail(_) => "fail",
            Self::MarkUnknown(_) => "mark_unknown",
        }
    }

    /// Extract the reason if this event carries one
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Fail(reason) | Self::MarkUnknown(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
