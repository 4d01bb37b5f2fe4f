use super::errors::{StateMachineError, StateMachineResult};
use super::events::ExecutionEvent;
use super::states::BatchStatus;
use tracing::debug;

/// Determine the target status for an event, or reject the move
pub fn determine_target_state(
    current: BatchStatus,
    event: &ExecutionEvent,
) -> StateMachineResult<BatchStatus> {
    if current.is_terminal() {
        return Err(StateMachineError::TerminalState {
            state: current.to_string(),
        });
    }

    let target = match (current, event) {
        (BatchStatus::Starting, ExecutionEvent::Start) => BatchStatus::Started,

        (BatchStatus::Starting | BatchStatus::Started, ExecutionEvent::RequestStop) => {
            BatchStatus::Stopping
        }
        // Repeated stop requests are harmless
        (BatchStatus::Stopping, ExecutionEvent::RequestStop) => BatchStatus::Stopping,

        // A stop that arrives after the last chunk still lets the run complete
        (BatchStatus::Started | BatchStatus::Stopping, ExecutionEvent::Complete) => {
            BatchStatus::Completed
        }

        (BatchStatus::Stopping, ExecutionEvent::Stopped) => BatchStatus::Stopped,

        (_, ExecutionEvent::Fail(_)) => BatchStatus::Failed,
        (_, ExecutionEvent::MarkUnknown(_)) => BatchStatus::Unknown,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

/// In-memory tracker of one execution's status
#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    name: String,
    current: BatchStatus,
}

impl ExecutionStateMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self::resume(name, BatchStatus::Starting)
    }

    /// Track an execution whose status was loaded from the repository
    pub fn resume(name: impl Into<String>, current: BatchStatus) -> Self {
        Self {
            name: name.into(),
            current,
        }
    }

    pub fn current_state(&self) -> BatchStatus {
        self.current
    }

    /// Apply an event and return the new status
    pub fn transition(&mut self, event: ExecutionEvent) -> StateMachineResult<BatchStatus> {
        let target = determine_target_state(self.current, &event)?;
        debug!(
            execution = %self.name,
            from = %self.current,
            to = %target,
            event = event.event_type(),
            "Execution status transition"
        );
        self.current = target;
        Ok(target)
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }
}
