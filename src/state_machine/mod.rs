// State machine module for batch execution records
//
// Job and step executions share one status vocabulary and one transition table.
// The engine drives every status change through here so an illegal move (for example
// leaving a terminal status) is rejected instead of silently overwritten.

pub mod errors;
pub mod events;
pub mod states;
pub mod transitions;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::ExecutionEvent;
pub use states::BatchStatus;
pub use transitions::{determine_target_state, ExecutionStateMachine};
