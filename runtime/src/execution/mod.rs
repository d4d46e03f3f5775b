//! Shell execution lifecycle tracking and chat-scoped cancellation (§4.4 step 4,
//! §3 "Shell Execution Record").

mod manager;
mod shell_registry;

pub use manager::{ExecutionOutcome, ToolExecutionManager};
pub use shell_registry::ShellExecutionRegistry;
