//! Core error kinds surfaced by the runtime (§7).

use thiserror::Error;

/// Error raised by a tool's `execute` implementation.
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArgs { tool: String, message: String },
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("cancelled")]
    Cancelled,
}

/// Error raised while evaluating or consuming an approval record.
#[derive(Error, Debug, Clone)]
pub enum ApprovalError {
    #[error("approval required for {0}")]
    Required(String),
    #[error("denied within the last 5 minutes: {0}")]
    RecentlyDenied(String),
}

/// Top-level error surfaced by a World Runtime command or background operation.
///
/// Variants correspond 1:1 to the kinds enumerated in §7; callers match on the
/// variant rather than a string discriminant.
#[derive(Error, Debug)]
pub enum WorldError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("processing busy: {0}")]
    ProcessingBusy(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("approval: {0}")]
    Approval(#[from] ApprovalError),

    #[error("cancelled")]
    Cancelled,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl WorldError {
    /// `true` for kinds the caller may retry without changing its request.
    pub fn is_retriable(&self) -> bool {
        matches!(self, WorldError::ProcessingBusy(_))
    }
}

pub type WorldResult<T> = Result<T, WorldError>;
