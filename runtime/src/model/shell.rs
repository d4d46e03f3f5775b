use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a shell subprocess (§3, §8). Transitions are one-directional:
/// `Queued -> Starting -> Running -> {Completed, Failed, Canceled, TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Queued,
    Starting,
    Running,
    Completed,
    Failed,
    Canceled,
    TimedOut,
}

impl ExecutionState {
    /// Whether `self -> next` is a legal transition (§8: "reverse transitions are
    /// rejected").
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Queued, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Canceled)
                | (Running, TimedOut)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Failed
                | ExecutionState::Canceled
                | ExecutionState::TimedOut
        )
    }
}

/// Tracks one shell subprocess's lifecycle (§3). Owned by the process, bounded
/// in-memory history (`ShellExecutionRegistry` enforces the ≤1000-entry cap).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellExecutionRecord {
    pub execution_id: String,
    pub world_id: Option<String>,
    pub chat_id: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    pub state: ExecutionState,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ShellExecutionRecord {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        ShellExecutionRecord {
            execution_id: super::short_id(),
            world_id: None,
            chat_id: None,
            command: command.into(),
            args,
            state: ExecutionState::Queued,
            exit_code: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Attempts the transition, returning `false` (no-op) for an illegal one.
    pub fn transition(&mut self, next: ExecutionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transition_chain_succeeds() {
        let mut rec = ShellExecutionRecord::new("ls", vec![]);
        assert!(rec.transition(ExecutionState::Starting));
        assert!(rec.transition(ExecutionState::Running));
        assert!(rec.transition(ExecutionState::Completed));
        assert_eq!(rec.state, ExecutionState::Completed);
        assert!(rec.ended_at.is_some());
    }

    #[test]
    fn reverse_transition_is_rejected() {
        let mut rec = ShellExecutionRecord::new("ls", vec![]);
        rec.transition(ExecutionState::Starting);
        rec.transition(ExecutionState::Running);
        rec.transition(ExecutionState::Completed);
        assert!(!rec.transition(ExecutionState::Running));
        assert_eq!(rec.state, ExecutionState::Completed);
    }

    #[test]
    fn skip_transition_is_rejected() {
        let mut rec = ShellExecutionRecord::new("ls", vec![]);
        assert!(!rec.transition(ExecutionState::Running));
        assert_eq!(rec.state, ExecutionState::Queued);
    }
}
