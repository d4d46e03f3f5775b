use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::model::{ExecutionState, ShellExecutionRecord};

const MAX_HISTORY: usize = 1000;

/// In-memory index of shell executions (§3: "bounded in-memory history (≤1000
/// entries) with terminal-state deletion allowed"), plus the cancellation tokens
/// `stopShellCommandsForChat` (§4.4 step 4) fires.
#[derive(Default)]
pub struct ShellExecutionRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    history: VecDeque<ShellExecutionRecord>,
    cancel_tokens: HashMap<String, CancellationToken>,
}

impl ShellExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new record, returning its cancellation token. Evicts the oldest
    /// terminal-state entry if at capacity.
    pub async fn register(&self, record: ShellExecutionRecord) -> CancellationToken {
        let mut inner = self.inner.lock().await;
        if inner.history.len() >= MAX_HISTORY {
            if let Some(pos) = inner.history.iter().position(|r| r.state.is_terminal()) {
                inner.history.remove(pos);
            } else {
                inner.history.pop_front();
            }
        }
        let token = CancellationToken::new();
        inner.cancel_tokens.insert(record.execution_id.clone(), token.clone());
        inner.history.push_back(record);
        token
    }

    pub async fn transition(&self, execution_id: &str, next: ExecutionState) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.history.iter_mut().find(|r| r.execution_id == execution_id) {
            Some(r) => r.transition(next),
            None => false,
        }
    }

    pub async fn set_exit_code(&self, execution_id: &str, code: i32) {
        let mut inner = self.inner.lock().await;
        if let Some(r) = inner.history.iter_mut().find(|r| r.execution_id == execution_id) {
            r.exit_code = Some(code);
        }
    }

    pub async fn get(&self, execution_id: &str) -> Option<ShellExecutionRecord> {
        self.inner
            .lock()
            .await
            .history
            .iter()
            .find(|r| r.execution_id == execution_id)
            .cloned()
    }

    /// Cancels all active executions scoped to `chat_id` (§4.4 step 4). Each
    /// executor observes its token and yields a `Canceled` result, not a success.
    pub async fn cancel_for_chat(&self, chat_id: &str) {
        let inner = self.inner.lock().await;
        for record in inner.history.iter() {
            if record.chat_id.as_deref() == Some(chat_id) && !record.state.is_terminal() {
                if let Some(token) = inner.cancel_tokens.get(&record.execution_id) {
                    token.cancel();
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ShellExecutionRecord;

    #[tokio::test]
    async fn register_then_transition_updates_state() {
        let registry = ShellExecutionRegistry::new();
        let mut record = ShellExecutionRecord::new("ls", vec![]);
        record.chat_id = Some("c1".into());
        let execution_id = record.execution_id.clone();
        registry.register(record).await;

        assert!(registry.transition(&execution_id, ExecutionState::Starting).await);
        assert!(registry.transition(&execution_id, ExecutionState::Running).await);
        let rec = registry.get(&execution_id).await.unwrap();
        assert_eq!(rec.state, ExecutionState::Running);
    }

    #[tokio::test]
    async fn cancel_for_chat_only_cancels_matching_non_terminal_executions() {
        let registry = ShellExecutionRegistry::new();

        let mut rec1 = ShellExecutionRecord::new("ls", vec![]);
        rec1.chat_id = Some("c1".into());
        let id1 = rec1.execution_id.clone();
        let token1 = registry.register(rec1).await;

        let mut rec2 = ShellExecutionRecord::new("ls", vec![]);
        rec2.chat_id = Some("c2".into());
        let token2 = registry.register(rec2).await;

        registry.transition(&id1, ExecutionState::Starting).await;
        registry.transition(&id1, ExecutionState::Running).await;

        registry.cancel_for_chat("c1").await;
        assert!(token1.is_cancelled());
        assert!(!token2.is_cancelled());
    }
}
