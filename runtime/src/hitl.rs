//! Coordinates a `hitl_request` tool call (§4.4) with the human reply that answers
//! it. The tool call blocks on a oneshot receiver keyed by `chat_id`; the
//! orchestrator's natural human-message path resolves it the same way it resolves a
//! pending approval (§4.5) -- by checking the next message against the pending
//! question before treating it as ordinary chat input.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

struct PendingHitl {
    options: Vec<String>,
    reply: oneshot::Sender<Option<String>>,
}

#[derive(Default)]
pub struct HitlCoordinator {
    pending: Mutex<HashMap<String, PendingHitl>>,
}

impl HitlCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending question for `chat_id` and awaits its answer. Any prior
    /// pending question on the same chat is dropped (its waiter resolves to `None`).
    pub async fn ask(&self, chat_id: &str, options: Vec<String>) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if let Some(previous) = pending.insert(chat_id.to_string(), PendingHitl { options, reply: tx }) {
                let _ = previous.reply.send(None);
            }
        }
        rx.await.unwrap_or(None)
    }

    /// If `chat_id` has a pending question and `content` matches one of its options
    /// (case-insensitive), resolves it and returns `true`. Otherwise leaves the
    /// pending question untouched and returns `false` -- the message is ordinary chat
    /// input.
    pub async fn try_resolve(&self, chat_id: &str, content: &str) -> bool {
        let trimmed = content.trim();
        let mut pending = self.pending.lock().await;
        let matches = pending
            .get(chat_id)
            .is_some_and(|p| p.options.iter().any(|o| o.eq_ignore_ascii_case(trimmed)));
        if !matches {
            return false;
        }
        if let Some(entry) = pending.remove(chat_id) {
            let _ = entry.reply.send(Some(trimmed.to_string()));
        }
        true
    }

    /// Cancels any pending question for `chat_id`, resolving its waiter to `None`.
    pub async fn cancel(&self, chat_id: &str) {
        if let Some(entry) = self.pending.lock().await.remove(chat_id) {
            let _ = entry.reply.send(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn try_resolve_matches_option_case_insensitively_and_wakes_the_asker() {
        let coordinator = Arc::new(HitlCoordinator::new());
        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ask("c1", vec!["Yes".to_string(), "No".to_string()]).await }
        });
        tokio::task::yield_now().await;

        assert!(coordinator.try_resolve("c1", "yes").await);
        assert_eq!(waiter.await.unwrap(), Some("yes".to_string()));
    }

    #[tokio::test]
    async fn try_resolve_ignores_non_matching_message() {
        let coordinator = Arc::new(HitlCoordinator::new());
        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.ask("c1", vec!["yes".to_string(), "no".to_string()]).await }
        });
        tokio::task::yield_now().await;

        assert!(!coordinator.try_resolve("c1", "maybe").await);
        coordinator.cancel("c1").await;
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn try_resolve_on_unknown_chat_is_a_no_op() {
        let coordinator = HitlCoordinator::new();
        assert!(!coordinator.try_resolve("missing-chat", "yes").await);
    }
}
