//! Eligibility rules (§4.3 step 3): which agents respond to an inbound message.

use std::collections::HashSet;

/// `true` if `agent_id` should respond to a message from `sender_id` given
/// `direct_mentions` and whether the sender is human.
///
/// - An agent never responds to its own message.
/// - It responds if directly mentioned.
/// - Absent any direct mentions, it responds to a human sender (broadcast) unless
///   muted.
/// - A sender-agent's message never broadcasts to non-mentioned agents (only an
///   explicit mention routes agent-to-agent traffic, §9 resolved open question).
pub fn agent_is_eligible(
    agent_id: &str,
    sender_id: &str,
    sender_is_human: bool,
    direct_mentions: &HashSet<String>,
    agent_is_muted: bool,
) -> bool {
    if agent_id == sender_id {
        return false;
    }
    if direct_mentions.contains(agent_id) {
        return true;
    }
    if direct_mentions.is_empty() && sender_is_human && !agent_is_muted {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_broadcast_with_no_mentions_reaches_all_unmuted_agents() {
        let mentions = HashSet::new();
        assert!(agent_is_eligible("a1", "user", true, &mentions, false));
        assert!(agent_is_eligible("a2", "user", true, &mentions, false));
    }

    #[test]
    fn muted_agent_does_not_receive_broadcast() {
        let mentions = HashSet::new();
        assert!(!agent_is_eligible("a1", "user", true, &mentions, true));
    }

    #[test]
    fn direct_mention_overrides_mute() {
        let mut mentions = HashSet::new();
        mentions.insert("a1".to_string());
        assert!(agent_is_eligible("a1", "user", true, &mentions, true));
    }

    #[test]
    fn non_mentioned_agent_excluded_when_mentions_present() {
        let mut mentions = HashSet::new();
        mentions.insert("a1".to_string());
        assert!(!agent_is_eligible("a2", "user", true, &mentions, false));
    }

    #[test]
    fn agent_sender_never_broadcasts_to_unmentioned_agents() {
        let mentions = HashSet::new();
        assert!(!agent_is_eligible("a2", "a1", false, &mentions, false));
    }

    #[test]
    fn agent_sender_reaches_explicitly_mentioned_agent() {
        let mut mentions = HashSet::new();
        mentions.insert("a2".to_string());
        assert!(agent_is_eligible("a2", "a1", false, &mentions, false));
    }

    #[test]
    fn agent_never_responds_to_its_own_message() {
        let mut mentions = HashSet::new();
        mentions.insert("a1".to_string());
        assert!(!agent_is_eligible("a1", "a1", false, &mentions, false));
    }
}
