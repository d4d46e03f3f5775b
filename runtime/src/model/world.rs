use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named container for agents, chats, variables, and an event bus (§3).
///
/// `World` is a pure data record. Per §9's redesign note, it never owns a handle to
/// its `EventBus` or to other live runtime state (`isProcessing`, turn counters) --
/// those live in [`crate::registry::WorldRegistry`], keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct World {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Max assistant responses per chat before auto-suppression. Default 5.
    pub turn_limit: u32,
    pub main_agent: Option<String>,
    /// dotenv-style `KEY=value` text, interpolated into `{{var}}` placeholders.
    pub variables: String,
    pub current_chat_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl World {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        World {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            turn_limit: 5,
            main_agent: None,
            variables: String::new(),
            current_chat_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parses `variables` as dotenv-style `KEY=value` lines, ignoring blanks and
    /// `#`-comments. Used by the orchestrator to interpolate `{{var}}` placeholders
    /// in an agent's system prompt (§4.3 step 6b).
    pub fn variable_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        for line in self.variables.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                map.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_world_defaults_turn_limit_to_five() {
        let w = World::new("w1", "Test World");
        assert_eq!(w.turn_limit, 5);
        assert!(w.main_agent.is_none());
    }

    #[test]
    fn variable_map_parses_dotenv_style_lines() {
        let mut w = World::new("w1", "Test");
        w.variables = "# comment\nworking_directory=/tmp/ws\nFOO = bar\n\n".to_string();
        let map = w.variable_map();
        assert_eq!(map.get("working_directory").map(String::as_str), Some("/tmp/ws"));
        assert_eq!(map.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(map.len(), 2);
    }
}
