use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder chat title before the idle hook generates a real one (§4.3 step 7).
pub const DEFAULT_CHAT_TITLE: &str = "New chat";

/// A conversation thread within a world; filters agent memory and events (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: String,
    pub world_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: u64,
}

impl Chat {
    pub fn new(id: impl Into<String>, world_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Chat {
            id: id.into(),
            world_id: world_id.into(),
            name: DEFAULT_CHAT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.name == DEFAULT_CHAT_TITLE
    }
}
