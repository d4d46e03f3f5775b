//! The four event channels a World's bus multiplexes (§4.1).

use serde::{Deserialize, Serialize};

/// One of the four channels a World publishes events on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Chat timeline content.
    Message,
    /// Streaming lifecycle: token deltas, tool output, usage.
    Sse,
    /// World-scoped activity and tool telemetry.
    World,
    /// World-scoped notifications (chat title updates, approval results, ...).
    System,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Message => "message",
            Channel::Sse => "sse",
            Channel::World => "world",
            Channel::System => "system",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
