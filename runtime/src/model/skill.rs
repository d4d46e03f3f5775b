use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillScope {
    User,
    Project,
}

/// A bundled `SKILL.md` + optional scripts, loaded on demand via `load_skill` (§3,
/// §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRegistryEntry {
    /// From SKILL.md frontmatter `name`.
    pub skill_id: String,
    pub description: String,
    pub scope: SkillScope,
    pub root_path: std::path::PathBuf,
    /// sha256 of the full `SKILL.md` file, hex-encoded.
    pub content_hash: String,
    pub last_updated: DateTime<Utc>,
}
