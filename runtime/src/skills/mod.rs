//! Skill Registry (§4.6): scans default roots plus project-configured paths for
//! `SKILL.md` files, keeps a deterministic, idempotent sync, and builds the
//! `<available_skills>` prompt block.

mod frontmatter;

pub use frontmatter::{parse_frontmatter, FrontmatterError};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::warn;
use walkdir::WalkDir;

use crate::model::{SkillRegistryEntry, SkillScope};

fn user_default_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(home) = dirs_home() {
        roots.push(home.join(".agents").join("skills"));
        roots.push(home.join(".codex").join("skills"));
    }
    roots
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// One root directory to scan, each `SKILL.md` one directory below it, tagged
/// with the scope that governs collision resolution.
struct Root {
    path: PathBuf,
    scope: SkillScope,
}

pub struct SkillRegistry {
    roots: Vec<Root>,
    entries: RwLock<HashMap<String, SkillRegistryEntry>>,
}

impl SkillRegistry {
    /// `project_roots` are scanned with [`SkillScope::Project`] (wins collisions
    /// against user-scope roots regardless of scan order, §4.6).
    pub fn new(project_roots: Vec<PathBuf>) -> Self {
        let mut roots: Vec<Root> = user_default_roots()
            .into_iter()
            .map(|path| Root { path, scope: SkillScope::User })
            .collect();
        roots.extend(project_roots.into_iter().map(|path| Root { path, scope: SkillScope::Project }));
        SkillRegistry {
            roots,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Rescans all roots. Deterministic and idempotent: unchanged skills are left
    /// untouched, changed ones get a new content hash, removed files drop their
    /// entry, and project scope always wins a `skillId` collision.
    pub async fn sync(&self) {
        let mut found: HashMap<String, (SkillRegistryEntry, SkillScope)> = HashMap::new();

        for root in &self.roots {
            if !root.path.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&root.path).max_depth(3) {
                let Ok(entry) = entry else { continue };
                if entry.file_name() != "SKILL.md" {
                    continue;
                }
                let content = match std::fs::read_to_string(entry.path()) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "failed to read SKILL.md");
                        continue;
                    }
                };
                let frontmatter = match parse_frontmatter(&content) {
                    Ok(fm) => fm,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "skipping skill with invalid frontmatter");
                        continue;
                    }
                };
                if frontmatter.name.trim().is_empty() {
                    warn!(path = %entry.path().display(), "skipping skill with missing skillId");
                    continue;
                }

                let skill_entry = SkillRegistryEntry {
                    skill_id: frontmatter.name.clone(),
                    description: frontmatter.description,
                    scope: root.scope,
                    root_path: entry.path().parent().unwrap_or(entry.path()).to_path_buf(),
                    content_hash: sha256_hex(&content),
                    last_updated: Utc::now(),
                };

                match found.get(&skill_entry.skill_id) {
                    Some((_, existing_scope)) if *existing_scope == SkillScope::Project && root.scope != SkillScope::Project => {
                        // project scope already claimed this id; user-scope entries never override it
                    }
                    _ => {
                        found.insert(skill_entry.skill_id.clone(), (skill_entry, root.scope));
                    }
                }
            }
        }

        let mut entries = self.entries.write().await;
        for (skill_id, (new_entry, _)) in &found {
            match entries.get(skill_id) {
                Some(existing) if existing.content_hash == new_entry.content_hash => {}
                _ => {
                    entries.insert(skill_id.clone(), new_entry.clone());
                }
            }
        }
        entries.retain(|skill_id, _| found.contains_key(skill_id));
    }

    pub async fn get(&self, skill_id: &str) -> Option<SkillRegistryEntry> {
        self.entries.read().await.get(skill_id).cloned()
    }

    pub async fn list(&self) -> Vec<SkillRegistryEntry> {
        let mut v: Vec<_> = self.entries.read().await.values().cloned().collect();
        v.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        v
    }

    /// Reads the full markdown for `skill_id` and wraps it in a `<skill_context>`
    /// envelope (§4.4 `load_skill`).
    pub async fn load_content(&self, skill_id: &str) -> Option<String> {
        let entry = self.get(skill_id).await?;
        let path = entry.root_path.join("SKILL.md");
        let content = std::fs::read_to_string(path).ok()?;
        Some(format!("<skill_context id=\"{}\">\n{}\n</skill_context>", entry.skill_id, content))
    }

    /// Builds the `<available_skills>` prompt block (§4.6).
    pub async fn available_skills_block(&self) -> String {
        let entries = self.list().await;
        if entries.is_empty() {
            return String::new();
        }
        let mut out = String::from("<available_skills>\n");
        for entry in entries {
            out.push_str(&format!("- {}: {}\n", entry.skill_id, entry.description));
        }
        out.push_str("</available_skills>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_skill(dir: &Path, id: &str, description: &str) {
        let skill_dir = dir.join(id);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            format!("---\nname: {id}\ndescription: {description}\n---\nBody.\n"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn sync_discovers_project_skill() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "deploy-checklist", "Pre-deploy checks");

        let registry = SkillRegistry::new(vec![dir.path().to_path_buf()]);
        registry.sync().await;

        let entry = registry.get("deploy-checklist").await.unwrap();
        assert_eq!(entry.description, "Pre-deploy checks");
        assert_eq!(entry.scope, SkillScope::Project);
    }

    #[tokio::test]
    async fn sync_is_idempotent_for_unchanged_content() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "deploy-checklist", "Pre-deploy checks");
        let registry = SkillRegistry::new(vec![dir.path().to_path_buf()]);
        registry.sync().await;
        let first = registry.get("deploy-checklist").await.unwrap();
        registry.sync().await;
        let second = registry.get("deploy-checklist").await.unwrap();
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[tokio::test]
    async fn sync_removes_entries_for_deleted_files() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "temp-skill", "will be removed");
        let registry = SkillRegistry::new(vec![dir.path().to_path_buf()]);
        registry.sync().await;
        assert!(registry.get("temp-skill").await.is_some());

        std::fs::remove_dir_all(dir.path().join("temp-skill")).unwrap();
        registry.sync().await;
        assert!(registry.get("temp-skill").await.is_none());
    }

    #[tokio::test]
    async fn available_skills_block_lists_id_and_description() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "deploy-checklist", "Pre-deploy checks");
        let registry = SkillRegistry::new(vec![dir.path().to_path_buf()]);
        registry.sync().await;
        let block = registry.available_skills_block().await;
        assert!(block.contains("<available_skills>"));
        assert!(block.contains("deploy-checklist: Pre-deploy checks"));
    }

    #[tokio::test]
    async fn load_content_wraps_in_skill_context_envelope() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "deploy-checklist", "Pre-deploy checks");
        let registry = SkillRegistry::new(vec![dir.path().to_path_buf()]);
        registry.sync().await;
        let content = registry.load_content("deploy-checklist").await.unwrap();
        assert!(content.starts_with("<skill_context id=\"deploy-checklist\">"));
        assert!(content.trim_end().ends_with("</skill_context>"));
    }
}
