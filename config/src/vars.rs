//! Names and reads the environment variables the runtime depends on (§6).

use std::path::PathBuf;

/// Pluggable LLM provider families (§2 "LLM provider SDKs ... treated as a pluggable
/// streaming completion API"). The runtime's `llm` module routes on this; this crate
/// only knows the env var name each one reads its API key from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
    /// Any OpenAI-compatible endpoint (e.g. self-hosted) configured via base URL + key.
    OpenAiCompatible,
}

impl ProviderKind {
    fn env_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Google => "GOOGLE_API_KEY",
            ProviderKind::Ollama => "OLLAMA_HOST",
            ProviderKind::OpenAiCompatible => "OPENAI_COMPATIBLE_API_KEY",
        }
    }
}

/// Reads the API key (or endpoint, for Ollama) for one provider from the environment.
pub fn provider_api_key(kind: ProviderKind) -> Option<String> {
    std::env::var(kind.env_var()).ok().filter(|v| !v.is_empty())
}

/// Storage backend location: `AGENT_WORLD_STORAGE_DIR`, falling back to
/// `~/.agent-world` when unset. The storage adapter (§6 "Persistence interface")
/// resolves its SQLite files relative to this directory.
pub fn storage_location() -> PathBuf {
    if let Ok(dir) = std::env::var("AGENT_WORLD_STORAGE_DIR") {
        return PathBuf::from(dir);
    }
    cross_xdg::BaseDirs::new()
        .map(|b| b.data_home().join("agent-world"))
        .unwrap_or_else(|_| PathBuf::from(".agent-world"))
}

/// Workspace path: the filesystem root `shell_cmd` and file-navigation tools resolve
/// relative paths against when a World has no `working_directory` variable set.
/// Selectable at runtime (desktop variant); falls back to the process cwd.
pub fn workspace_path() -> PathBuf {
    std::env::var("AGENT_WORLD_WORKSPACE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn provider_api_key_missing_is_none() {
        env::remove_var("OPENAI_API_KEY");
        assert_eq!(provider_api_key(ProviderKind::OpenAi), None);
    }

    #[test]
    fn provider_api_key_reads_env() {
        env::set_var("ANTHROPIC_API_KEY", "sk-test-123");
        assert_eq!(
            provider_api_key(ProviderKind::Anthropic),
            Some("sk-test-123".to_string())
        );
        env::remove_var("ANTHROPIC_API_KEY");
    }

    #[test]
    fn empty_env_var_treated_as_absent() {
        env::set_var("GOOGLE_API_KEY", "");
        assert_eq!(provider_api_key(ProviderKind::Google), None);
        env::remove_var("GOOGLE_API_KEY");
    }

    #[test]
    fn storage_location_honors_override() {
        env::set_var("AGENT_WORLD_STORAGE_DIR", "/tmp/aw-test-storage");
        assert_eq!(storage_location(), PathBuf::from("/tmp/aw-test-storage"));
        env::remove_var("AGENT_WORLD_STORAGE_DIR");
    }

    #[test]
    fn workspace_path_honors_override() {
        env::set_var("AGENT_WORLD_WORKSPACE", "/tmp/aw-test-workspace");
        assert_eq!(workspace_path(), PathBuf::from("/tmp/aw-test-workspace"));
        env::remove_var("AGENT_WORLD_WORKSPACE");
    }
}
