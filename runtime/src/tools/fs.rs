//! `read_file`, `list_files`, `grep` (+ `grep_search` alias): read-only filesystem
//! tools, scoped to the resolved working directory (§4.4, §8 "no approval required
//! for pure reads").

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use glob::Pattern;
use regex::Regex;
use serde_json::json;
use walkdir::WalkDir;

use crate::error::ToolError;

use super::{Tool, ToolCallContent, ToolCallContext, ToolSpec, TOOL_GREP, TOOL_LIST_FILES, TOOL_READ_FILE};

const DEFAULT_READ_LIMIT: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;
const GREP_MAX_MATCHES: usize = 100;
const LIST_LIMIT: usize = 100;

const IGNORE_DIRS: &[&str] = &[
    "node_modules", "__pycache__", ".git", "dist", "build", "target", "vendor",
    ".idea", ".vscode", ".cache", "cache", "tmp", "temp", ".venv", "venv",
];

fn normalize_path(path: &Path) -> PathBuf {
    let mut buf = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => buf = PathBuf::from(p.as_os_str()),
            Component::RootDir => buf.push(comp),
            Component::CurDir => {}
            Component::ParentDir => {
                buf.pop();
            }
            Component::Normal(s) => buf.push(s),
        }
    }
    buf
}

/// Resolves `path_param` under `working_directory`, rejecting any path that
/// escapes it (§8: tool calls never traverse above the resolved directory).
fn resolve_path_under(working_directory: &Path, path_param: &str, tool: &str) -> Result<PathBuf, ToolError> {
    let base = working_directory.canonicalize().map_err(|e| ToolError::InvalidArgs {
        tool: tool.to_string(),
        message: format!("working directory not found: {e}"),
    })?;

    let path_param = path_param.trim();
    let path_param = if path_param.is_empty() { "." } else { path_param };
    let joined = base.join(path_param);
    let normalized = normalize_path(&joined);

    if !normalized.starts_with(&base) {
        return Err(ToolError::InvalidArgs {
            tool: tool.to_string(),
            message: "path is outside working directory".to_string(),
        });
    }

    if normalized.exists() {
        normalized.canonicalize().map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    } else {
        Ok(normalized)
    }
}

fn require_working_directory(ctx: &ToolCallContext, tool: &str) -> Result<&Path, ToolError> {
    ctx.working_directory.as_deref().ok_or_else(|| ToolError::InvalidArgs {
        tool: tool.to_string(),
        message: "no working directory resolved for this call".to_string(),
    })
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_READ_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_READ_FILE.to_string(),
            description: Some(
                "Read file content relative to the working directory. Optional 0-based offset \
                 and limit (default 2000 lines). cat -n style output."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "offset": {"type": "integer", "minimum": 0},
                    "limit": {"type": "integer", "minimum": 1, "default": DEFAULT_READ_LIMIT},
                },
                "required": ["path"],
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
        let working_directory = require_working_directory(ctx, TOOL_READ_FILE)?;
        let path_param = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs { tool: TOOL_READ_FILE.to_string(), message: "missing path".to_string() })?;

        let path = resolve_path_under(working_directory, path_param, TOOL_READ_FILE)?;
        if !path.exists() {
            return Err(ToolError::InvalidArgs {
                tool: TOOL_READ_FILE.to_string(),
                message: format!("file not found: {}", path.display()),
            });
        }
        if path.is_dir() {
            return Err(ToolError::InvalidArgs {
                tool: TOOL_READ_FILE.to_string(),
                message: format!("is a directory, not a file: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let offset = args.get("offset").and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(0);
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(DEFAULT_READ_LIMIT);

        let lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len();
        let start = offset.min(total);
        let end = (start + limit).min(total);

        let mut out = String::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            let line_num = start + i + 1;
            let truncated = if line.len() > MAX_LINE_LENGTH {
                format!("{}...", &line[..MAX_LINE_LENGTH])
            } else {
                (*line).to_string()
            };
            out.push_str(&format!("  {}\t{}\n", line_num, truncated));
        }
        Ok(ToolCallContent::text(out))
    }
}

pub struct ListFilesTool;

fn is_default_ignored(name: &str) -> bool {
    IGNORE_DIRS.iter().any(|&d| d == name)
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        TOOL_LIST_FILES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_LIST_FILES.to_string(),
            description: Some(
                "List files under a directory (relative to the working directory) as a flat, \
                 sorted list. Common build/dependency directories are skipped. Capped at 100 entries."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                },
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
        let working_directory = require_working_directory(ctx, TOOL_LIST_FILES)?;
        let path_param = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let search_root = resolve_path_under(working_directory, path_param, TOOL_LIST_FILES)?;
        if !search_root.is_dir() {
            return Err(ToolError::InvalidArgs {
                tool: TOOL_LIST_FILES.to_string(),
                message: format!("not a directory: {}", search_root.display()),
            });
        }

        let mut files: Vec<String> = Vec::new();
        let mut truncated = false;
        'walk: for entry in WalkDir::new(&search_root).follow_links(false).into_iter().filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && is_default_ignored(&e.file_name().to_string_lossy()))
        }) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&search_root) else { continue };
            files.push(rel.to_string_lossy().replace('\\', "/"));
            if files.len() >= LIST_LIMIT {
                truncated = true;
                break 'walk;
            }
        }
        files.sort();

        let mut out = files.join("\n");
        if truncated {
            out.push_str(&format!("\n(truncated: showing first {LIST_LIMIT} files)\n"));
        }
        Ok(ToolCallContent::text(out))
    }
}

struct GrepMatch {
    path: String,
    mod_time: std::time::SystemTime,
    line_num: usize,
    line_text: String,
}

fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Backs both `grep` and its `grep_search` alias (§8: "grep_search is an alias,
/// not a distinct tool").
pub struct GrepTool {
    tool_name: &'static str,
}

impl GrepTool {
    pub fn new(tool_name: &'static str) -> Self {
        GrepTool { tool_name }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        self.tool_name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.tool_name.to_string(),
            description: Some(
                "Search file contents under the working directory with a regular expression. \
                 Returns matches sorted by file modification time (most recent first)."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "path": {"type": "string"},
                    "include": {"type": "string"},
                },
                "required": ["pattern"],
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
        let working_directory = require_working_directory(ctx, TOOL_GREP)?;
        let pattern = args
            .get("pattern")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs { tool: TOOL_GREP.to_string(), message: "pattern must be non-empty".to_string() })?;

        let re = Regex::new(pattern).map_err(|e| ToolError::InvalidArgs {
            tool: TOOL_GREP.to_string(),
            message: format!("invalid regex: {e}"),
        })?;

        let path_param = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let search_root = resolve_path_under(working_directory, path_param, TOOL_GREP)?;
        if !search_root.is_dir() {
            return Err(ToolError::InvalidArgs {
                tool: TOOL_GREP.to_string(),
                message: format!("path is not a directory: {}", search_root.display()),
            });
        }

        let include_pattern = args
            .get("include")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Pattern::new)
            .transpose()
            .map_err(|e| ToolError::InvalidArgs { tool: TOOL_GREP.to_string(), message: format!("invalid glob: {e}") })?;

        let mut matches: Vec<GrepMatch> = Vec::new();
        for entry in WalkDir::new(&search_root).follow_links(false) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let file_path = entry.path();
            if let Some(ref p) = include_pattern {
                let fname = file_path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                if !p.matches(&fname) {
                    continue;
                }
            }
            let mod_time = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            let Ok(bytes) = std::fs::read(file_path) else { continue };
            if bytes.contains(&0u8) {
                continue;
            }
            let content = String::from_utf8_lossy(&bytes);
            let path_str = file_path.to_string_lossy().into_owned();
            for (line_idx, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    matches.push(GrepMatch { path: path_str.clone(), mod_time, line_num: line_idx + 1, line_text: line.to_string() });
                }
            }
        }

        matches.sort_by(|a, b| b.mod_time.cmp(&a.mod_time));
        let truncated = matches.len() > GREP_MAX_MATCHES;
        matches.truncate(GREP_MAX_MATCHES);

        if matches.is_empty() {
            return Ok(ToolCallContent::text("No matches found"));
        }

        let mut out = vec![format!("Found {} matches", matches.len())];
        let mut current_file = String::new();
        for m in &matches {
            if current_file != m.path {
                if !current_file.is_empty() {
                    out.push(String::new());
                }
                current_file = m.path.clone();
                out.push(format!("{}:", m.path));
            }
            let text = truncate_str(&m.line_text, MAX_LINE_LENGTH);
            out.push(format!("  Line {}: {}{}", m.line_num, text, if text.len() < m.line_text.len() { "..." } else { "" }));
        }
        if truncated {
            out.push(String::new());
            out.push("(results truncated, narrow the path or pattern)".to_string());
        }
        Ok(ToolCallContent::text(out.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::storage::tests_support::InMemoryStorage;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ctx(working_directory: PathBuf) -> ToolCallContext {
        let bus = Arc::new(EventBus::new("w1", Arc::new(InMemoryStorage::default())));
        ToolCallContext {
            world_id: "w1".into(),
            chat_id: "c1".into(),
            agent_id: "a1".into(),
            message_id: "m1".into(),
            execution_id: "e1".into(),
            working_directory: Some(working_directory),
            bus,
            cancel: tokio_util::sync::CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn read_file_returns_numbered_lines() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree").unwrap();
        let tool = ReadFileTool;
        let result = tool.call(json!({"path": "a.txt"}), &ctx(dir.path().to_path_buf())).await.unwrap();
        assert!(result.text.contains("1\tone"));
        assert!(result.text.contains("3\tthree"));
    }

    #[tokio::test]
    async fn read_file_rejects_escape_above_working_directory() {
        let dir = tempdir().unwrap();
        let tool = ReadFileTool;
        let result = tool.call(json!({"path": "../../etc/passwd"}), &ctx(dir.path().to_path_buf())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn grep_finds_matching_lines() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world\nno match here\nhello again").unwrap();
        let tool = GrepTool::new(TOOL_GREP);
        let result = tool.call(json!({"pattern": "hello"}), &ctx(dir.path().to_path_buf())).await.unwrap();
        assert!(result.text.contains("Found 2 matches"));
    }

    #[tokio::test]
    async fn list_files_lists_and_sorts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let tool = ListFilesTool;
        let result = tool.call(json!({}), &ctx(dir.path().to_path_buf())).await.unwrap();
        let idx_a = result.text.find("a.txt").unwrap();
        let idx_b = result.text.find("b.txt").unwrap();
        assert!(idx_a < idx_b);
    }
}
