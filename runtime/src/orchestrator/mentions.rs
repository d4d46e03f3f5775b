//! Mention resolution and main-agent routing (§4.3 steps 1-2): pure text
//! transforms, kept free of any async/storage dependency so they are trivially
//! unit-testable.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Matches `@<agent>` at the start of a paragraph: string start, or right after a
/// newline.
static PARAGRAPH_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^@([A-Za-z0-9][A-Za-z0-9_-]*)").unwrap());

/// Extracts the set of directly-mentioned agent ids from `content` (§4.3 step 1).
pub fn direct_mentions(content: &str) -> HashSet<String> {
    PARAGRAPH_MENTION
        .captures_iter(content)
        .map(|c| c[1].to_ascii_lowercase())
        .collect()
}

/// If `content` has no paragraph-start mention and `main_agent` is configured,
/// prepends `@<mainAgent> ` (§4.3 step 2). Only applies to human-authored
/// messages; an agent message is never rewritten.
pub fn apply_main_agent_routing(content: &str, main_agent: Option<&str>, sender_is_human: bool) -> String {
    if !sender_is_human {
        return content.to_string();
    }
    let Some(main_agent) = main_agent else {
        return content.to_string();
    };
    if !direct_mentions(content).is_empty() {
        return content.to_string();
    }
    format!("@{main_agent} {content}")
}
