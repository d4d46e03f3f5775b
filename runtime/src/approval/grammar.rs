//! Natural-language approval grammar (§6): case-insensitive, tool-scoped.
//! `^(deny|approve_once|approve_session)(\s+<tool>)?$` plus polite variants
//! (`"deny the <tool>"`, `"approve <tool> for session"`).

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    ApproveOnce,
    ApproveSession,
    Deny,
}

struct Pattern {
    regex: Regex,
    decision: ApprovalDecision,
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        Pattern {
            regex: Regex::new(r"(?i)^(deny|approve_once|approve_session)(\s+(?P<tool>\S+))?$").unwrap(),
            decision: ApprovalDecision::ApproveOnce, // overwritten per-match below
        },
        Pattern {
            regex: Regex::new(r"(?i)^deny\s+the\s+(?P<tool>\S+)$").unwrap(),
            decision: ApprovalDecision::Deny,
        },
        Pattern {
            regex: Regex::new(r"(?i)^approve\s+(?P<tool>\S+)\s+for\s+session$").unwrap(),
            decision: ApprovalDecision::ApproveSession,
        },
        Pattern {
            regex: Regex::new(r"(?i)^approve\s+(?P<tool>\S+)\s+once$").unwrap(),
            decision: ApprovalDecision::ApproveOnce,
        },
        Pattern {
            regex: Regex::new(r"(?i)^approve\s+the\s+(?P<tool>\S+)\s+once$").unwrap(),
            decision: ApprovalDecision::ApproveOnce,
        },
        Pattern {
            regex: Regex::new(r"(?i)^approve\s+the\s+(?P<tool>\S+)\s+for\s+session$").unwrap(),
            decision: ApprovalDecision::ApproveSession,
        },
    ]
});

/// Matches `text` against the grammar for `tool_name`. Returns `None` if no pattern
/// matches, or if a matched `<tool>` capture names a different tool (tool-scoped
/// match: "no cross-tool implication", §8).
pub fn parse_approval_command(text: &str, tool_name: &str) -> Option<ApprovalDecision> {
    let trimmed = text.trim();

    if let Some(caps) = PATTERNS[0].regex.captures(trimmed) {
        let verb = caps.get(1).unwrap().as_str().to_ascii_lowercase();
        if let Some(tool) = caps.name("tool") {
            if !tool.as_str().eq_ignore_ascii_case(tool_name) {
                return None;
            }
        }
        return Some(match verb.as_str() {
            "deny" => ApprovalDecision::Deny,
            "approve_once" => ApprovalDecision::ApproveOnce,
            "approve_session" => ApprovalDecision::ApproveSession,
            _ => unreachable!(),
        });
    }

    for pattern in PATTERNS[1..].iter() {
        if let Some(caps) = pattern.regex.captures(trimmed) {
            let tool = caps.name("tool").unwrap().as_str();
            if tool.eq_ignore_ascii_case(tool_name) {
                return Some(pattern.decision);
            }
            return None;
        }
    }

    None
}
