//! LLM input filtering (§4.3 step 6b.ii, §9): a pure transform from persisted
//! memory to what the model is shown. Kept free of async/storage so it is
//! testable in isolation.

use crate::model::AgentMessage;

/// Drops internal-mechanic messages (`client.*` tool-calls, `approval_*`
/// tool-results) that must never reach the LLM (§8 invariant).
pub fn filter_for_llm(memory: &[AgentMessage]) -> Vec<&AgentMessage> {
    memory.iter().filter(|m| !m.is_internal_mechanic()).collect()
}

/// Interpolates `{{var}}` placeholders in `template` from `variables` (§4.3 step
/// 6b.iii). Unknown placeholders are left as-is.
pub fn interpolate_variables(template: &str, variables: &std::collections::HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let key = after[..end].trim();
            match variables.get(key) {
                Some(value) => out.push_str(value),
                None => out.push_str(&format!("{{{{{key}}}}}")),
            }
            rest = &after[end + 2..];
        } else {
            out.push_str("{{");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[test]
    fn filters_client_tool_call_and_approval_tool_result() {
        let mut approval_request = AgentMessage::new(Role::Assistant, "");
        approval_request.tool_calls = Some(vec![crate::model::ToolCall {
            id: "approval_1".into(),
            function_name: "client.requestApproval".into(),
            arguments: serde_json::json!({}),
        }]);
        let mut approval_result = AgentMessage::new(Role::Tool, "approved");
        approval_result.tool_call_id = Some("approval_1".into());
        let ordinary = AgentMessage::new(Role::User, "hello");

        let memory = vec![approval_request, approval_result, ordinary];
        let filtered = filter_for_llm(&memory);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].content, "hello");
    }

    #[test]
    fn interpolates_known_variable() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("working_directory".to_string(), "/tmp/ws".to_string());
        let out = interpolate_variables("cwd is {{working_directory}}", &vars);
        assert_eq!(out, "cwd is /tmp/ws");
    }

    #[test]
    fn leaves_unknown_placeholder_untouched() {
        let vars = std::collections::HashMap::new();
        let out = interpolate_variables("value: {{missing}}", &vars);
        assert_eq!(out, "value: {{missing}}");
    }
}
