//! One cached entry of the aggregated tool catalog (§3 "Tool Entry").

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ToolEntry {
    /// `<serverID>__<toolName>` (§3).
    pub wire_name: String,
    pub server_id: String,
    pub tool_name: String,
    pub input_schema: Value,
    pub description: Option<String>,
}

impl ToolEntry {
    pub fn new(server_id: &str, tool_name: &str, input_schema: Value, description: Option<String>) -> Self {
        Self {
            wire_name: crate::name_mapper::join_namespaced(server_id, tool_name),
            server_id: server_id.to_string(),
            tool_name: tool_name.to_string(),
            input_schema,
            description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_is_namespaced() {
        let entry = ToolEntry::new("github", "search_repos", Value::Null, None);
        assert_eq!(entry.wire_name, "github__search_repos");
    }
}
