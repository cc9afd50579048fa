use rmcp::model::Tool;

use crate::tool_schemas as schemas;

/// Closed, ordered set of tools served by this process.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: vec![
                schemas::tool_find_usages(),
                schemas::tool_go_to_definition(),
                schemas::tool_find_implementations(),
                schemas::tool_get_code_actions(),
                schemas::tool_get_incoming_call_hierarchy(),
                schemas::tool_get_outgoing_call_hierarchy(),
                schemas::tool_get_workspace_symbols(),
                schemas::tool_get_hover_info(),
                schemas::tool_get_document_symbols(),
                schemas::tool_get_type_definition(),
                schemas::tool_get_rename_locations(),
                schemas::tool_rename(),
            ],
        }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_ref())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keeps_declaration_order() {
        let registry = ToolRegistry::new();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "find_usages",
                "go_to_definition",
                "find_implementations",
                "get_code_actions",
                "get_incoming_call_hierarchy",
                "get_outgoing_call_hierarchy",
                "get_workspace_symbols",
                "get_hover_info",
                "get_document_symbols",
                "get_type_definition",
                "get_rename_locations",
                "rename",
            ]
        );
    }

    #[test]
    fn names_are_unique_and_schemas_are_objects() {
        let registry = ToolRegistry::new();
        let mut seen = std::collections::HashSet::new();
        for tool in registry.tools() {
            assert!(seen.insert(tool.name.to_string()), "duplicate {}", tool.name);
            assert_eq!(
                tool.input_schema.get("type").and_then(|v| v.as_str()),
                Some("object")
            );
        }
        assert!(registry.contains("rename"));
        assert!(!registry.contains("get_completions"));
    }

    #[test]
    fn outgoing_hierarchy_exposes_filter_and_simple_flag() {
        let registry = ToolRegistry::new();
        let tool = registry
            .tools()
            .iter()
            .find(|t| t.name == "get_outgoing_call_hierarchy")
            .unwrap();
        let props = tool.input_schema.get("properties").unwrap();
        assert!(props.get("include_packages").is_some());
        assert!(props.get("retSimple").is_some());
    }
}
