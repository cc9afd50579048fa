use bifrost_core::text::Position;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::ToolError;

pub(crate) const DEFAULT_CALL_LEVEL: u32 = 3;
pub(crate) const DEFAULT_SYMBOL_LIMIT: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TextDocumentArg {
    pub(crate) uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AtPositionArgs {
    pub(crate) text_document: TextDocumentArg,
    pub(crate) position: Position,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReferenceContext {
    #[serde(default)]
    pub(crate) include_declaration: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindUsagesArgs {
    pub(crate) text_document: TextDocumentArg,
    pub(crate) position: Position,
    #[serde(default)]
    pub(crate) context: Option<ReferenceContext>,
}

impl FindUsagesArgs {
    pub(crate) fn include_declaration(&self) -> bool {
        self.context
            .as_ref()
            .and_then(|c| c.include_declaration)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CallHierarchyArgs {
    pub(crate) text_document: TextDocumentArg,
    pub(crate) position: Position,
    #[serde(default, rename = "call_level")]
    pub(crate) call_level: Option<Value>,
    #[serde(default, rename = "include_packages")]
    pub(crate) include_packages: Option<Vec<String>>,
    #[serde(default, rename = "retSimple")]
    pub(crate) ret_simple: Option<bool>,
}

impl CallHierarchyArgs {
    /// Requested depth, clamped to `[0, max]`. Anything unreadable falls back to the default.
    pub(crate) fn call_level(&self, max: u32) -> u32 {
        let level = match self.call_level.as_ref() {
            None | Some(Value::Null) => DEFAULT_CALL_LEVEL,
            Some(v) => v
                .as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
                .map(clamp_component)
                .unwrap_or(DEFAULT_CALL_LEVEL),
        };
        level.min(max)
    }

    /// Non-empty prefixes, or `None` when every callee may be expanded.
    pub(crate) fn package_filter(&self) -> Option<Vec<String>> {
        let prefixes: Vec<String> = self
            .include_packages
            .iter()
            .flatten()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        (!prefixes.is_empty()).then_some(prefixes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkspaceSymbolsArgs {
    pub(crate) query: String,
    #[serde(default)]
    pub(crate) limit: Option<f64>,
}

impl WorkspaceSymbolsArgs {
    pub(crate) fn limit(&self) -> usize {
        match self.limit {
            None => DEFAULT_SYMBOL_LIMIT,
            Some(n) => clamp_component(n) as usize,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentArgs {
    pub(crate) text_document: TextDocumentArg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenameArgs {
    pub(crate) text_document: TextDocumentArg,
    pub(crate) position: Position,
    pub(crate) new_name: String,
}

/// Decoded arguments, one variant per registered tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub(crate) enum ToolCall {
    FindUsages(FindUsagesArgs),
    GoToDefinition(AtPositionArgs),
    FindImplementations(AtPositionArgs),
    GetCodeActions(AtPositionArgs),
    GetIncomingCallHierarchy(CallHierarchyArgs),
    GetOutgoingCallHierarchy(CallHierarchyArgs),
    GetWorkspaceSymbols(WorkspaceSymbolsArgs),
    GetHoverInfo(AtPositionArgs),
    GetDocumentSymbols(DocumentArgs),
    GetTypeDefinition(AtPositionArgs),
    GetRenameLocations(RenameArgs),
    Rename(RenameArgs),
}

impl ToolCall {
    pub(crate) fn decode(name: &str, arguments: Option<&Map<String, Value>>) -> Result<Self, ToolError> {
        let mut arguments = arguments.cloned().unwrap_or_default();
        if let Some(position) = arguments.get_mut("position") {
            *position = sanitize_position(position);
        }
        serde_json::from_value(json!({ "tool": name, "arguments": arguments })).map_err(|err| {
            ToolError::InvalidArguments {
                tool: name.to_string(),
                reason: err.to_string(),
            }
        })
    }
}

/// `textDocument.uri` of a raw argument object, when present.
pub(crate) fn document_uri(arguments: Option<&Map<String, Value>>) -> Option<&str> {
    arguments?.get("textDocument")?.get("uri")?.as_str()
}

/// Rewrites a client-supplied position so that every component is a non-negative integer.
fn sanitize_position(raw: &Value) -> Value {
    let component = |key: &str| -> u32 {
        raw.get(key)
            .and_then(Value::as_f64)
            .map(clamp_component)
            .unwrap_or(0)
    };
    json!({ "line": component("line"), "character": component("character") })
}

fn clamp_component(n: f64) -> u32 {
    if n.is_finite() && n > 0.0 {
        n.floor().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn decodes_tool_by_name() {
        let raw = args(json!({
            "textDocument": { "uri": "file:///src/Order.cs" },
            "position": { "line": 4, "character": 12 }
        }));
        let ToolCall::GoToDefinition(a) = ToolCall::decode("go_to_definition", Some(&raw)).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(a.text_document.uri, "file:///src/Order.cs");
        assert_eq!(a.position, Position::new(4, 12));
    }

    #[test]
    fn position_components_are_clamped() {
        let raw = args(json!({
            "textDocument": { "uri": "file:///a.cs" },
            "position": { "line": -3, "character": 7.9 }
        }));
        let ToolCall::GetHoverInfo(a) = ToolCall::decode("get_hover_info", Some(&raw)).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(a.position, Position::new(0, 7));

        let raw = args(json!({
            "textDocument": { "uri": "file:///a.cs" },
            "position": { "line": "x" }
        }));
        let ToolCall::GetHoverInfo(a) = ToolCall::decode("get_hover_info", Some(&raw)).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(a.position, Position::new(0, 0));
    }

    #[test]
    fn missing_required_field_is_invalid_arguments() {
        let raw = args(json!({
            "textDocument": { "uri": "file:///a.cs" },
            "position": { "line": 1, "character": 1 }
        }));
        let err = ToolCall::decode("rename", Some(&raw)).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(err.to_string().contains("newName"), "{err}");

        let err = ToolCall::decode("get_workspace_symbols", None).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn find_usages_includes_declaration_by_default() {
        let raw = args(json!({
            "textDocument": { "uri": "file:///a.cs" },
            "position": { "line": 1, "character": 1 }
        }));
        let ToolCall::FindUsages(a) = ToolCall::decode("find_usages", Some(&raw)).unwrap() else {
            panic!("wrong variant");
        };
        assert!(a.include_declaration());

        let raw = args(json!({
            "textDocument": { "uri": "file:///a.cs" },
            "position": { "line": 1, "character": 1 },
            "context": { "includeDeclaration": false }
        }));
        let ToolCall::FindUsages(a) = ToolCall::decode("find_usages", Some(&raw)).unwrap() else {
            panic!("wrong variant");
        };
        assert!(!a.include_declaration());
    }

    #[test]
    fn call_level_defaults_and_clamps() {
        let decode = |extra: Value| {
            let mut raw = args(json!({
                "textDocument": { "uri": "file:///a.cs" },
                "position": { "line": 1, "character": 1 }
            }));
            if let Value::Object(extra) = extra {
                raw.extend(extra);
            }
            match ToolCall::decode("get_outgoing_call_hierarchy", Some(&raw)).unwrap() {
                ToolCall::GetOutgoingCallHierarchy(a) => a,
                other => panic!("wrong variant: {other:?}"),
            }
        };

        assert_eq!(decode(json!({})).call_level(10), 3);
        assert_eq!(decode(json!({ "call_level": 0 })).call_level(10), 0);
        assert_eq!(decode(json!({ "call_level": -2 })).call_level(10), 0);
        assert_eq!(decode(json!({ "call_level": 50 })).call_level(10), 10);
        assert_eq!(decode(json!({ "call_level": "2" })).call_level(10), 2);

        let a = decode(json!({ "include_packages": ["App.Orders", "  "], "retSimple": false }));
        assert_eq!(a.package_filter(), Some(vec!["App.Orders".to_string()]));
        assert_eq!(a.ret_simple, Some(false));
        assert_eq!(decode(json!({ "include_packages": [] })).package_filter(), None);
    }

    #[test]
    fn workspace_symbol_limit_defaults_to_twenty() {
        let raw = args(json!({ "query": "Order" }));
        let ToolCall::GetWorkspaceSymbols(a) =
            ToolCall::decode("get_workspace_symbols", Some(&raw)).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(a.limit(), 20);
    }

    #[test]
    fn explicit_zero_limit_is_kept() {
        let limit = |value: Value| {
            let raw = args(json!({ "query": "Order", "limit": value }));
            match ToolCall::decode("get_workspace_symbols", Some(&raw)).unwrap() {
                ToolCall::GetWorkspaceSymbols(a) => a.limit(),
                other => panic!("wrong variant: {other:?}"),
            }
        };
        assert_eq!(limit(json!(0)), 0);
        assert_eq!(limit(json!(-4)), 0);
        assert_eq!(limit(json!(7.9)), 7);
    }

    #[test]
    fn document_uri_reads_nested_field() {
        let raw = args(json!({ "textDocument": { "uri": "file:///a.cs" } }));
        assert_eq!(document_uri(Some(&raw)), Some("file:///a.cs"));
        assert_eq!(document_uri(None), None);
        assert_eq!(document_uri(Some(&args(json!({ "query": "x" })))), None);
    }
}
