use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde_json::{Value, json};

const POSITION_NOTE: &str = "Note: line and character positions are zero-based.";

fn text_document() -> Value {
    json!({
        "type": "object",
        "description": "The document containing the symbol",
        "properties": {
            "uri": { "type": "string", "description": "URI of the document (file:///path/to/file)" }
        },
        "required": ["uri"]
    })
}

fn position() -> Value {
    json!({
        "type": "object",
        "description": "The position of the symbol",
        "properties": {
            "line": { "type": "integer", "minimum": 0, "description": "Zero-based line number" },
            "character": { "type": "integer", "minimum": 0, "description": "Zero-based character position" }
        },
        "required": ["line", "character"]
    })
}

fn at_position_schema() -> JsonObject {
    schema(json!({
        "type": "object",
        "properties": {
            "textDocument": text_document(),
            "position": position()
        },
        "required": ["textDocument", "position"]
    }))
}

fn describe(summary: &str) -> Cow<'static, str> {
    Cow::Owned(format!("{summary}\n\n{POSITION_NOTE}"))
}

pub(crate) fn tool_find_usages() -> Tool {
    Tool::new(
        Cow::Borrowed("find_usages"),
        describe(
            "Find every semantic reference to the symbol at a position. Each result carries the \
             document URI, the exact range and a one-line preview of the referencing source line. \
             Duplicate hits are removed.",
        ),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {
                "textDocument": text_document(),
                "position": position(),
                "context": {
                    "type": "object",
                    "properties": {
                        "includeDeclaration": {
                            "type": "boolean",
                            "default": true,
                            "description": "Whether to include the declaration of the symbol"
                        }
                    }
                }
            },
            "required": ["textDocument", "position"]
        }))),
    )
}

pub(crate) fn tool_go_to_definition() -> Tool {
    Tool::new(
        Cow::Borrowed("go_to_definition"),
        describe(
            "Find the definition of the symbol at a position: declarations of functions, types, \
             variables and imports, resolved semantically rather than by text.",
        ),
        Arc::new(at_position_schema()),
    )
}

pub(crate) fn tool_find_implementations() -> Tool {
    Tool::new(
        Cow::Borrowed("find_implementations"),
        describe(
            "Find concrete implementations of the interface, abstract class or virtual member at a \
             position.",
        ),
        Arc::new(at_position_schema()),
    )
}

pub(crate) fn tool_get_code_actions() -> Tool {
    Tool::new(
        Cow::Borrowed("get_code_actions"),
        describe(
            "List the quick fixes and refactorings the language server offers at a position, with \
             the diagnostics each one addresses.",
        ),
        Arc::new(at_position_schema()),
    )
}

fn call_hierarchy_schema(outgoing: bool) -> JsonObject {
    let mut value = json!({
        "type": "object",
        "properties": {
            "textDocument": text_document(),
            "position": position(),
            "call_level": {
                "type": "integer",
                "minimum": 0,
                "default": 3,
                "description": "How many levels of calls to trace. Default is 3."
            }
        },
        "required": ["textDocument", "position"]
    });
    if outgoing && let Some(props) = value["properties"].as_object_mut() {
        props.insert(
            "include_packages".to_string(),
            json!({
                "type": "array",
                "items": { "type": "string" },
                "description": "Only expand callees whose detail starts with one of these prefixes; others are listed as leaves"
            }),
        );
        props.insert(
            "retSimple".to_string(),
            json!({
                "type": "boolean",
                "default": true,
                "description": "Return the tree as compact indented text instead of JSON"
            }),
        );
    }
    schema(value)
}

pub(crate) fn tool_get_incoming_call_hierarchy() -> Tool {
    Tool::new(
        Cow::Borrowed("get_incoming_call_hierarchy"),
        describe(
            "Trace who calls the function or method at a position. Returns a tree of callers with \
             their name, kind, detail, URI and range, expanded up to 'call_level' levels.",
        ),
        Arc::new(call_hierarchy_schema(false)),
    )
}

pub(crate) fn tool_get_outgoing_call_hierarchy() -> Tool {
    Tool::new(
        Cow::Borrowed("get_outgoing_call_hierarchy"),
        describe(
            "Trace which functions the function or method at a position calls, expanded up to \
             'call_level' levels. By default the tree is rendered as indented text with one \
             `detail[start-end].name` line per callee.",
        ),
        Arc::new(call_hierarchy_schema(true)),
    )
}

pub(crate) fn tool_get_workspace_symbols() -> Tool {
    Tool::new(
        Cow::Borrowed("get_workspace_symbols"),
        Cow::Borrowed("Search symbols by name across the whole workspace."),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Symbol name or fragment" },
                "limit": { "type": "integer", "minimum": 0, "default": 20 }
            },
            "required": ["query"]
        }))),
    )
}

pub(crate) fn tool_get_hover_info() -> Tool {
    Tool::new(
        Cow::Borrowed("get_hover_info"),
        describe("Show the type signature and documentation of the symbol at a position."),
        Arc::new(at_position_schema()),
    )
}

pub(crate) fn tool_get_document_symbols() -> Tool {
    Tool::new(
        Cow::Borrowed("get_document_symbols"),
        Cow::Borrowed("List the symbols defined in a document as a hierarchy."),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {
                "textDocument": text_document()
            },
            "required": ["textDocument"]
        }))),
    )
}

pub(crate) fn tool_get_type_definition() -> Tool {
    Tool::new(
        Cow::Borrowed("get_type_definition"),
        describe("Find the definition of the type of the symbol at a position."),
        Arc::new(at_position_schema()),
    )
}

fn rename_schema() -> JsonObject {
    schema(json!({
        "type": "object",
        "properties": {
            "textDocument": text_document(),
            "position": position(),
            "newName": { "type": "string", "description": "The new name for the symbol" }
        },
        "required": ["textDocument", "position", "newName"]
    }))
}

pub(crate) fn tool_get_rename_locations() -> Tool {
    Tool::new(
        Cow::Borrowed("get_rename_locations"),
        describe("Preview the edits a rename of the symbol at a position would make, without applying them."),
        Arc::new(rename_schema()),
    )
}

pub(crate) fn tool_rename() -> Tool {
    Tool::new(
        Cow::Borrowed("rename"),
        describe("Rename the symbol at a position and write the edits to every affected file."),
        Arc::new(rename_schema()),
    )
}

fn schema(value: Value) -> JsonObject {
    #[expect(clippy::expect_used)]
    serde_json::from_value(value).expect("tool schema should deserialize")
}
