use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use bifrost_core::text::{Range, TextEdit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::lsp::{LspDiagnostic, LspLocation, LspLocationLink};

/// A location as a provider returns it: either a plain `Location` or a `LocationLink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLocation {
    Location(LspLocation),
    Link(LspLocationLink),
}

impl RawLocation {
    pub fn uri(&self) -> &str {
        match self {
            Self::Location(loc) => &loc.uri,
            Self::Link(link) => &link.target_uri,
        }
    }

    pub fn range(&self) -> Range {
        match self {
            Self::Location(loc) => loc.range,
            Self::Link(link) => link
                .target_selection_range
                .or(link.target_range)
                .unwrap_or_default(),
        }
    }
}

impl From<LspLocation> for RawLocation {
    fn from(loc: LspLocation) -> Self {
        Self::Location(loc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyItem {
    pub name: String,
    pub kind: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub uri: String,
    pub range: Range,
    pub selection_range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<u32>>,
    /// Opaque server data that must be sent back with incoming/outgoing call requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeActionSummary {
    pub title: String,
    pub kind: Option<String>,
    pub is_preferred: Option<bool>,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoverInfo {
    pub contents: Vec<String>,
    pub range: Option<Range>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSymbolNode {
    pub name: String,
    pub detail: Option<String>,
    pub kind: u32,
    pub range: Range,
    pub selection_range: Range,
    pub children: Vec<DocumentSymbolNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSymbol {
    pub name: String,
    pub kind: u32,
    pub location: LspLocation,
    pub container_name: Option<String>,
}

/// Text edits grouped by document URI.
pub type WorkspaceEdit = BTreeMap<String, Vec<TextEdit>>;

fn as_list(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![value]),
        _ => Err(anyhow!("{what} response is neither array nor object")),
    }
}

pub fn parse_locations(value: Value) -> Result<Vec<RawLocation>> {
    let mut out = Vec::new();
    for item in as_list(value, "location")? {
        match serde_json::from_value::<RawLocation>(item) {
            Ok(loc) => out.push(loc),
            Err(err) => debug!("skipping unrecognized location shape: {err}"),
        }
    }
    Ok(out)
}

pub fn parse_call_hierarchy_items(value: Value) -> Result<Vec<CallHierarchyItem>> {
    let items = as_list(value, "prepareCallHierarchy")?;
    serde_json::from_value(Value::Array(items)).context("failed to parse CallHierarchyItem[]")
}

/// Extracts the `from` (incoming) or `to` (outgoing) item of each call, in server order.
pub fn parse_call_edges(value: Value, key: &str) -> Result<Vec<CallHierarchyItem>> {
    let mut out = Vec::new();
    for call in as_list(value, "callHierarchy")? {
        let Some(item) = call.get(key) else {
            return Err(anyhow!("call hierarchy entry is missing `{key}`"));
        };
        let item: CallHierarchyItem = serde_json::from_value(item.clone())
            .with_context(|| format!("failed to parse call hierarchy `{key}` item"))?;
        out.push(item);
    }
    Ok(out)
}

pub fn parse_code_actions(value: Value) -> Result<Vec<CodeActionSummary>> {
    let mut out = Vec::new();
    for action in as_list(value, "codeAction")? {
        let Some(title) = action.get("title").and_then(Value::as_str) else {
            continue;
        };
        let diagnostics = match action.get("diagnostics") {
            Some(d) if !d.is_null() => serde_json::from_value(d.clone())
                .context("failed to parse code action diagnostics")?,
            _ => Vec::new(),
        };
        out.push(CodeActionSummary {
            title: title.to_string(),
            // A bare Command has a string `command` and no kind.
            kind: action
                .get("kind")
                .and_then(Value::as_str)
                .map(str::to_string),
            is_preferred: action.get("isPreferred").and_then(Value::as_bool),
            diagnostics,
        });
    }
    Ok(out)
}

pub fn parse_hover(value: Value) -> Result<Option<HoverInfo>> {
    if value.is_null() {
        return Ok(None);
    }
    let Some(contents) = value.get("contents") else {
        return Err(anyhow!("hover response is missing contents"));
    };

    let marked = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("value").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    };
    let contents = match contents {
        Value::Array(items) => items.iter().filter_map(marked).collect(),
        other => marked(other).into_iter().collect(),
    };

    let range = match value.get("range") {
        Some(r) if !r.is_null() => {
            Some(serde_json::from_value(r.clone()).context("failed to parse hover range")?)
        }
        _ => None,
    };
    Ok(Some(HoverInfo { contents, range }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LspDocumentSymbol {
    name: String,
    #[serde(default)]
    detail: Option<String>,
    kind: u32,
    range: Range,
    selection_range: Range,
    #[serde(default)]
    children: Vec<LspDocumentSymbol>,
}

impl From<LspDocumentSymbol> for DocumentSymbolNode {
    fn from(sym: LspDocumentSymbol) -> Self {
        Self {
            name: sym.name,
            detail: sym.detail,
            kind: sym.kind,
            range: sym.range,
            selection_range: sym.selection_range,
            children: sym.children.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LspSymbolInformation {
    name: String,
    kind: u32,
    location: LspLocation,
    #[serde(default)]
    container_name: Option<String>,
}

pub fn parse_document_symbols(value: Value) -> Result<Vec<DocumentSymbolNode>> {
    let items = as_list(value, "documentSymbol")?;
    let Some(first) = items.first() else {
        return Ok(Vec::new());
    };

    // DocumentSymbol[] carries selectionRange; SymbolInformation[] carries location.
    if first.get("selectionRange").is_some() {
        let roots: Vec<LspDocumentSymbol> = serde_json::from_value(Value::Array(items))
            .context("failed to parse DocumentSymbol[]")?;
        return Ok(roots.into_iter().map(Into::into).collect());
    }

    let infos: Vec<LspSymbolInformation> = serde_json::from_value(Value::Array(items))
        .context("failed to parse SymbolInformation[]")?;
    Ok(infos
        .into_iter()
        .map(|i| DocumentSymbolNode {
            name: i.name,
            detail: i.container_name,
            kind: i.kind,
            range: i.location.range,
            selection_range: i.location.range,
            children: Vec::new(),
        })
        .collect())
}

pub fn parse_workspace_symbols(value: Value) -> Result<Vec<WorkspaceSymbol>> {
    let mut out = Vec::new();
    for item in as_list(value, "workspace/symbol")? {
        if let Ok(info) = serde_json::from_value::<LspSymbolInformation>(item.clone()) {
            out.push(WorkspaceSymbol {
                name: info.name,
                kind: info.kind,
                location: info.location,
                container_name: info.container_name,
            });
            continue;
        }

        // WorkspaceSymbol may carry a location without a range.
        let (Some(name), Some(kind), Some(uri)) = (
            item.get("name").and_then(Value::as_str),
            item.get("kind").and_then(Value::as_u64),
            item.pointer("/location/uri").and_then(Value::as_str),
        ) else {
            continue;
        };
        let range = match item.pointer("/location/range") {
            Some(r) => serde_json::from_value(r.clone())
                .context("failed to parse workspace/symbol range")?,
            None => Range::default(),
        };
        out.push(WorkspaceSymbol {
            name: name.to_string(),
            kind: kind as u32,
            location: LspLocation {
                uri: uri.to_string(),
                range,
            },
            container_name: item
                .get("containerName")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LspWorkspaceEdit {
    #[serde(default)]
    changes: Option<BTreeMap<String, Vec<TextEdit>>>,
    #[serde(default)]
    document_changes: Option<Vec<Value>>,
}

pub fn parse_workspace_edit(value: Value) -> Result<Option<WorkspaceEdit>> {
    if value.is_null() {
        return Ok(None);
    }
    let edit: LspWorkspaceEdit =
        serde_json::from_value(value).context("failed to parse WorkspaceEdit")?;
    let mut out = edit.changes.unwrap_or_default();

    for change in edit.document_changes.unwrap_or_default() {
        // Create/rename/delete file operations have a `kind` and no edits.
        let (Some(uri), Some(edits)) = (
            change.pointer("/textDocument/uri").and_then(Value::as_str),
            change.get("edits"),
        ) else {
            continue;
        };
        let edits: Vec<TextEdit> = serde_json::from_value(edits.clone())
            .context("failed to parse TextDocumentEdit in WorkspaceEdit")?;
        out.entry(uri.to_string()).or_default().extend(edits);
    }

    Ok(Some(out))
}

/// LSP `SymbolKind` display name.
pub fn symbol_kind_name(kind: u32) -> &'static str {
    match kind {
        1 => "File",
        2 => "Module",
        3 => "Namespace",
        4 => "Package",
        5 => "Class",
        6 => "Method",
        7 => "Property",
        8 => "Field",
        9 => "Constructor",
        10 => "Enum",
        11 => "Interface",
        12 => "Function",
        13 => "Variable",
        14 => "Constant",
        15 => "String",
        16 => "Number",
        17 => "Boolean",
        18 => "Array",
        19 => "Object",
        20 => "Key",
        21 => "Null",
        22 => "EnumMember",
        23 => "Struct",
        24 => "Event",
        25 => "Operator",
        26 => "TypeParameter",
        _ => "Unknown",
    }
}
