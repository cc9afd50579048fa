use bifrost_core::text::Range;
use bifrost_lsp::{DocumentSymbolNode, Provider, WorkspaceSymbol, symbol_kind_name};
use rmcp::model::CallToolResult;
use serde::Serialize;

use crate::args::{DocumentArgs, WorkspaceSymbolsArgs};
use crate::dispatcher::{Dispatcher, json_result};
use crate::error::ToolError;

#[derive(Debug, Serialize)]
struct SymbolLocationOut {
    uri: String,
    range: Range,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceSymbolOut {
    name: String,
    kind: &'static str,
    location: SymbolLocationOut,
    container_name: Option<String>,
}

impl From<WorkspaceSymbol> for WorkspaceSymbolOut {
    fn from(symbol: WorkspaceSymbol) -> Self {
        Self {
            name: symbol.name,
            kind: symbol_kind_name(symbol.kind),
            location: SymbolLocationOut {
                uri: symbol.location.uri,
                range: symbol.location.range,
            },
            container_name: symbol.container_name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentSymbolOut {
    name: String,
    detail: Option<String>,
    kind: &'static str,
    range: Range,
    selection_range: Range,
    children: Vec<DocumentSymbolOut>,
}

impl From<DocumentSymbolNode> for DocumentSymbolOut {
    fn from(node: DocumentSymbolNode) -> Self {
        Self {
            name: node.name,
            detail: node.detail,
            kind: symbol_kind_name(node.kind),
            range: node.range,
            selection_range: node.selection_range,
            children: node.children.into_iter().map(Self::from).collect(),
        }
    }
}

impl<P: Provider> Dispatcher<P> {
    pub(crate) async fn get_workspace_symbols(
        &self,
        args: WorkspaceSymbolsArgs,
    ) -> Result<CallToolResult, ToolError> {
        let symbols = self.provider.workspace_symbols(&args.query).await?;
        let out: Vec<WorkspaceSymbolOut> = symbols
            .into_iter()
            .take(args.limit())
            .map(WorkspaceSymbolOut::from)
            .collect();
        json_result(&out)
    }

    pub(crate) async fn get_document_symbols(&self, args: DocumentArgs) -> Result<CallToolResult, ToolError> {
        let symbols = self
            .provider
            .document_symbols(&args.text_document.uri)
            .await?;
        let out: Vec<DocumentSymbolOut> = symbols.into_iter().map(DocumentSymbolOut::from).collect();
        json_result(&out)
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatcher::tests::{ORDER_URI, dispatcher, json_of};
    use crate::test_support::{FakeProvider, range};
    use bifrost_lsp::{DocumentSymbolNode, LspLocation, WorkspaceSymbol};
    use serde_json::json;

    fn symbol(name: &str, line: u32) -> WorkspaceSymbol {
        WorkspaceSymbol {
            name: name.to_string(),
            kind: 5,
            location: LspLocation {
                uri: format!("file:///src/{name}.cs"),
                range: range(line, 6),
            },
            container_name: Some("App".to_string()),
        }
    }

    #[tokio::test]
    async fn workspace_symbols_respect_limit() {
        let d = dispatcher(FakeProvider {
            workspace_symbols: (0..30).map(|i| symbol(&format!("Order{i}"), i)).collect(),
            ..FakeProvider::default()
        });
        let args = json!({ "query": "Order" }).as_object().cloned().unwrap();
        let value = json_of(&d.dispatch("get_workspace_symbols", Some(&args)).await);
        assert_eq!(value.as_array().unwrap().len(), 20);
        assert_eq!(value[0]["kind"], "Class");
        assert_eq!(value[0]["containerName"], "App");
        assert_eq!(value[0]["location"]["uri"], "file:///src/Order0.cs");

        let args = json!({ "query": "Order1", "limit": 3 }).as_object().cloned().unwrap();
        let value = json_of(&d.dispatch("get_workspace_symbols", Some(&args)).await);
        assert_eq!(value.as_array().unwrap().len(), 3);

        let args = json!({ "query": "Order", "limit": 0 }).as_object().cloned().unwrap();
        let value = json_of(&d.dispatch("get_workspace_symbols", Some(&args)).await);
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn document_symbols_keep_hierarchy() {
        let d = dispatcher(FakeProvider {
            document_symbols: vec![DocumentSymbolNode {
                name: "Order".to_string(),
                detail: None,
                kind: 5,
                range: range(0, 0),
                selection_range: range(0, 6),
                children: vec![DocumentSymbolNode {
                    name: "Sum".to_string(),
                    detail: Some("int Sum()".to_string()),
                    kind: 6,
                    range: range(3, 4),
                    selection_range: range(3, 8),
                    children: Vec::new(),
                }],
            }],
            ..FakeProvider::default()
        });
        let args = json!({ "textDocument": { "uri": ORDER_URI } })
            .as_object()
            .cloned()
            .unwrap();
        let value = json_of(&d.dispatch("get_document_symbols", Some(&args)).await);
        assert_eq!(value[0]["kind"], "Class");
        assert_eq!(value[0]["selectionRange"]["start"]["character"], 6);
        assert_eq!(value[0]["children"][0]["name"], "Sum");
        assert_eq!(value[0]["children"][0]["kind"], "Method");
        assert_eq!(value[0]["children"][0]["detail"], "int Sum()");
    }
}
