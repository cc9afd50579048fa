use bifrost_core::text::Range;
use bifrost_lsp::{CodeActionSummary, Provider};
use rmcp::model::CallToolResult;
use serde::Serialize;

use crate::args::{AtPositionArgs, FindUsagesArgs};
use crate::dispatcher::{Dispatcher, json_result};
use crate::error::ToolError;
use crate::normalize::{PreviewSource, dedupe_references, normalize};

#[derive(Debug, Serialize)]
struct DiagnosticOut {
    message: String,
    severity: Option<u32>,
    range: Range,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CodeActionOut {
    title: String,
    kind: Option<String>,
    is_preferred: Option<bool>,
    diagnostics: Vec<DiagnosticOut>,
}

impl From<CodeActionSummary> for CodeActionOut {
    fn from(action: CodeActionSummary) -> Self {
        Self {
            title: action.title,
            kind: action.kind,
            is_preferred: action.is_preferred,
            diagnostics: action
                .diagnostics
                .into_iter()
                .map(|d| DiagnosticOut {
                    message: d.message,
                    severity: d.severity,
                    range: d.range,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HoverOut {
    contents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<Range>,
    preview: String,
}

impl<P: Provider> Dispatcher<P> {
    pub(crate) async fn find_usages(&self, args: FindUsagesArgs) -> Result<CallToolResult, ToolError> {
        let raw = self
            .provider
            .references(
                &args.text_document.uri,
                args.position,
                args.include_declaration(),
            )
            .await?;
        let unique = dedupe_references(raw);
        let out = normalize(self.provider.as_ref(), unique).await;
        tracing::debug!("find_usages: {} unique reference(s)", out.len());
        json_result(&out)
    }

    pub(crate) async fn go_to_definition(&self, args: AtPositionArgs) -> Result<CallToolResult, ToolError> {
        let raw = self
            .provider
            .definition(&args.text_document.uri, args.position)
            .await?;
        json_result(&normalize(self.provider.as_ref(), raw).await)
    }

    pub(crate) async fn find_implementations(
        &self,
        args: AtPositionArgs,
    ) -> Result<CallToolResult, ToolError> {
        let raw = self
            .provider
            .implementation(&args.text_document.uri, args.position)
            .await?;
        json_result(&normalize(self.provider.as_ref(), raw).await)
    }

    pub(crate) async fn get_type_definition(
        &self,
        args: AtPositionArgs,
    ) -> Result<CallToolResult, ToolError> {
        let raw = self
            .provider
            .type_definition(&args.text_document.uri, args.position)
            .await?;
        json_result(&normalize(self.provider.as_ref(), raw).await)
    }

    pub(crate) async fn get_code_actions(&self, args: AtPositionArgs) -> Result<CallToolResult, ToolError> {
        let range = Range::new(args.position, args.position);
        let actions = self
            .provider
            .code_actions(&args.text_document.uri, range)
            .await?;
        let out: Vec<CodeActionOut> = actions.into_iter().map(CodeActionOut::from).collect();
        json_result(&out)
    }

    pub(crate) async fn get_hover_info(&self, args: AtPositionArgs) -> Result<CallToolResult, ToolError> {
        let uri = &args.text_document.uri;
        let hover = self.provider.hover(uri, args.position).await?;
        let mut source = PreviewSource::new(self.provider.as_ref());
        let mut out = Vec::new();
        if let Some(hover) = hover {
            let line = hover.range.map_or(args.position, |r| r.start);
            let preview = source.line(uri, line.line).await;
            out.push(HoverOut {
                contents: hover.contents,
                range: hover.range,
                preview,
            });
        }
        json_result(&out)
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatcher::tests::{ORDER_URI, at, dispatcher, json_of, text_of};
    use crate::test_support::{FakeProvider, link, location, range};
    use bifrost_lsp::{CodeActionSummary, HoverInfo, LspDiagnostic};
    use serde_json::json;

    #[tokio::test]
    async fn find_usages_dedupes_and_previews() {
        let d = dispatcher(FakeProvider {
            references: vec![
                location(ORDER_URI, 2, 23),
                location(ORDER_URI, 3, 8),
                location(ORDER_URI, 2, 23),
            ],
            ..FakeProvider::default()
        });
        let result = d.dispatch("find_usages", Some(&at(3, 8))).await;
        assert_eq!(result.is_error, Some(false));
        let value = json_of(&result);
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["preview"], "int Total() { return Sum(); }");
        assert_eq!(entries[1]["preview"], "int Sum() { return 0; }");
        assert_eq!(entries[0]["range"]["start"], json!({ "line": 2, "character": 23 }));
        assert_eq!(*d.provider.include_declaration.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn definitions_accept_location_links() {
        let d = dispatcher(FakeProvider {
            definitions: vec![link(ORDER_URI, 3, 8)],
            ..FakeProvider::default()
        });
        let value = json_of(&d.dispatch("go_to_definition", Some(&at(2, 23))).await);
        assert_eq!(value[0]["uri"], ORDER_URI);
        assert_eq!(value[0]["range"]["start"]["line"], 3);
        assert_eq!(value[0]["preview"], "int Sum() { return 0; }");
    }

    #[tokio::test]
    async fn empty_results_are_empty_arrays() {
        let d = dispatcher(FakeProvider::default());
        for tool in ["find_implementations", "get_type_definition", "get_code_actions", "get_hover_info"] {
            let result = d.dispatch(tool, Some(&at(0, 6))).await;
            assert_eq!(text_of(&result), "[]", "{tool}");
        }
    }

    #[tokio::test]
    async fn code_actions_carry_their_diagnostics() {
        let d = dispatcher(FakeProvider {
            code_actions: vec![CodeActionSummary {
                title: "Make method static".to_string(),
                kind: Some("refactor".to_string()),
                is_preferred: Some(true),
                diagnostics: vec![LspDiagnostic {
                    range: range(3, 8),
                    severity: Some(4),
                    code: Some(json!("CA1822")),
                    source: None,
                    message: "Member can be static".to_string(),
                }],
            }],
            ..FakeProvider::default()
        });
        let value = json_of(&d.dispatch("get_code_actions", Some(&at(3, 8))).await);
        assert_eq!(value[0]["title"], "Make method static");
        assert_eq!(value[0]["isPreferred"], true);
        assert_eq!(value[0]["diagnostics"][0]["message"], "Member can be static");
        assert_eq!(value[0]["diagnostics"][0]["severity"], 4);
        assert!(value[0]["diagnostics"][0].get("code").is_none());
    }

    #[tokio::test]
    async fn hover_preview_uses_the_hover_range() {
        let d = dispatcher(FakeProvider {
            hover: Some(HoverInfo {
                contents: vec!["int Order.Sum()".to_string()],
                range: Some(range(3, 8)),
            }),
            ..FakeProvider::default()
        });
        let value = json_of(&d.dispatch("get_hover_info", Some(&at(3, 9))).await);
        assert_eq!(value[0]["contents"][0], "int Order.Sum()");
        assert_eq!(value[0]["preview"], "int Sum() { return 0; }");

        let d = dispatcher(FakeProvider {
            hover: Some(HoverInfo {
                contents: vec!["class Order".to_string()],
                range: None,
            }),
            ..FakeProvider::default()
        });
        let value = json_of(&d.dispatch("get_hover_info", Some(&at(0, 6))).await);
        assert_eq!(value[0]["preview"], "class Order");
        assert!(value[0].get("range").is_none());
    }
}
