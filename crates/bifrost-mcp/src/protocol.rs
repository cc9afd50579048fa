use bifrost_core::config::ProjectSettings;
use bifrost_lsp::Provider;
use rmcp::ErrorData as McpError;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ErrorCode, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;

pub const SERVER_NAME: &str = "dotnet-language-tools";
pub const SERVER_VERSION: &str = "0.1.0";

pub(crate) const SESSION_NOT_FOUND: ErrorCode = ErrorCode(-32000);

/// MCP front of the tool server.
///
/// Served directly by rmcp over stdio, and driven frame by frame by the SSE session workers.
pub struct ProtocolServer<P> {
    dispatcher: Dispatcher<P>,
    project_name: String,
    description: String,
}

impl<P: Provider> ProtocolServer<P> {
    pub fn new(dispatcher: Dispatcher<P>, settings: &ProjectSettings) -> Self {
        Self {
            dispatcher,
            project_name: settings.project_name.clone(),
            description: settings.description.clone(),
        }
    }

    pub fn tools(&self) -> &[Tool] {
        self.dispatcher.registry().tools()
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn list(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.tools().to_vec(),
            next_cursor: None,
            meta: None,
        }
    }

    async fn call(&self, request: CallToolRequestParam) -> CallToolResult {
        debug!("tools/call {}", request.name);
        self.dispatcher
            .dispatch(request.name.as_ref(), request.arguments.as_ref())
            .await
    }

    /// Handles one decoded frame from a session. `None` means nothing is sent back.
    pub async fn handle(&self, message: Value) -> Option<Value> {
        let Value::Object(mut envelope) = message else {
            let reason = if message.is_array() {
                "Batch requests are not supported"
            } else {
                "Invalid Request"
            };
            return Some(error_response(
                Value::Null,
                ErrorData::new(ErrorCode::INVALID_REQUEST, reason, None),
            ));
        };

        let id = envelope.remove("id");
        let Some(method) = envelope.get("method").and_then(Value::as_str).map(str::to_string) else {
            if envelope.contains_key("result") || envelope.contains_key("error") {
                debug!("ignoring client response for id {id:?}");
                return None;
            }
            return Some(error_response(
                id.unwrap_or(Value::Null),
                ErrorData::new(ErrorCode::INVALID_REQUEST, "Invalid Request: missing method", None),
            ));
        };
        let params = envelope.remove("params");

        let Some(id) = id else {
            debug!("notification {method}");
            return None;
        };

        Some(match self.handle_request(&method, params).await {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(err) => error_response(id, err),
        })
    }

    async fn handle_request(&self, method: &str, params: Option<Value>) -> Result<Value, ErrorData> {
        match method {
            "initialize" => {
                info!("client initialized session for {}", self.project_name);
                encode(&self.get_info())
            }
            "ping" => Ok(json!({})),
            "tools/list" => encode(&self.list()),
            "tools/call" => {
                let params = params
                    .ok_or_else(|| ErrorData::invalid_params("tools/call requires params", None))?;
                let request = serde_json::from_value::<CallToolRequestParam>(params)
                    .map_err(|e| ErrorData::invalid_params(format!("invalid tools/call params: {e}"), None))?;
                encode(&self.call(request).await)
            }
            other => Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
                None,
            )),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ErrorData> {
    serde_json::to_value(value).map_err(|e| ErrorData::internal_error(e.to_string(), None))
}

pub(crate) fn error_response(id: Value, error: ErrorData) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

impl<P: Provider> ServerHandler for ProtocolServer<P> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
                ..Default::default()
            },
            instructions: Some(format!("{}: {}", self.project_name, self.description)),
            ..ServerInfo::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(self.list())
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.call(request).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dispatcher::HierarchyLimits;
    use crate::dispatcher::tests::{ORDER, ORDER_URI};
    use crate::registry::ToolRegistry;
    use crate::test_support::{FakeProvider, location};
    use bifrost_core::config::{BifrostConfig, resolve_settings};

    pub(crate) fn server(provider: FakeProvider) -> ProtocolServer<FakeProvider> {
        let settings = resolve_settings(&BifrostConfig::default(), std::path::Path::new("."));
        let dispatcher = Dispatcher::new(
            Arc::new(provider.with_file(ORDER_URI, ORDER)),
            Arc::new(ToolRegistry::new()),
            HierarchyLimits::default(),
        );
        ProtocolServer::new(dispatcher, &settings)
    }

    #[tokio::test]
    async fn initialize_reports_server_identity() {
        let s = server(FakeProvider::default());
        let response = s
            .handle(json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }))
            .await
            .unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(response["result"]["serverInfo"]["version"], SERVER_VERSION);
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let s = server(FakeProvider::default());
        let response = s
            .handle(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn tools_list_is_ordered() {
        let s = server(FakeProvider::default());
        let response = s
            .handle(json!({ "jsonrpc": "2.0", "id": "a", "method": "tools/list" }))
            .await
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 12);
        assert_eq!(tools[0]["name"], "find_usages");
        assert_eq!(tools[11]["name"], "rename");
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_wraps_dispatch_result() {
        let s = server(FakeProvider {
            definitions: vec![location(ORDER_URI, 3, 8)],
            ..FakeProvider::default()
        });
        let response = s
            .handle(json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {
                    "name": "go_to_definition",
                    "arguments": {
                        "textDocument": { "uri": ORDER_URI },
                        "position": { "line": 2, "character": 23 }
                    }
                }
            }))
            .await
            .unwrap();
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"]["isError"], false);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let value: Value = serde_json::from_str(text).unwrap();
        assert_eq!(value[0]["preview"], "int Sum() { return 0; }");
    }

    #[tokio::test]
    async fn protocol_errors_use_standard_codes() {
        let s = server(FakeProvider::default());
        let unknown = s
            .handle(json!({ "jsonrpc": "2.0", "id": 2, "method": "resources/list" }))
            .await
            .unwrap();
        assert_eq!(unknown["error"]["code"], -32601);

        let batch = s.handle(json!([{ "jsonrpc": "2.0", "id": 3, "method": "ping" }])).await.unwrap();
        assert_eq!(batch["error"]["code"], -32600);

        let no_name = s
            .handle(json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {} }))
            .await
            .unwrap();
        assert_eq!(no_name["error"]["code"], -32602);

        let bad_arguments = s
            .handle(json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": { "name": "get_hover_info", "arguments": [1, 2] }
            }))
            .await
            .unwrap();
        assert_eq!(bad_arguments["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn ping_answers_empty_object() {
        let s = server(FakeProvider::default());
        let response = s
            .handle(json!({ "jsonrpc": "2.0", "id": 9, "method": "ping" }))
            .await
            .unwrap();
        assert_eq!(response["result"], json!({}));
    }
}
