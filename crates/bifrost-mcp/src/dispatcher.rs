use std::sync::Arc;

use bifrost_core::config::ProjectSettings;
use bifrost_lsp::{Provider, uri_to_path};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::Serialize;
use tracing::{debug, warn};

use crate::args::{ToolCall, document_uri};
use crate::error::ToolError;
use crate::registry::ToolRegistry;

/// Limits applied to call hierarchy requests.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyLimits {
    pub detect_cycles: bool,
    pub max_call_level: u32,
}

impl HierarchyLimits {
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        Self {
            detect_cycles: settings.detect_cycles,
            max_call_level: settings.max_call_level,
        }
    }
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self {
            detect_cycles: true,
            max_call_level: bifrost_core::config::DEFAULT_MAX_CALL_LEVEL,
        }
    }
}

/// Routes `(tool, arguments)` pairs to their handlers and shapes the result envelope.
pub struct Dispatcher<P> {
    pub(crate) provider: Arc<P>,
    registry: Arc<ToolRegistry>,
    pub(crate) limits: HierarchyLimits,
}

impl<P: Provider> Dispatcher<P> {
    pub fn new(provider: Arc<P>, registry: Arc<ToolRegistry>, limits: HierarchyLimits) -> Self {
        Self {
            provider,
            registry,
            limits,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs one tool call. Every failure is reported inside the returned envelope.
    pub async fn dispatch(&self, name: &str, arguments: Option<&JsonObject>) -> CallToolResult {
        if !self.registry.contains(name) {
            return error_result(&ToolError::UnknownTool(name.to_string()));
        }

        if let Some(uri) = document_uri(arguments) {
            match self.provider.exists(uri).await {
                Ok(true) => {}
                Ok(false) => {
                    let shown = uri_to_path(uri)
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|_| uri.to_string());
                    debug!("{name}: document not found: {shown}");
                    return error_result(&ToolError::ResourceNotFound(shown));
                }
                Err(err) => return error_result(&ToolError::Provider(err)),
            }
        }

        let call = match ToolCall::decode(name, arguments) {
            Ok(call) => call,
            Err(err) => return error_result(&err),
        };

        match self.run(call).await {
            Ok(result) => result,
            Err(err) => {
                warn!("{name} failed: {err}");
                error_result(&err)
            }
        }
    }

    async fn run(&self, call: ToolCall) -> Result<CallToolResult, ToolError> {
        match call {
            ToolCall::FindUsages(args) => self.find_usages(args).await,
            ToolCall::GoToDefinition(args) => self.go_to_definition(args).await,
            ToolCall::FindImplementations(args) => self.find_implementations(args).await,
            ToolCall::GetCodeActions(args) => self.get_code_actions(args).await,
            ToolCall::GetIncomingCallHierarchy(args) => self.get_incoming_call_hierarchy(args).await,
            ToolCall::GetOutgoingCallHierarchy(args) => self.get_outgoing_call_hierarchy(args).await,
            ToolCall::GetWorkspaceSymbols(args) => self.get_workspace_symbols(args).await,
            ToolCall::GetHoverInfo(args) => self.get_hover_info(args).await,
            ToolCall::GetDocumentSymbols(args) => self.get_document_symbols(args).await,
            ToolCall::GetTypeDefinition(args) => self.get_type_definition(args).await,
            ToolCall::GetRenameLocations(args) => self.get_rename_locations(args).await,
            ToolCall::Rename(args) => self.rename(args).await,
        }
    }
}

pub(crate) fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, ToolError> {
    let text = serde_json::to_string(value)
        .map_err(|e| anyhow::anyhow!("failed to encode tool result: {e}"))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

pub(crate) fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

pub(crate) fn error_result(err: &ToolError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("Error: {err}"))])
}
