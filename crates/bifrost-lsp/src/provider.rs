use std::future::Future;
use std::time::Duration;

use bifrost_core::text::{Position, Range};

use crate::lsp::{METHOD_NOT_FOUND, RequestTimedOut, ServerError};
use crate::symbol::{
    CallHierarchyItem, CodeActionSummary, DocumentSymbolNode, HoverInfo, RawLocation,
    WorkspaceEdit, WorkspaceSymbol,
};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Not configured, not started yet, or missing the capability.
    #[error("code intelligence provider unavailable: {0}")]
    Unavailable(String),
    #[error("{operation} timed out after {} seconds", .after.as_secs())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
    #[error(transparent)]
    Failure(#[from] anyhow::Error),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Classifies a language server request error for `operation`.
    pub fn from_request(operation: &'static str, err: anyhow::Error) -> Self {
        if let Some(timed_out) = err.downcast_ref::<RequestTimedOut>() {
            return Self::TimedOut {
                operation,
                after: timed_out.after,
            };
        }
        if let Some(server) = err.downcast_ref::<ServerError>()
            && server.code == METHOD_NOT_FOUND
        {
            return Self::Unavailable(format!("language server does not support {}", server.method));
        }
        Self::Failure(err)
    }
}

/// External code-intelligence service.
///
/// Every call may be slow and may fail. Dropping a returned future abandons the request.
pub trait Provider: Send + Sync + 'static {
    /// Whether the document behind `uri` exists.
    fn exists(&self, uri: &str) -> impl Future<Output = ProviderResult<bool>> + Send;

    /// Full text of the document, used for previews.
    fn read_document(&self, uri: &str) -> impl Future<Output = ProviderResult<String>> + Send;

    fn references(
        &self,
        uri: &str,
        position: Position,
        include_declaration: bool,
    ) -> impl Future<Output = ProviderResult<Vec<RawLocation>>> + Send;

    fn definition(
        &self,
        uri: &str,
        position: Position,
    ) -> impl Future<Output = ProviderResult<Vec<RawLocation>>> + Send;

    fn implementation(
        &self,
        uri: &str,
        position: Position,
    ) -> impl Future<Output = ProviderResult<Vec<RawLocation>>> + Send;

    fn type_definition(
        &self,
        uri: &str,
        position: Position,
    ) -> impl Future<Output = ProviderResult<Vec<RawLocation>>> + Send;

    fn code_actions(
        &self,
        uri: &str,
        range: Range,
    ) -> impl Future<Output = ProviderResult<Vec<CodeActionSummary>>> + Send;

    fn hover(
        &self,
        uri: &str,
        position: Position,
    ) -> impl Future<Output = ProviderResult<Option<HoverInfo>>> + Send;

    fn document_symbols(
        &self,
        uri: &str,
    ) -> impl Future<Output = ProviderResult<Vec<DocumentSymbolNode>>> + Send;

    fn workspace_symbols(
        &self,
        query: &str,
    ) -> impl Future<Output = ProviderResult<Vec<WorkspaceSymbol>>> + Send;

    fn prepare_call_hierarchy(
        &self,
        uri: &str,
        position: Position,
    ) -> impl Future<Output = ProviderResult<Vec<CallHierarchyItem>>> + Send;

    /// Callers of `item`, in provider order.
    fn incoming_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> impl Future<Output = ProviderResult<Vec<CallHierarchyItem>>> + Send;

    /// Callees of `item`, in provider order.
    fn outgoing_calls(
        &self,
        item: &CallHierarchyItem,
    ) -> impl Future<Output = ProviderResult<Vec<CallHierarchyItem>>> + Send;

    /// Edits that would rename the symbol at `position`; `None` when nothing is renameable there.
    fn rename(
        &self,
        uri: &str,
        position: Position,
        new_name: &str,
    ) -> impl Future<Output = ProviderResult<Option<WorkspaceEdit>>> + Send;

    /// Writes `edit` to the workspace.
    fn apply_edit(&self, edit: &WorkspaceEdit) -> impl Future<Output = ProviderResult<()>> + Send;
}
