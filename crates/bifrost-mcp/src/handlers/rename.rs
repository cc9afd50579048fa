use bifrost_core::text::TextEdit;
use bifrost_lsp::Provider;
use rmcp::model::CallToolResult;
use serde::Serialize;
use tracing::{info, warn};

use crate::args::RenameArgs;
use crate::dispatcher::{Dispatcher, json_result, text_result};
use crate::error::ToolError;

pub(crate) const RENAMED: &str = "Symbol renamed successfully";
pub(crate) const RENAME_FAILED: &str = "Symbol renaming failed";
pub(crate) const NOTHING_TO_RENAME: &str = "Symbol to rename not found";

#[derive(Debug, Serialize)]
struct RenameLocationOut {
    uri: String,
    edits: Vec<TextEdit>,
}

impl<P: Provider> Dispatcher<P> {
    pub(crate) async fn get_rename_locations(&self, args: RenameArgs) -> Result<CallToolResult, ToolError> {
        let edit = self
            .provider
            .rename(&args.text_document.uri, args.position, &args.new_name)
            .await?;
        let out: Vec<RenameLocationOut> = edit
            .unwrap_or_default()
            .into_iter()
            .map(|(uri, edits)| RenameLocationOut { uri, edits })
            .collect();
        json_result(&out)
    }

    /// Applies the rename. The outcome is reported as text, never as an error envelope.
    pub(crate) async fn rename(&self, args: RenameArgs) -> Result<CallToolResult, ToolError> {
        let Some(edit) = self
            .provider
            .rename(&args.text_document.uri, args.position, &args.new_name)
            .await?
        else {
            return Ok(text_result(NOTHING_TO_RENAME));
        };

        match self.provider.apply_edit(&edit).await {
            Ok(()) => {
                info!(
                    "renamed symbol to {} across {} file(s)",
                    args.new_name,
                    edit.len()
                );
                Ok(text_result(RENAMED))
            }
            Err(err) => {
                warn!("applying rename to {} failed: {err}", args.new_name);
                Ok(text_result(RENAME_FAILED))
            }
        }
    }
}
