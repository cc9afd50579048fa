use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use bifrost_core::config::ResolvedProviderConfig;
use bifrost_core::hashing::sha256_hex;
use bifrost_core::text::{Position, Range, apply_text_edits};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::lsp::{LspClient, LspClientOptions, path_to_uri, uri_to_path};
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::symbol::{
    CallHierarchyItem, CodeActionSummary, DocumentSymbolNode, HoverInfo, RawLocation,
    WorkspaceEdit, WorkspaceSymbol, parse_call_edges, parse_call_hierarchy_items,
    parse_code_actions, parse_document_symbols, parse_hover, parse_locations,
    parse_workspace_edit, parse_workspace_symbols,
};

#[derive(Debug, Clone)]
struct OpenDocument {
    version: i32,
    sha256: String,
}

/// [`Provider`] backed by a language server process, started on first use.
pub struct LanguageServerProvider {
    config: Option<ResolvedProviderConfig>,
    client: OnceCell<Arc<LspClient>>,
    documents: Mutex<HashMap<PathBuf, OpenDocument>>,
}

impl LanguageServerProvider {
    pub fn new(config: Option<ResolvedProviderConfig>) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            documents: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Starts the language server now instead of on the first tool call.
    pub async fn warmup(&self) -> ProviderResult<()> {
        self.client().await.map(|_| ())
    }

    pub async fn shutdown(&self) {
        if let Some(client) = self.client.get() {
            if let Err(err) = client.shutdown().await {
                warn!("language server shutdown failed: {err:#}");
            }
        }
    }

    fn config(&self) -> ProviderResult<&ResolvedProviderConfig> {
        self.config.as_ref().ok_or_else(|| {
            ProviderError::Unavailable("no language server configured (provider.command)".to_string())
        })
    }

    async fn client(&self) -> ProviderResult<Arc<LspClient>> {
        let config = self.config()?;
        let client = self
            .client
            .get_or_try_init(|| async {
                info!(
                    "starting language server command={} root={}",
                    config.command,
                    config.root_dir.display()
                );
                LspClient::start(LspClientOptions {
                    command: config.command.clone(),
                    args: config.args.clone(),
                    cwd: config.root_dir.clone(),
                    initialize_timeout: config.initialize_timeout,
                    request_timeout: config.request_timeout,
                    initialization_options: config.initialization_options.clone(),
                })
                .await
                .map(Arc::new)
            })
            .await
            .map_err(|err| ProviderError::Unavailable(format!("{err:#}")))?;
        Ok(client.clone())
    }

    /// Opens the document or pushes its current content when it changed on disk.
    async fn sync_document(&self, client: &LspClient, uri: &str) -> ProviderResult<()> {
        let config = self.config()?;
        let path = uri_to_path(uri)?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let digest = sha256_hex(text.as_bytes());

        let mut documents = self.documents.lock().await;
        match documents.get_mut(&path) {
            Some(doc) if doc.sha256 == digest => {}
            Some(doc) => {
                doc.version += 1;
                doc.sha256 = digest;
                debug!("didChange {} v{}", path.display(), doc.version);
                client.did_change(uri, doc.version, text).await?;
            }
            None => {
                let language_id = config
                    .language_id
                    .clone()
                    .unwrap_or_else(|| language_id_for(&path).to_string());
                client.did_open(uri, &language_id, 1, text).await?;
                documents.insert(
                    path,
                    OpenDocument {
                        version: 1,
                        sha256: digest,
                    },
                );
            }
        }
        Ok(())
    }

    async fn document_request(
        &self,
        operation: &'static str,
        method: &str,
        uri: &str,
        position: Position,
    ) -> ProviderResult<Value> {
        let client = self.client().await?;
        self.sync_document(&client, uri).await?;
        let wait = self.config()?.timeout_for(method);
        client
            .text_document_request(method, uri, position, Some(wait))
            .await
            .map_err(|e| ProviderError::from_request(operation, e))
    }

    async fn calls(
        &self,
        operation: &'static str,
        method: &str,
        key: &str,
        item: &CallHierarchyItem,
    ) -> ProviderResult<Vec<CallHierarchyItem>> {
        let client = self.client().await?;
        let wait = self.config()?.timeout_for(method);
        let item = serde_json::to_value(item).context("failed to encode CallHierarchyItem")?;
        let value = client
            .call_hierarchy_calls(method, &item, Some(wait))
            .await
            .map_err(|e| ProviderError::from_request(operation, e))?;
        Ok(parse_call_edges(value, key)?)
    }

    fn ensure_within_root(&self, path: &Path) -> ProviderResult<PathBuf> {
        let configured = &self.config()?.root_dir;
        let root = configured
            .canonicalize()
            .unwrap_or_else(|_| configured.clone());
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {}", path.display()))?;
        if !canonical.starts_with(&root) {
            return Err(anyhow!(
                "refusing to write outside workspace root ({}): {}",
                root.display(),
                canonical.display()
            )
            .into());
        }
        Ok(canonical)
    }
}

impl Provider for LanguageServerProvider {
    async fn exists(&self, uri: &str) -> ProviderResult<bool> {
        let Ok(path) = uri_to_path(uri) else {
            return Ok(false);
        };
        Ok(tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()))
    }

    async fn read_document(&self, uri: &str) -> ProviderResult<String> {
        let path = uri_to_path(uri)?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(text)
    }

    async fn references(
        &self,
        uri: &str,
        position: Position,
        include_declaration: bool,
    ) -> ProviderResult<Vec<RawLocation>> {
        let client = self.client().await?;
        self.sync_document(&client, uri).await?;
        let wait = self.config()?.timeout_for("textDocument/references");
        let value = client
            .references(uri, position, include_declaration, Some(wait))
            .await
            .map_err(|e| ProviderError::from_request("Reference search", e))?;
        Ok(parse_locations(value)?)
    }

    async fn definition(&self, uri: &str, position: Position) -> ProviderResult<Vec<RawLocation>> {
        let value = self
            .document_request("Definition lookup", "textDocument/definition", uri, position)
            .await?;
        Ok(parse_locations(value)?)
    }

    async fn implementation(
        &self,
        uri: &str,
        position: Position,
    ) -> ProviderResult<Vec<RawLocation>> {
        let value = self
            .document_request(
                "Implementation search",
                "textDocument/implementation",
                uri,
                position,
            )
            .await?;
        Ok(parse_locations(value)?)
    }

    async fn type_definition(
        &self,
        uri: &str,
        position: Position,
    ) -> ProviderResult<Vec<RawLocation>> {
        let value = self
            .document_request(
                "Type definition lookup",
                "textDocument/typeDefinition",
                uri,
                position,
            )
            .await?;
        Ok(parse_locations(value)?)
    }

    async fn code_actions(&self, uri: &str, range: Range) -> ProviderResult<Vec<CodeActionSummary>> {
        let client = self.client().await?;
        self.sync_document(&client, uri).await?;
        let wait = self.config()?.timeout_for("textDocument/codeAction");
        let value = client
            .code_actions(uri, range, Some(wait))
            .await
            .map_err(|e| ProviderError::from_request("Code action lookup", e))?;
        Ok(parse_code_actions(value)?)
    }

    async fn hover(&self, uri: &str, position: Position) -> ProviderResult<Option<HoverInfo>> {
        let value = self
            .document_request("Hover lookup", "textDocument/hover", uri, position)
            .await?;
        Ok(parse_hover(value)?)
    }

    async fn document_symbols(&self, uri: &str) -> ProviderResult<Vec<DocumentSymbolNode>> {
        let client = self.client().await?;
        self.sync_document(&client, uri).await?;
        let wait = self.config()?.timeout_for("textDocument/documentSymbol");
        let value = client
            .document_symbols(uri, Some(wait))
            .await
            .map_err(|e| ProviderError::from_request("Document symbol lookup", e))?;
        Ok(parse_document_symbols(value)?)
    }

    async fn workspace_symbols(&self, query: &str) -> ProviderResult<Vec<WorkspaceSymbol>> {
        let client = self.client().await?;
        let wait = self.config()?.timeout_for("workspace/symbol");
        let value = client
            .workspace_symbols(query, Some(wait))
            .await
            .map_err(|e| ProviderError::from_request("Workspace symbol search", e))?;
        Ok(parse_workspace_symbols(value)?)
    }

    async fn prepare_call_hierarchy(
        &self,
        uri: &str,
        position: Position,
    ) -> ProviderResult<Vec<CallHierarchyItem>> {
        let value = self
            .document_request(
                "Call hierarchy preparation",
                "textDocument/prepareCallHierarchy",
                uri,
                position,
            )
            .await?;
        Ok(parse_call_hierarchy_items(value)?)
    }

    async fn incoming_calls(&self, item: &CallHierarchyItem) -> ProviderResult<Vec<CallHierarchyItem>> {
        self.calls("Incoming call lookup", "callHierarchy/incomingCalls", "from", item)
            .await
    }

    async fn outgoing_calls(&self, item: &CallHierarchyItem) -> ProviderResult<Vec<CallHierarchyItem>> {
        self.calls("Outgoing call lookup", "callHierarchy/outgoingCalls", "to", item)
            .await
    }

    async fn rename(
        &self,
        uri: &str,
        position: Position,
        new_name: &str,
    ) -> ProviderResult<Option<WorkspaceEdit>> {
        let client = self.client().await?;
        self.sync_document(&client, uri).await?;
        let wait = self.config()?.timeout_for("textDocument/rename");
        let value = client
            .rename(uri, position, new_name, Some(wait))
            .await
            .map_err(|e| ProviderError::from_request("Rename", e))?;
        Ok(parse_workspace_edit(value)?)
    }

    async fn apply_edit(&self, edit: &WorkspaceEdit) -> ProviderResult<()> {
        // Compute every new file before writing any of them.
        let mut staged = Vec::with_capacity(edit.len());
        for (uri, edits) in edit {
            let path = self.ensure_within_root(&uri_to_path(uri)?)?;
            let original = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let updated = apply_text_edits(&original, edits)
                .with_context(|| format!("failed to apply edits to {}", path.display()))?;
            staged.push((uri.as_str(), path, updated));
        }

        for (_, path, updated) in &staged {
            tokio::fs::write(path, updated)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        info!("applied workspace edit to {} file(s)", staged.len());

        if let Some(client) = self.client.get() {
            for (uri, _, _) in &staged {
                let key = uri_to_path(uri)?;
                if self.documents.lock().await.contains_key(&key) {
                    self.sync_document(client, uri).await?;
                }
            }
        }
        Ok(())
    }
}

fn language_id_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "cs" | "csx" => "csharp",
        "vb" => "vb",
        "fs" | "fsx" => "fsharp",
        "rs" => "rust",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "java" => "java",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        _ => "plaintext",
    }
}

/// URI of `path`, for callers holding plain paths.
pub fn document_uri(path: &Path) -> ProviderResult<String> {
    Ok(path_to_uri(path)?)
}
