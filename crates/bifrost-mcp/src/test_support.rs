//! In-memory [`Provider`] for dispatcher, engine and transport tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use bifrost_core::text::{Position, Range};
use bifrost_lsp::{
    CallHierarchyItem, CodeActionSummary, DocumentSymbolNode, HoverInfo, LspLocation,
    LspLocationLink, Provider, ProviderError, ProviderResult, RawLocation, WorkspaceEdit,
    WorkspaceSymbol,
};

pub(crate) fn range(line: u32, character: u32) -> Range {
    Range::new(
        Position::new(line, character),
        Position::new(line, character + 5),
    )
}

pub(crate) fn location(uri: &str, line: u32, character: u32) -> RawLocation {
    RawLocation::Location(LspLocation {
        uri: uri.to_string(),
        range: range(line, character),
    })
}

pub(crate) fn link(uri: &str, line: u32, character: u32) -> RawLocation {
    RawLocation::Link(LspLocationLink {
        target_uri: uri.to_string(),
        target_range: Some(Range::new(Position::new(0, 0), Position::new(line + 3, 0))),
        target_selection_range: Some(range(line, character)),
    })
}

pub(crate) fn item(name: &str, detail: &str, line: u32) -> CallHierarchyItem {
    CallHierarchyItem {
        name: name.to_string(),
        kind: 6,
        detail: (!detail.is_empty()).then(|| detail.to_string()),
        uri: "file:///src/App.cs".to_string(),
        range: Range::new(Position::new(line, 4), Position::new(line + 2, 5)),
        selection_range: range(line, 8),
        tags: None,
        data: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    pub(crate) files: HashMap<String, String>,
    pub(crate) references: Vec<RawLocation>,
    pub(crate) definitions: Vec<RawLocation>,
    pub(crate) implementations: Vec<RawLocation>,
    pub(crate) type_definitions: Vec<RawLocation>,
    pub(crate) code_actions: Vec<CodeActionSummary>,
    pub(crate) hover: Option<HoverInfo>,
    pub(crate) document_symbols: Vec<DocumentSymbolNode>,
    pub(crate) workspace_symbols: Vec<WorkspaceSymbol>,
    pub(crate) roots: Vec<CallHierarchyItem>,
    /// Callers keyed by callee name.
    pub(crate) incoming: HashMap<String, Vec<CallHierarchyItem>>,
    /// Callees keyed by caller name.
    pub(crate) outgoing: HashMap<String, Vec<CallHierarchyItem>>,
    /// Item names whose edge lookups fail.
    pub(crate) failing: HashSet<String>,
    pub(crate) rename_edit: Option<WorkspaceEdit>,
    pub(crate) apply_fails: bool,
    pub(crate) unavailable: bool,
    /// Delay applied to every hover request.
    pub(crate) hover_delay: Option<Duration>,
    pub(crate) applied: Mutex<Vec<WorkspaceEdit>>,
    pub(crate) include_declaration: Mutex<Option<bool>>,
    pub(crate) edge_calls: AtomicUsize,
    pub(crate) reads: AtomicUsize,
    /// Delay applied to every edge lookup.
    pub(crate) edge_delay: Option<Duration>,
    /// `start:<name>` / `end:<name>` per edge lookup, in the order they happened.
    pub(crate) edge_log: Mutex<Vec<String>>,
    pub(crate) edges_in_flight: AtomicUsize,
    pub(crate) max_edges_in_flight: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn with_file(mut self, uri: &str, text: &str) -> Self {
        self.files.insert(uri.to_string(), text.to_string());
        self
    }

    pub(crate) fn with_incoming(mut self, callee: &str, callers: Vec<CallHierarchyItem>) -> Self {
        self.incoming.insert(callee.to_string(), callers);
        self
    }

    pub(crate) fn with_outgoing(mut self, caller: &str, callees: Vec<CallHierarchyItem>) -> Self {
        self.outgoing.insert(caller.to_string(), callees);
        self
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn edge_calls(&self) -> usize {
        self.edge_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> ProviderResult<()> {
        if self.unavailable {
            return Err(ProviderError::Unavailable("fake provider offline".to_string()));
        }
        Ok(())
    }

    pub(crate) fn max_edges_in_flight(&self) -> usize {
        self.max_edges_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn edge_log(&self) -> Vec<String> {
        self.edge_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn log_edge(&self, entry: String) {
        if let Ok(mut log) = self.edge_log.lock() {
            log.push(entry);
        }
    }

    async fn edges(
        &self,
        table: &HashMap<String, Vec<CallHierarchyItem>>,
        item: &CallHierarchyItem,
    ) -> ProviderResult<Vec<CallHierarchyItem>> {
        self.check()?;
        self.edge_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.edges_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_edges_in_flight.fetch_max(running, Ordering::SeqCst);
        self.log_edge(format!("start:{}", item.name));
        if let Some(delay) = self.edge_delay {
            tokio::time::sleep(delay).await;
        }
        self.log_edge(format!("end:{}", item.name));
        self.edges_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&item.name) {
            return Err(anyhow!("edge lookup failed for {}", item.name).into());
        }
        Ok(table.get(&item.name).cloned().unwrap_or_default())
    }
}

impl Provider for FakeProvider {
    async fn exists(&self, uri: &str) -> ProviderResult<bool> {
        Ok(self.files.contains_key(uri))
    }

    async fn read_document(&self, uri: &str) -> ProviderResult<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow!("no such document: {uri}").into())
    }

    async fn references(
        &self,
        _uri: &str,
        _position: Position,
        include_declaration: bool,
    ) -> ProviderResult<Vec<RawLocation>> {
        self.check()?;
        if let Ok(mut seen) = self.include_declaration.lock() {
            *seen = Some(include_declaration);
        }
        Ok(self.references.clone())
    }

    async fn definition(&self, _uri: &str, _position: Position) -> ProviderResult<Vec<RawLocation>> {
        self.check()?;
        Ok(self.definitions.clone())
    }

    async fn implementation(&self, _uri: &str, _position: Position) -> ProviderResult<Vec<RawLocation>> {
        self.check()?;
        Ok(self.implementations.clone())
    }

    async fn type_definition(&self, _uri: &str, _position: Position) -> ProviderResult<Vec<RawLocation>> {
        self.check()?;
        Ok(self.type_definitions.clone())
    }

    async fn code_actions(&self, _uri: &str, _range: Range) -> ProviderResult<Vec<CodeActionSummary>> {
        self.check()?;
        Ok(self.code_actions.clone())
    }

    async fn hover(&self, _uri: &str, _position: Position) -> ProviderResult<Option<HoverInfo>> {
        self.check()?;
        if let Some(delay) = self.hover_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.hover.clone())
    }

    async fn document_symbols(&self, _uri: &str) -> ProviderResult<Vec<DocumentSymbolNode>> {
        self.check()?;
        Ok(self.document_symbols.clone())
    }

    async fn workspace_symbols(&self, query: &str) -> ProviderResult<Vec<WorkspaceSymbol>> {
        self.check()?;
        Ok(self
            .workspace_symbols
            .iter()
            .filter(|s| s.name.contains(query))
            .cloned()
            .collect())
    }

    async fn prepare_call_hierarchy(
        &self,
        _uri: &str,
        _position: Position,
    ) -> ProviderResult<Vec<CallHierarchyItem>> {
        self.check()?;
        Ok(self.roots.clone())
    }

    async fn incoming_calls(&self, item: &CallHierarchyItem) -> ProviderResult<Vec<CallHierarchyItem>> {
        self.edges(&self.incoming, item).await
    }

    async fn outgoing_calls(&self, item: &CallHierarchyItem) -> ProviderResult<Vec<CallHierarchyItem>> {
        self.edges(&self.outgoing, item).await
    }

    async fn rename(
        &self,
        _uri: &str,
        _position: Position,
        _new_name: &str,
    ) -> ProviderResult<Option<WorkspaceEdit>> {
        self.check()?;
        Ok(self.rename_edit.clone())
    }

    async fn apply_edit(&self, edit: &WorkspaceEdit) -> ProviderResult<()> {
        if self.apply_fails {
            return Err(anyhow!("disk is read-only").into());
        }
        if let Ok(mut applied) = self.applied.lock() {
            applied.push(edit.clone());
        }
        Ok(())
    }
}
