mod language_server;
mod lsp;
mod provider;
mod symbol;

pub use language_server::{LanguageServerProvider, document_uri};
pub use lsp::{
    LspClient, LspClientOptions, LspDiagnostic, LspLocation, LspLocationLink, RequestTimedOut,
    ServerError, path_to_uri, uri_to_path,
};
pub use provider::{Provider, ProviderError, ProviderResult};
pub use symbol::{
    CallHierarchyItem, CodeActionSummary, DocumentSymbolNode, HoverInfo, RawLocation,
    WorkspaceEdit, WorkspaceSymbol, symbol_kind_name,
};
