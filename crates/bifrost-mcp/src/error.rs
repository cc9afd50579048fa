use bifrost_lsp::ProviderError;

/// Failure of a single tool call. Always rendered into an `isError` envelope.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("File not found - {0}")]
    ResourceNotFound(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        Self::Provider(ProviderError::Failure(err))
    }
}

/// Transport-level failure of a session operation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Server not initialized")]
    NotInitialized,
    #[error("transport closed: {0}")]
    Transport(String),
}
