use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bifrost_core::config::{load_config, resolve_settings};
use bifrost_lsp::LanguageServerProvider;
use tracing::{info, warn};

mod args;
pub mod call_hierarchy;
mod context;
mod dispatcher;
mod error;
mod handlers;
mod http;
pub mod normalize;
mod protocol;
mod registry;
mod session;
mod stdio;
mod tool_schemas;

#[cfg(test)]
mod test_support;

pub use context::ServerContext;
pub use dispatcher::{Dispatcher, HierarchyLimits};
pub use error::{SessionError, ToolError};
pub use protocol::{ProtocolServer, SERVER_NAME, SERVER_VERSION};
pub use registry::ToolRegistry;
pub use session::{Delivery, Frame, SessionManager};
pub use stdio::serve_stream;

#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub config_path: Option<PathBuf>,
    pub workspace_root: Option<PathBuf>,
    /// Overrides the configured port.
    pub port: Option<u16>,
    /// Start the language server before the first tool call.
    pub warmup: bool,
}

async fn build_context(options: &ServeOptions) -> Result<ServerContext<LanguageServerProvider>> {
    let loaded = load_config(options.config_path.as_deref(), options.workspace_root.as_deref())?;
    info!("configuration: {:?}", loaded.source);
    let mut settings = resolve_settings(&loaded.config, &loaded.workspace_root);
    if let Some(port) = options.port {
        settings.port = port;
    }

    let provider = Arc::new(LanguageServerProvider::new(settings.provider.clone()));
    if options.warmup && provider.is_configured() {
        if let Err(err) = provider.warmup().await {
            warn!("language server warmup failed: {err}");
        }
    }

    Ok(ServerContext::new(settings, provider)
        .with_config_source(options.config_path.clone(), options.workspace_root.clone()))
}

/// Serves the SSE/HTTP transport until ctrl-c.
pub async fn run_http_with_options(options: ServeOptions) -> Result<()> {
    let mut ctx = build_context(&options).await?;
    ctx.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    ctx.stop().await;
    ctx.provider().shutdown().await;
    Ok(())
}

/// Serves MCP over stdin/stdout until the client disconnects.
pub async fn run_stdio_with_options(options: ServeOptions) -> Result<()> {
    let ctx = build_context(&options).await?;
    let result = serve_stream(ctx.protocol_server(), tokio::io::stdin(), tokio::io::stdout()).await;
    ctx.provider().shutdown().await;
    result
}
