use anyhow::{Context, Result};
use bifrost_lsp::Provider;
use rmcp::ServiceExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::protocol::ProtocolServer;

/// Runs `server` as an MCP service over a byte stream pair until the peer hangs up.
///
/// The stream carries newline-delimited JSON-RPC and forms one implicit session.
pub async fn serve_stream<P, R, W>(server: ProtocolServer<P>, reader: R, writer: W) -> Result<()>
where
    P: Provider,
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    info!("serving {} over stdio", server.project_name());
    let running = server
        .serve((reader, writer))
        .await
        .context("MCP initialization failed")?;
    let reason = running.waiting().await.context("MCP service task failed")?;
    debug!("stdio session ended: {reason:?}");
    Ok(())
}
