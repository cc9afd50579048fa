use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bifrost_core::config::{ProjectSettings, load_config, resolve_settings};
use bifrost_lsp::Provider;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatcher::{Dispatcher, HierarchyLimits};
use crate::http::{HttpState, router};
use crate::protocol::ProtocolServer;
use crate::registry::ToolRegistry;
use crate::session::SessionManager;

struct RunningServer<P> {
    addr: SocketAddr,
    sessions: Arc<SessionManager<P>>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns everything a running tool server needs: settings, provider, registry and the HTTP listener.
pub struct ServerContext<P: Provider> {
    settings: ProjectSettings,
    provider: Arc<P>,
    registry: Arc<ToolRegistry>,
    config_path: Option<PathBuf>,
    workspace_root: Option<PathBuf>,
    running: Option<RunningServer<P>>,
}

impl<P: Provider> ServerContext<P> {
    pub fn new(settings: ProjectSettings, provider: Arc<P>) -> Self {
        Self {
            settings,
            provider,
            registry: Arc::new(ToolRegistry::new()),
            config_path: None,
            workspace_root: None,
            running: None,
        }
    }

    /// Where [`reload`](Self::reload) re-reads configuration from.
    pub fn with_config_source(
        mut self,
        config_path: Option<PathBuf>,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        self.config_path = config_path;
        self.workspace_root = workspace_root;
        self
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Session table of the running HTTP server.
    pub fn sessions(&self) -> Option<&Arc<SessionManager<P>>> {
        self.running.as_ref().map(|r| &r.sessions)
    }

    /// Protocol server bound to the current settings.
    pub fn protocol_server(&self) -> ProtocolServer<P> {
        let dispatcher = Dispatcher::new(
            self.provider.clone(),
            self.registry.clone(),
            HierarchyLimits::from_settings(&self.settings),
        );
        ProtocolServer::new(dispatcher, &self.settings)
    }

    /// Binds `host:port` and serves the streaming transport. Starting twice is a no-op.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let sessions = Arc::new(SessionManager::new(self.settings.heartbeat_interval));
        sessions.install(Arc::new(self.protocol_server()));

        let bind = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        let addr = listener.local_addr().context("failed to read bound address")?;

        let app = router(Arc::new(HttpState {
            manager: sessions.clone(),
            base_path: self.settings.base_path.clone(),
            project_name: self.settings.project_name.clone(),
            description: self.settings.description.clone(),
        }));
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
                warn!("HTTP server error: {err}");
            }
        });

        info!(
            "{} listening on http://{addr}{}/sse",
            self.settings.project_name, self.settings.base_path
        );
        self.running = Some(RunningServer {
            addr,
            sessions,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Closes every session and waits for the listener to shut down.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.sessions.uninstall();
        running.shutdown.cancel();
        if let Err(err) = running.task.await {
            warn!("HTTP server task ended abnormally: {err}");
        }
        info!("{} stopped", self.settings.project_name);
    }

    pub async fn restart(&mut self, settings: ProjectSettings) -> Result<SocketAddr> {
        self.stop().await;
        if settings.provider != self.settings.provider {
            warn!("language server settings changed; the running provider is kept until the next launch");
        }
        self.settings = settings;
        self.start().await
    }

    /// Re-reads configuration and restarts when the effective settings changed.
    ///
    /// Returns whether a restart happened.
    pub async fn reload(&mut self) -> Result<bool> {
        let loaded = load_config(self.config_path.as_deref(), self.workspace_root.as_deref())?;
        let settings = resolve_settings(&loaded.config, &loaded.workspace_root);
        if settings == self.settings {
            return Ok(false);
        }
        info!("configuration changed ({:?}); restarting", loaded.source);
        if self.is_running() {
            self.restart(settings).await?;
        } else {
            self.settings = settings;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::FakeProvider;
    use bifrost_core::config::BifrostConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn write_config(root: &std::path::Path, name: &str) {
        std::fs::write(
            root.join("bifrost.config.json"),
            format!(r#"{{ "projectName": "{name}", "description": "Order service", "path": "orders", "port": 0 }}"#),
        )
        .unwrap();
    }

    fn context(root: &std::path::Path) -> ServerContext<FakeProvider> {
        let loaded = load_config(None, Some(root)).unwrap();
        let settings = resolve_settings(&loaded.config, &loaded.workspace_root);
        ServerContext::new(settings, Arc::new(FakeProvider::default()))
            .with_config_source(None, Some(root.to_path_buf()))
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_health_under_base_path() {
        let root = tempfile::tempdir().unwrap();
        write_config(root.path(), "orders");
        let mut ctx = context(root.path());

        let addr = ctx.start().await.unwrap();
        assert!(ctx.is_running());
        let response = get(addr, "/orders/health").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains(r#""project":"orders""#), "{response}");

        ctx.stop().await;
        assert!(!ctx.is_running());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn reload_restarts_only_on_change() {
        let root = tempfile::tempdir().unwrap();
        write_config(root.path(), "orders");
        let mut ctx = context(root.path());
        ctx.start().await.unwrap();

        assert!(!ctx.reload().await.unwrap());

        write_config(root.path(), "billing");
        assert!(ctx.reload().await.unwrap());
        assert_eq!(ctx.settings().project_name, "billing");
        let addr = ctx.local_addr().unwrap();
        let response = get(addr, "/orders/health").await;
        assert!(response.contains(r#""project":"billing""#), "{response}");

        ctx.stop().await;
    }

    #[tokio::test]
    async fn stop_closes_open_sessions() {
        let mut settings = resolve_settings(&BifrostConfig::default(), std::path::Path::new("."));
        settings.port = 0;
        settings.heartbeat_interval = Duration::from_secs(30);
        let mut ctx = ServerContext::new(settings, Arc::new(FakeProvider::default()));
        ctx.start().await.unwrap();

        let sessions = ctx.sessions().unwrap().clone();
        sessions.open_session().unwrap();
        assert_eq!(sessions.len(), 1);

        ctx.stop().await;
        assert!(sessions.is_empty());
        assert!(sessions.server().is_none());
    }
}
