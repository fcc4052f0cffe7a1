//! Accept loop and server lifecycle (C8).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditLog;
use crate::catalog::CatalogCache;
use crate::collaborators::{CatalogProvider, FsCatalogProvider, OsShellState, ShellStateProvider};
use crate::config::ServerConfig;
use crate::connection;
use crate::error::Result;
use crate::tracker::ExecutionTracker;

/// Shared, reference-counted state every connection handler reads from —
/// the catalog cache, execution tracker, audit sink, and shell-state
/// collaborator.
pub struct ServerContext {
    pub catalog_provider: Arc<dyn CatalogProvider>,
    pub catalog_cache: CatalogCache,
    pub tracker: ExecutionTracker,
    pub audit: AuditLog,
    pub shell: Arc<dyn ShellStateProvider>,
}

impl ServerContext {
    pub fn new(
        catalog_provider: Arc<dyn CatalogProvider>,
        shell: Arc<dyn ShellStateProvider>,
        audit: AuditLog,
    ) -> Self {
        Self {
            catalog_provider,
            catalog_cache: CatalogCache::new(),
            tracker: ExecutionTracker::new(),
            audit,
            shell,
        }
    }
}

/// The MCP server: owns the listening socket, the shared [`ServerContext`],
/// and the admission-control state (`active_clients`, `running`).
///
/// `active_clients` and the execution table are guarded separately —
/// the execution table's own lock lives inside [`ExecutionTracker`] and
/// `active_clients` is a plain atomic — rather than sharing one lock,
/// since neither ever needs to be updated atomically with the other: a
/// connection only ever touches one of the two at a time, and both updates
/// are non-blocking and brief on their own.
pub struct McpServer {
    config: ServerConfig,
    ctx: Arc<ServerContext>,
    active_clients: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
    accept_task: Option<tokio::task::JoinHandle<()>>,
}

impl McpServer {
    /// Build a server from `config`, using the default filesystem catalog
    /// provider and OS-backed shell-state provider.
    pub fn new(config: ServerConfig, audit: AuditLog) -> Self {
        let catalog_provider = Arc::new(FsCatalogProvider::new(config.catalog_path.clone()));
        let shell = Arc::new(OsShellState::new());
        Self::with_collaborators(config, audit, catalog_provider, shell)
    }

    /// Build a server with explicit collaborators, for tests that want a
    /// catalog or shell state that does not touch the real filesystem/OS.
    pub fn with_collaborators(
        config: ServerConfig,
        audit: AuditLog,
        catalog_provider: Arc<dyn CatalogProvider>,
        shell: Arc<dyn ShellStateProvider>,
    ) -> Self {
        Self {
            config,
            ctx: Arc::new(ServerContext::new(catalog_provider, shell, audit)),
            active_clients: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            accept_task: None,
        }
    }

    /// Bind, listen, and spawn the accept loop as a detached task. Returns
    /// the bound local address (useful for tests that bind an ephemeral
    /// port with `config.port == 0`).
    pub async fn start(&mut self) -> Result<std::net::SocketAddr> {
        ignore_sigpipe();

        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        let local_addr = listener.local_addr()?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let active_clients = self.active_clients.clone();
        let max_clients = self.config.max_clients;
        let ctx = self.ctx.clone();
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(async move {
            accept_loop(listener, running, active_clients, max_clients, ctx, shutdown).await;
        });
        self.accept_task = Some(task);

        Ok(local_addr)
    }

    /// Stop accepting new connections and wait for the accept loop to exit.
    /// In-flight connection handlers are not waited on — they run detached.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        tracing::info!("server stopped");
    }

    /// Stop if running. This is the final teardown step.
    pub async fn destroy(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            self.stop().await;
        }
    }

    pub fn active_clients(&self) -> usize {
        self.active_clients.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
fn ignore_sigpipe() {
    // SAFETY: installing a signal disposition with a well-known constant
    // handler is always safe; no memory is touched.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigpipe() {}

async fn accept_loop(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    active_clients: Arc<AtomicUsize>,
    max_clients: usize,
    ctx: Arc<ServerContext>,
    shutdown: CancellationToken,
) {
    while running.load(Ordering::SeqCst) {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.cancelled() => break,
        };

        let (stream, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        let current = active_clients.load(Ordering::SeqCst);
        if current >= max_clients {
            connection::reject_over_capacity(stream).await;
            continue;
        }
        active_clients.fetch_add(1, Ordering::SeqCst);

        let ctx = ctx.clone();
        let active_clients = active_clients.clone();
        tokio::spawn(async move {
            connection::handle_connection(stream, peer_addr, ctx, active_clients).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticCatalogProvider;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.port = 0;
        config.max_clients = 2;
        config
    }

    fn empty_catalog_server() -> McpServer {
        McpServer::with_collaborators(
            test_config(),
            AuditLog::disabled(),
            Arc::new(StaticCatalogProvider(r#"{"commands":[]}"#.to_string())),
            Arc::new(OsShellState::new()),
        )
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port_and_stop_tears_down() {
        let mut server = empty_catalog_server();
        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.stop().await;
    }
}
