//! ushell-mcpd — binds the unified-shell MCP server's TCP protocol listener.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use ushell_mcp::{AuditLog, McpServer, ServerConfig};

/// unified-shell MCP server daemon.
#[derive(Parser)]
#[command(name = "ushell-mcpd", version, about = "Expose this shell's command catalog to MCP clients over TCP")]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = ushell_mcp::ServerConfig::default().port)]
    port: u16,

    /// Path to the catalog document.
    #[arg(long, default_value = "aiIntegr/commands.json")]
    catalog: PathBuf,

    /// Path to the audit log. Overrides USHELL_MCP_AUDIT_LOG when given.
    #[arg(long, env = "USHELL_MCP_AUDIT_LOG")]
    audit_log: Option<PathBuf>,

    /// Maximum number of concurrent client connections.
    #[arg(long, default_value_t = ushell_mcp::ServerConfig::default().max_clients)]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig {
        port: cli.port,
        catalog_path: cli.catalog,
        audit_log_path: cli.audit_log,
        max_clients: cli.max_clients,
    };

    let audit = AuditLog::from_env_or_path(config.audit_log_path.as_deref()).await;
    let mut server = McpServer::new(config, audit);

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutting down ushell-mcpd");
        shutdown_for_signal.cancel();
    });

    let addr = server.start().await?;
    tracing::info!(addr = %addr, "ushell-mcpd listening");

    shutdown.cancelled().await;
    server.stop().await;

    Ok(())
}
