//! Server configuration — construction and defaults.
//!
//! Unlike the rest of the pipeline, configuration has no wire representation:
//! it is built directly by the `cli` binary from process arguments and
//! environment variables, then handed to [`crate::server::McpServer::new`].

use std::path::PathBuf;

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 9000;

/// Default path to the catalog document, relative to the process's cwd.
pub const DEFAULT_CATALOG_PATH: &str = "aiIntegr/commands.json";

/// Maximum number of concurrent client connections.
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Environment variable naming the audit log path when none is passed explicitly.
pub const AUDIT_LOG_ENV_VAR: &str = "USHELL_MCP_AUDIT_LOG";

/// Construction-time configuration for an [`crate::server::McpServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to bind.
    pub port: u16,
    /// Path to the catalog document.
    pub catalog_path: PathBuf,
    /// Explicit audit log path; `None` falls back to `USHELL_MCP_AUDIT_LOG`, and
    /// to silent logging being disabled if that is unset too.
    pub audit_log_path: Option<PathBuf>,
    /// Maximum concurrent client connections.
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
            audit_log_path: None,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}
