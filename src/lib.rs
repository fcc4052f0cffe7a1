//! unified-shell MCP server subsystem
//!
//! Exposes a running interactive shell's built-in command catalog to
//! external AI agents over a line-delimited JSON protocol on TCP, behind a
//! defense-in-depth execution pipeline (whitelist, blacklist, path
//! validation, argument sanitization, per-process resource limits, audit
//! logging, per-connection quotas).

pub mod audit;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod connection;
pub mod error;
pub mod exec;
pub mod protocol;
pub mod router;
pub mod server;
pub mod tools;
pub mod tracker;

pub use audit::{AuditLog, AuditRecord};
pub use catalog::{Catalog, CatalogCache, SchemaProperty, Tool};
pub use collaborators::{CatalogProvider, FsCatalogProvider, OsShellState, ShellStateProvider};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use exec::policy::is_safe_command;
pub use protocol::Request;
pub use server::{McpServer, ServerContext};
pub use tracker::{Execution, ExecutionStatus, ExecutionTracker};
