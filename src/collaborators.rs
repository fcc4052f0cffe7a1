//! External collaborator seams: the catalog provider, the
//! shell-state provider, and (implicitly) the safe-exec pipeline as command
//! executor. These traits let the MCP subsystem be built and tested without
//! the rest of the shell it is normally embedded in.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::catalog::MAX_CATALOG_BYTES;
use crate::error::{Result, ServerError};

/// Supplies the raw catalog document bytes to [`crate::catalog::Catalog::load`].
pub trait CatalogProvider: Send + Sync {
    fn load_raw(&self) -> Result<String>;
}

/// Reads the catalog document from disk, enforcing the 512 KiB size cap
/// before handing bytes to the catalog loader.
pub struct FsCatalogProvider {
    path: PathBuf,
}

impl FsCatalogProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogProvider for FsCatalogProvider {
    fn load_raw(&self) -> Result<String> {
        let metadata = std::fs::metadata(&self.path)
            .map_err(|e| ServerError::CatalogLoad(self.path.display().to_string(), e.to_string()))?;
        if metadata.len() as usize > MAX_CATALOG_BYTES {
            return Err(ServerError::CatalogTooLarge(self.path.display().to_string()));
        }
        std::fs::read_to_string(&self.path)
            .map_err(|e| ServerError::CatalogLoad(self.path.display().to_string(), e.to_string()))
    }
}

/// Exposes current shell state to C9's introspection handlers.
pub trait ShellStateProvider: Send + Sync {
    fn cwd(&self) -> PathBuf;
    fn user(&self) -> String;
    fn hostname(&self) -> String;
    /// Most recent commands first, bounded by `limit`.
    fn history(&self, limit: usize) -> Vec<String>;
    fn env_snapshot(&self) -> HashMap<String, String>;
    /// Record a command name into the in-memory history ring buffer.
    fn push_history(&self, command: &str);
}

const HISTORY_CAPACITY: usize = 256;

/// Default [`ShellStateProvider`] backed by `std::env`/`libc` queries and an
/// in-process bounded history ring buffer.
pub struct OsShellState {
    history: Mutex<VecDeque<String>>,
}

impl OsShellState {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }
}

impl Default for OsShellState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellStateProvider for OsShellState {
    fn cwd(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
    }

    fn user(&self) -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn hostname(&self) -> String {
        let mut buf = vec![0u8; 256];
        // SAFETY: `buf` is a valid writable buffer of the given length; the
        // kernel writes at most that many bytes and NUL-terminates on success.
        let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if ret != 0 {
            return "unknown".to_string();
        }
        let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..nul]).into_owned()
    }

    fn history(&self, limit: usize) -> Vec<String> {
        let history = self.history.lock().expect("history mutex poisoned");
        history.iter().rev().take(limit).cloned().collect()
    }

    fn env_snapshot(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }

    fn push_history(&self, command: &str) {
        let mut history = self.history.lock().expect("history mutex poisoned");
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(command.to_string());
    }
}

/// Used by tests that need a `CatalogProvider` without touching the filesystem.
#[cfg(test)]
pub struct StaticCatalogProvider(pub String);

#[cfg(test)]
impl CatalogProvider for StaticCatalogProvider {
    fn load_raw(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_catalog_provider_rejects_oversize_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.json");
        std::fs::write(&path, "x".repeat(MAX_CATALOG_BYTES + 1)).unwrap();
        let provider = FsCatalogProvider::new(&path);
        assert!(matches!(
            provider.load_raw(),
            Err(ServerError::CatalogTooLarge(_))
        ));
    }

    #[test]
    fn test_fs_catalog_provider_reads_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.json");
        std::fs::write(&path, r#"{"commands":[]}"#).unwrap();
        let provider = FsCatalogProvider::new(&path);
        assert_eq!(provider.load_raw().unwrap(), r#"{"commands":[]}"#);
    }

    #[test]
    fn test_os_shell_state_history_is_bounded_and_most_recent_first() {
        let state = OsShellState::new();
        state.push_history("ls");
        state.push_history("pwd");
        let history = state.history(10);
        assert_eq!(history, vec!["pwd".to_string(), "ls".to_string()]);
    }
}
