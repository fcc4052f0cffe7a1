//! Error types for the unified-shell MCP server subsystem.

use thiserror::Error;

/// Main error type for server operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The catalog document could not be read from its backing store.
    #[error("failed to load catalog from '{0}': {1}")]
    CatalogLoad(String, String),

    /// The catalog document exceeded the 512 KiB size cap.
    #[error("catalog at '{0}' exceeds the 512 KiB size cap")]
    CatalogTooLarge(String),

    /// A requested tool name did not resolve to a whitelisted, non-blacklisted command.
    #[error("command not found or not allowed: {0}")]
    UnsafeCommand(String),

    /// An argument failed path validation or character-class sanitization.
    #[error("Invalid argument: {0}")]
    SanitizeRejected(String),

    /// The execution tracker has no free slot.
    #[error("tracking full")]
    TrackerFull,

    /// No execution record exists for the given id.
    #[error("unknown execution id: {0}")]
    UnknownExecution(String),

    /// The child process could not be spawned.
    #[error("failed to spawn '{0}': {1}")]
    SpawnFailed(String, String),

    /// Sending a signal to a tracked child failed.
    #[error("failed to signal pid {0}: {1}")]
    SignalFailed(u32, String),

    /// The request envelope was malformed or missing a required field.
    #[error("{0}")]
    Protocol(String),

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsafe_command_display() {
        let err = ServerError::UnsafeCommand("rm".to_string());
        assert_eq!(err.to_string(), "command not found or not allowed: rm");
    }

    #[test]
    fn test_sanitize_rejected_display() {
        let err = ServerError::SanitizeRejected("path traversal".to_string());
        assert_eq!(err.to_string(), "Invalid argument: path traversal");
    }

    #[test]
    fn test_tracker_full_display() {
        assert_eq!(ServerError::TrackerFull.to_string(), "tracking full");
    }
}
