//! Append-only audit log (C3).
//!
//! Disabled silently when no path is configured; write errors are swallowed
//! rather than surfaced, since a failing audit log must never take the
//! server down or fail a tool call.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::protocol::json::escape_json_string;

/// One executed-command record written as a single JSON line.
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub client: &'a str,
    pub command: &'a str,
    /// The first argument only, matching the wire format's `"args":"<first-arg>"`.
    pub first_arg: Option<&'a str>,
    pub exit_code: i32,
}

/// Render a Unix timestamp as `YYYY-MM-DD HH:MM:SS` UTC without pulling in a
/// date/time crate, since this is the only place the crate needs one.
fn format_timestamp(unix_secs: u64) -> String {
    const DAYS_PER_400Y: i64 = 146097;
    let days_since_epoch = (unix_secs / 86400) as i64;
    let secs_of_day = unix_secs % 86400;
    let (hour, minute, second) = (secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60);

    // Civil-from-days algorithm (Howard Hinnant's public-domain date algorithms).
    let z = days_since_epoch + 719468;
    let era = if z >= 0 { z } else { z - DAYS_PER_400Y + 1 } / DAYS_PER_400Y;
    let doe = (z - era * DAYS_PER_400Y) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

/// An append-only, line-buffered audit log. Cheap to clone-share via `Arc`;
/// internally holds the open file handle (if any) behind a `Mutex` so
/// concurrent connections can append without interleaving lines.
pub struct AuditLog {
    writer: Mutex<Option<tokio::fs::File>>,
}

impl AuditLog {
    /// Resolve the audit log path from an explicit override, falling back to
    /// the `USHELL_MCP_AUDIT_LOG` environment variable, and open it for
    /// append. Returns a disabled (no-op) log if neither is set, or if the
    /// file cannot be opened.
    pub async fn from_env_or_path(explicit: Option<&Path>) -> AuditLog {
        let path: Option<PathBuf> = explicit.map(Path::to_path_buf).or_else(|| {
            std::env::var(crate::config::AUDIT_LOG_ENV_VAR)
                .ok()
                .map(PathBuf::from)
        });
        let Some(path) = path else {
            return AuditLog::disabled();
        };
        match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => AuditLog {
                writer: Mutex::new(Some(file)),
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open audit log, disabling");
                AuditLog::disabled()
            }
        }
    }

    /// An audit log that accepts records and silently discards them.
    pub fn disabled() -> AuditLog {
        AuditLog {
            writer: Mutex::new(None),
        }
    }

    /// Append one record as a JSON line. Write errors are logged at `warn`
    /// and otherwise ignored; they never propagate to the caller.
    pub async fn record(&self, rec: AuditRecord<'_>) {
        let mut guard = self.writer.lock().await;
        let Some(file) = guard.as_mut() else {
            return;
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let status = if rec.exit_code == 0 { "success" } else { "failed" };
        let line = format!(
            "{{\"timestamp\":\"{}\",\"client\":\"{}\",\"command\":\"{}\",\"args\":\"{}\",\"exit_code\":{},\"status\":\"{}\"}}\n",
            format_timestamp(now),
            escape_json_string(rec.client),
            escape_json_string(rec.command),
            escape_json_string(rec.first_arg.unwrap_or("")),
            rec.exit_code,
            status,
        );
        if let Err(e) = file.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_log_accepts_records_without_panicking() {
        let log = AuditLog::disabled();
        log.record(AuditRecord {
            client: "unknown",
            command: "ls",
            first_arg: None,
            exit_code: 0,
        })
        .await;
    }

    #[tokio::test]
    async fn test_record_written_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::from_env_or_path(Some(&path)).await;
        log.record(AuditRecord {
            client: "127.0.0.1",
            command: "ls",
            first_arg: Some("-la"),
            exit_code: 0,
        })
        .await;
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("\"command\":\"ls\""));
        assert!(contents.contains("\"args\":\"-la\""));
        assert!(contents.contains("\"status\":\"success\""));
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_format_timestamp_known_value() {
        // 2024-01-15 12:30:45 UTC
        assert_eq!(format_timestamp(1705321845), "2024-01-15 12:30:45");
    }

    #[tokio::test]
    async fn test_no_path_and_no_env_var_disables_log() {
        std::env::remove_var(crate::config::AUDIT_LOG_ENV_VAR);
        let log = AuditLog::from_env_or_path(None).await;
        assert!(log.writer.lock().await.is_none());
    }
}
