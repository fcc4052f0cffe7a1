//! Request router (C6): parses one request envelope, dispatches
//! on method name, and returns the ordered list of JSON envelopes the
//! connection handler should write back. `call_tool`'s `tool_started`
//! notification is written straight to the connection as soon as the
//! execution is tracked, since the rest of this function can block for the
//! command's full wall-clock limit.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::audit::AuditRecord;
use crate::catalog::resolve_alias;
use crate::error::ServerError;
use crate::exec::policy::is_safe_command;
use crate::exec::sanitize::sanitize_and_validate;
use crate::exec::{spawn_and_capture, CPU_TIME_LIMIT_SECS, MAX_ARGS};
use crate::protocol::json::{build_error, build_notification, build_response, escape_json_string};
use crate::protocol::Request;
use crate::server::ServerContext;
use crate::tools;
use crate::tracker::ExecutionStatus;

/// Write one envelope, newline-terminated, straight to the connection. Used
/// so `tool_started` reaches the client before `call_tool` blocks on the
/// command's completion, which is what makes `cancel_execution` on a
/// long-running command observable at all.
async fn write_eager<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &str) {
    if writer.write_all(envelope.as_bytes()).await.is_ok() {
        let _ = writer.write_all(b"\n").await;
    }
}

const INTROSPECTION_TOOLS: &[&str] = &[
    "get_shell_info",
    "get_history",
    "get_shell_context",
    "search_commands",
    "suggest_command",
];

/// Route one parsed request to its handler, returning every envelope that
/// must still be written back to the client, in order. `call_tool`'s
/// `tool_started` notification is written eagerly to `writer` as soon as the
/// execution is tracked, rather than queued here, since it must reach the
/// client before this function returns (it may block for up to the
/// command's wall-clock limit).
pub async fn route<W: AsyncWrite + Unpin>(
    ctx: &ServerContext,
    client_fd: &str,
    line: &str,
    writer: &mut W,
) -> Vec<String> {
    let request = Request::parse(line);
    let id = request.id.as_deref();

    let Some(method) = request.method.as_deref() else {
        return vec![build_error(None, "Failed to parse request")];
    };

    match method {
        "initialize" => vec![build_response(
            id,
            r#"{"server":"unified-shell MCP","version":"1.0"}"#,
        )],
        "list_tools" => handle_list_tools(ctx, id).await,
        "call_tool" => handle_call_tool(ctx, client_fd, id, &request, writer).await,
        "get_execution_status" => handle_get_execution_status(ctx, id, &request),
        "cancel_execution" => handle_cancel_execution(ctx, id, &request),
        other => vec![build_error(id, &ServerError::Protocol(format!("Unknown method: {}", other)).to_string())],
    }
}

async fn handle_list_tools(ctx: &ServerContext, id: Option<&str>) -> Vec<String> {
    match ctx.catalog_cache.get_or_load(ctx.catalog_provider.as_ref()).await {
        Ok(catalog) => vec![build_response(id, &catalog.to_tools_json())],
        Err(e) => vec![build_error(id, &e.to_string())],
    }
}

async fn handle_call_tool<W: AsyncWrite + Unpin>(
    ctx: &ServerContext,
    client_fd: &str,
    id: Option<&str>,
    request: &Request,
    writer: &mut W,
) -> Vec<String> {
    let Some(tool) = request.param_str("tool") else {
        return vec![build_error(id, "Missing tool parameter")];
    };

    if INTROSPECTION_TOOLS.contains(&tool.as_str()) {
        return handle_introspection_tool(ctx, id, &tool, request).await;
    }

    let resolved = resolve_alias(&tool).to_string();
    if !is_safe_command(&resolved) {
        return vec![build_error(id, &ServerError::UnsafeCommand(resolved).to_string())];
    }

    let mut envelopes = Vec::new();

    let raw_text = request.param_str("text").unwrap_or_default();
    let args: Vec<String> = if raw_text.is_empty() {
        Vec::new()
    } else {
        raw_text.split_whitespace().map(str::to_string).collect()
    };

    if args.len() > MAX_ARGS {
        return vec![build_error(id, "Too many arguments")];
    }

    let execution_id = match ctx.tracker.track(&resolved, client_fd, None) {
        Ok(eid) => eid,
        Err(e) => {
            envelopes.push(build_error(id, &e.to_string()));
            return envelopes;
        }
    };

    write_eager(
        writer,
        &build_notification(
            id,
            "tool_started",
            &format!("Running {} (execution_id={})", resolved, execution_id),
        ),
    )
    .await;

    let mut sanitized_args = Vec::with_capacity(args.len());
    for arg in &args {
        match sanitize_and_validate(arg) {
            Ok(clean) => sanitized_args.push(clean),
            Err(e) => {
                ctx.tracker.cleanup(execution_id);
                envelopes.push(build_error(id, &ServerError::SanitizeRejected(e).to_string()));
                return envelopes;
            }
        }
    }

    let outcome = spawn_and_capture(
        &resolved,
        &sanitized_args,
        Duration::from_secs(CPU_TIME_LIMIT_SECS + 5),
        |pid| ctx.tracker.set_child_pid(execution_id, pid),
    )
    .await;

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            ctx.tracker.update(execution_id, ExecutionStatus::Failed);
            ctx.tracker.cleanup(execution_id);
            let spawn_error = ServerError::SpawnFailed(resolved.clone(), e.to_string());
            envelopes.push(build_notification(id, "tool_failed", &spawn_error.to_string()));
            envelopes.push(build_error(id, &spawn_error.to_string()));
            return envelopes;
        }
    };

    ctx.audit
        .record(AuditRecord {
            client: client_fd,
            command: &resolved,
            first_arg: sanitized_args.first().map(String::as_str),
            exit_code: outcome.exit_code,
        })
        .await;

    let final_status = if outcome.signalled {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Completed
    };
    ctx.tracker.update(execution_id, final_status);
    ctx.tracker.cleanup(execution_id);

    let result = format!(
        "{{\"execution_id\":\"{}\",\"tool\":\"{}\",\"output\":\"{}\",\"exit_code\":{}}}",
        execution_id,
        escape_json_string(&resolved),
        escape_json_string(&format!("{}{}", outcome.stdout, outcome.stderr)),
        outcome.exit_code,
    );
    envelopes.push(build_response(id, &result));

    if outcome.signalled {
        envelopes.push(build_notification(
            id,
            "tool_failed",
            &format!("{} was terminated by a signal", resolved),
        ));
    } else {
        envelopes.push(build_notification(
            id,
            "tool_completed",
            &format!("{} finished", resolved),
        ));
    }

    envelopes
}

async fn handle_introspection_tool(
    ctx: &ServerContext,
    id: Option<&str>,
    tool: &str,
    request: &Request,
) -> Vec<String> {
    match tool {
        "get_shell_info" => vec![build_response(id, &tools::get_shell_info(ctx.shell.as_ref()))],
        "get_history" => {
            let limit = request
                .param_str("limit")
                .and_then(|s| s.parse::<usize>().ok());
            vec![build_response(id, &tools::get_history(ctx.shell.as_ref(), limit))]
        }
        "get_shell_context" => vec![build_response(id, &tools::get_shell_context(ctx.shell.as_ref()))],
        "search_commands" => {
            let Some(query) = request.param_str("query") else {
                return vec![build_error(id, "Missing query parameter")];
            };
            let limit = request
                .param_str("limit")
                .and_then(|s| s.parse::<usize>().ok());
            match ctx.catalog_cache.get_or_load(ctx.catalog_provider.as_ref()).await {
                Ok(catalog) => vec![build_response(id, &tools::search_commands(catalog, &query, limit))],
                Err(e) => vec![build_error(id, &e.to_string())],
            }
        }
        "suggest_command" => {
            let Some(query) = request.param_str("query") else {
                return vec![build_response(id, r#"{"error":"Missing query parameter"}"#)];
            };
            vec![build_response(id, &tools::suggest_command(&query))]
        }
        other => vec![build_error(id, &ServerError::Protocol(format!("Unknown method: {}", other)).to_string())],
    }
}

fn handle_get_execution_status(
    ctx: &ServerContext,
    id: Option<&str>,
    request: &Request,
) -> Vec<String> {
    let Some(raw_id) = request.param_str("execution_id") else {
        return vec![build_error(id, "Missing execution_id parameter")];
    };
    let Ok(execution_id) = raw_id.parse::<u64>() else {
        return vec![build_error(id, "Invalid execution_id")];
    };
    let Some(execution) = ctx.tracker.find(execution_id) else {
        return vec![build_error(id, &ServerError::UnknownExecution(raw_id).to_string())];
    };
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs().saturating_sub(execution.start_time))
        .unwrap_or(0);
    let result = format!(
        "{{\"execution_id\":\"{}\",\"tool\":\"{}\",\"status\":\"{}\",\"elapsed_time\":{},\"pid\":{}}}",
        execution.id,
        escape_json_string(&execution.tool_name),
        execution.status.as_str(),
        elapsed,
        execution
            .child_pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "null".to_string()),
    );
    vec![build_response(id, &result)]
}

fn handle_cancel_execution(ctx: &ServerContext, id: Option<&str>, request: &Request) -> Vec<String> {
    let Some(raw_id) = request.param_str("execution_id") else {
        return vec![build_error(id, "Missing execution_id parameter")];
    };
    let Ok(execution_id) = raw_id.parse::<u64>() else {
        return vec![build_error(id, "Invalid execution_id")];
    };
    let Some(execution) = ctx.tracker.find(execution_id) else {
        return vec![build_error(id, &format!("Unknown execution id: {}", raw_id))];
    };
    let Some(pid) = execution.child_pid else {
        return vec![build_error(id, "Execution has no associated process yet")];
    };
    // SAFETY: `pid` is a plain integer; libc::kill validates it itself and
    // returns -1 on failure rather than invoking undefined behavior.
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result != 0 {
        let err = ServerError::SignalFailed(pid, std::io::Error::last_os_error().to_string());
        return vec![build_error(id, &err.to_string())];
    }
    ctx.tracker.update(execution_id, ExecutionStatus::Failed);
    vec![build_response(
        id,
        &format!(
            "{{\"execution_id\":\"{}\",\"status\":\"cancelled\"}}",
            execution_id
        ),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{OsShellState, StaticCatalogProvider};
    use std::sync::Arc;

    fn test_ctx() -> ServerContext {
        ServerContext::new(
            Arc::new(StaticCatalogProvider(r#"{"commands":[]}"#.to_string())),
            Arc::new(OsShellState::new()),
            crate::audit::AuditLog::disabled(),
        )
    }

    #[tokio::test]
    async fn test_initialize() {
        let ctx = test_ctx();
        let envelopes = route(&ctx, "fd1", r#"{"id":"1","method":"initialize"}"#, &mut tokio::io::sink()).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(
            envelopes[0],
            r#"{"id":"1","type":"response","result":{"server":"unified-shell MCP","version":"1.0"}}"#
        );
    }

    #[tokio::test]
    async fn test_blacklist_rejected_before_fork() {
        let ctx = test_ctx();
        let envelopes = route(
            &ctx,
            "fd1",
            r#"{"id":"2","method":"call_tool","params":{"tool":"rm","text":"foo"}}"#,
            &mut tokio::io::sink(),
        )
        .await;
        assert_eq!(envelopes.len(), 1);
        assert!(envelopes[0].contains("not found or not allowed"));
        assert!(envelopes[0].contains("\"type\":\"error\""));
    }

    #[tokio::test]
    async fn test_alias_resolved() {
        let ctx = test_ctx();
        let envelopes = route(
            &ctx,
            "fd1",
            r#"{"id":"3","method":"call_tool","params":{"tool":"list_directory"}}"#,
            &mut tokio::io::sink(),
        )
        .await;
        let response = envelopes.iter().find(|e| e.contains("\"type\":\"response\"")).unwrap();
        assert!(response.contains("\"tool\":\"ls\""));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected_no_fork() {
        let ctx = test_ctx();
        let envelopes = route(
            &ctx,
            "fd1",
            r#"{"id":"4","method":"call_tool","params":{"tool":"cat","text":"../../etc/passwd"}}"#,
            &mut tokio::io::sink(),
        )
        .await;
        let error = envelopes.iter().find(|e| e.contains("\"type\":\"error\"")).unwrap();
        assert!(error.contains("Invalid argument"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let ctx = test_ctx();
        let envelopes = route(&ctx, "fd1", r#"{"id":"5","method":"frobnicate"}"#, &mut tokio::io::sink()).await;
        assert!(envelopes[0].contains("Unknown method: frobnicate"));
    }

    #[tokio::test]
    async fn test_missing_method_rejected() {
        let ctx = test_ctx();
        let envelopes = route(&ctx, "fd1", r#"{"id":"6"}"#, &mut tokio::io::sink()).await;
        assert_eq!(envelopes[0], r#"{"id":null,"type":"error","error":"Failed to parse request"}"#);
    }

    #[tokio::test]
    async fn test_get_execution_status_unknown_id() {
        let ctx = test_ctx();
        let envelopes = route(
            &ctx,
            "fd1",
            r#"{"id":"7","method":"get_execution_status","params":{"execution_id":"999"}}"#,
            &mut tokio::io::sink(),
        )
        .await;
        assert!(envelopes[0].contains("Unknown execution id"));
    }

    #[tokio::test]
    async fn test_suggest_command_missing_query() {
        let ctx = test_ctx();
        let envelopes = route(
            &ctx,
            "fd1",
            r#"{"id":"8","method":"call_tool","params":{"tool":"suggest_command"}}"#,
            &mut tokio::io::sink(),
        )
        .await;
        assert!(envelopes[0].contains("Missing query parameter"));
    }
}
