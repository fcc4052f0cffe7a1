//! Safe-execution pipeline (C2): policy, sanitization, and the resource-limited
//! spawn contract that actually runs a command.

pub mod policy;
pub mod sanitize;

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

/// Resource limits applied to every spawned command.
pub const CPU_TIME_LIMIT_SECS: u64 = 30;
pub const ADDRESS_SPACE_LIMIT_BYTES: u64 = 256 * 1024 * 1024;
pub const MAX_CHILD_PROCESSES: u64 = 10;
pub const FILE_SIZE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_OPEN_FILES: u64 = 50;

/// Per-stream cap on captured output; bytes beyond this are discarded.
pub const MAX_OUTPUT_BYTES: usize = 32 * 1024;

/// Maximum number of arguments accepted for a single command invocation.
pub const MAX_ARGS: usize = 32;

/// The SIGXCPU signal number, raised when RLIMIT_CPU is exceeded.
const SIGXCPU: i32 = 24;

/// Outcome of running a command to completion (or to its resource limit).
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// True if the child was terminated by a signal rather than exiting
    /// normally — the basis for the router's `tool_completed`/`tool_failed`
    /// choice.
    pub signalled: bool,
}

/// Apply `libc::setrlimit` for CPU time, address space, process count, file
/// size, and open file descriptors inside the child's `pre_exec` hook, before
/// control transfers to `execve`.
///
/// Grounded on the `setrlimit`-in-`pre_exec` pattern used by Only1MCP's
/// stdio transport and cli-sub-agent's process launcher: each limit is a
/// `libc::rlimit { rlim_cur, rlim_max }` pair passed to `libc::setrlimit`,
/// called from inside `unsafe { cmd.pre_exec(...) }` so it runs in the
/// forked child before exec.
fn apply_resource_limits() -> std::io::Result<()> {
    fn rlimit(limit: u64) -> libc::rlimit {
        libc::rlimit {
            rlim_cur: limit,
            rlim_max: limit,
        }
    }
    unsafe {
        if libc::setrlimit(libc::RLIMIT_CPU, &rlimit(CPU_TIME_LIMIT_SECS)) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::setrlimit(libc::RLIMIT_AS, &rlimit(ADDRESS_SPACE_LIMIT_BYTES)) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::setrlimit(libc::RLIMIT_NPROC, &rlimit(MAX_CHILD_PROCESSES)) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::setrlimit(libc::RLIMIT_FSIZE, &rlimit(FILE_SIZE_LIMIT_BYTES)) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::setrlimit(libc::RLIMIT_NOFILE, &rlimit(MAX_OPEN_FILES)) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Read at most `MAX_OUTPUT_BYTES` from `reader`, draining and discarding any
/// remainder so the child does not block on a full pipe.
async fn capture_capped<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = vec![0u8; MAX_OUTPUT_BYTES];
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    // Drain and discard anything past the cap so the child never blocks
    // writing to a full pipe.
    let mut sink = [0u8; 8192];
    loop {
        match reader.read(&mut sink).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    buf.truncate(filled);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Spawn `command` with `args` under the resource limits above, capture up
/// to [`MAX_OUTPUT_BYTES`] of stdout/stderr, and wait up to `wall_clock_limit`
/// before killing it. `on_spawn` is invoked with the child's pid as soon as
/// `spawn()` succeeds, so a caller (the execution tracker) can record it
/// before the child necessarily finishes.
///
/// `args` beyond [`MAX_ARGS`] are rejected by the caller (`router::call_tool`)
/// before this is ever invoked; this function trusts its caller and does not
/// re-check argument counts or content.
pub async fn spawn_and_capture(
    command: &str,
    args: &[String],
    wall_clock_limit: Duration,
    on_spawn: impl FnOnce(u32),
) -> std::io::Result<ExecOutcome> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    unsafe {
        cmd.pre_exec(|| apply_resource_limits());
    }

    let mut child = cmd.spawn()?;
    if let Some(pid) = child.id() {
        on_spawn(pid);
    }
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    let capture = async {
        let (out, err) = tokio::join!(capture_capped(&mut stdout), capture_capped(&mut stderr));
        let status = child.wait().await?;
        std::io::Result::Ok((out, err, status))
    };

    match timeout(wall_clock_limit, capture).await {
        Ok(Ok((stdout, stderr, status))) => Ok(classify(stdout, stderr, status)),
        Ok(Err(io_err)) => Err(io_err),
        Err(_elapsed) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Ok(ExecOutcome {
                stdout: String::new(),
                stderr: "command exceeded its wall-clock limit".to_string(),
                exit_code: 128 + SIGXCPU,
                timed_out: true,
                signalled: true,
            })
        }
    }
}

/// Turn a `std::process::ExitStatus` into an [`ExecOutcome`]'s exit code and
/// `timed_out` flag. A process killed by SIGXCPU (RLIMIT_CPU exceeded) is
/// reported as `timed_out = true` with code `128 + signal`, matching the
/// wall-clock timeout path above; any other signal is reported as
/// `128 + signal` with `timed_out = false`.
fn classify(stdout: String, stderr: String, status: std::process::ExitStatus) -> ExecOutcome {
    if let Some(signal) = status.signal() {
        return ExecOutcome {
            stdout,
            stderr,
            exit_code: 128 + signal,
            timed_out: signal == SIGXCPU,
            signalled: true,
        };
    }
    ExecOutcome {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(-1),
        timed_out: false,
        signalled: false,
    }
}
