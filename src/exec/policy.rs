//! Whitelist/blacklist policy for the safe-execution pipeline (C2).

/// Commands callable through `call_tool`. Checked only after the blacklist.
pub const WHITELIST: &[&str] = &[
    "pwd", "echo", "ls", "cat", "date", "whoami", "hostname", "cd", "env", "export", "set",
    "unset", "help", "version", "history", "myls", "mycat", "mycp", "mymv", "myrm", "mymkdir",
    "myrmdir", "mytouch", "mystat", "myfd", "grep", "find", "wc", "head", "tail", "sort", "uniq",
];

/// Commands rejected unconditionally, checked before the whitelist.
pub const BLACKLIST: &[&str] = &[
    "sudo",
    "su",
    "chmod",
    "chown",
    "rm",
    "dd",
    "mkfs",
    "fdisk",
    "reboot",
    "shutdown",
    "halt",
    "poweroff",
    "kill",
    "killall",
    "iptables",
    "systemctl",
    "service",
];

/// A command passes policy only if it is not blacklisted and is whitelisted
///. Blacklist is checked first so an
/// explicit deny can never be shadowed by also appearing in the whitelist.
pub fn is_safe_command(name: &str) -> bool {
    if BLACKLIST.contains(&name) {
        return false;
    }
    WHITELIST.contains(&name)
}
