//! Path validation, argument sanitization, and integer validation (C2).

/// Maximum length of a single sanitized argument (the "output buffer" in the
/// source's terms — we just cap the accumulated string).
pub const MAX_ARG_LEN: usize = 4096;

/// Substrings that disqualify a path-like argument (contains `/`).
const FORBIDDEN_PATH_SUBSTRINGS: &[&str] = &[
    "/etc/", "/sys/", "/proc/", "/dev/", "/boot/", "shadow", "passwd", ".ssh/",
];

/// Characters silently dropped from an argument during sanitization, never
/// rejecting the whole argument for containing them.
const STRIPPED_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '<', '>', '\'', '"', '\\', '*', '?', '[', ']', '{', '}',
    '~', '!',
];

/// Returns true if `c` is in the allowed alphabet: `[A-Za-z0-9] ∪ {. / - _ : = , @ space}`.
fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '.' | '/' | '-' | '_' | ':' | '=' | ',' | '@' | ' ')
}

/// Validate a path-bearing argument.
///
/// Only arguments containing `/` are subject to this check; arguments with
/// no `/` cannot reference an absolute or relative filesystem path and skip
/// straight to sanitization. Rejects `..` anywhere, any of the forbidden
/// substrings, or an embedded NUL.
pub fn validate_path_argument(arg: &str) -> Result<(), String> {
    if arg.contains('\0') {
        return Err("argument contains a NUL byte".to_string());
    }
    if !arg.contains('/') {
        return Ok(());
    }
    if arg.contains("..") {
        return Err("path traversal (..) is not allowed".to_string());
    }
    for forbidden in FORBIDDEN_PATH_SUBSTRINGS {
        if arg.contains(forbidden) {
            return Err(format!("path references a forbidden location: {}", forbidden));
        }
    }
    Ok(())
}

/// Sanitize an argument: reject if too long, silently strip shell-metacharacters,
/// then keep only characters in the allowed alphabet.
///
/// Path validation (`validate_path_argument`) must be run first by the
/// caller — this function does not itself reject `..` or forbidden paths.
pub fn sanitize_argument(arg: &str) -> Result<String, String> {
    if arg.len() > MAX_ARG_LEN {
        return Err("argument exceeds maximum length".to_string());
    }
    let stripped: String = arg.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    let sanitized: String = stripped.chars().filter(|c| is_allowed_char(*c)).collect();
    Ok(sanitized)
}

/// Run both path validation and character sanitization on an argument, as
/// the `call_tool` algorithm does for every non-introspection argument
///.
pub fn sanitize_and_validate(arg: &str) -> Result<String, String> {
    validate_path_argument(arg)?;
    sanitize_argument(arg)
}

/// Parse a base-10 integer, requiring full consumption of `s` and enforcing
/// `[min, max]`.
pub fn validate_integer(s: &str, min: i64, max: i64) -> Result<i64, String> {
    let value: i64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid base-10 integer", s))?;
    if value < min || value > max {
        return Err(format!(
            "value {} is out of range [{}, {}]",
            value, min, max
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_traversal_rejected() {
        assert!(validate_path_argument("../../etc/passwd").is_err());
    }

    #[test]
    fn test_forbidden_substrings_rejected() {
        assert!(validate_path_argument("/etc/shadow").is_err());
        assert!(validate_path_argument("a/b/.ssh/id_rsa").is_err());
    }

    #[test]
    fn test_nul_byte_rejected_even_without_slash() {
        assert!(validate_path_argument("foo\0bar").is_err());
    }

    #[test]
    fn test_plain_relative_path_allowed() {
        assert!(validate_path_argument("subdir/file.txt").is_ok());
    }

    #[test]
    fn test_non_path_argument_always_passes_path_validation() {
        assert!(validate_path_argument("hello-world").is_ok());
    }

    #[test]
    fn test_sanitize_strips_shell_metacharacters() {
        let out = sanitize_argument("foo; rm -rf / | cat `whoami`").unwrap();
        assert!(!out.contains(';'));
        assert!(!out.contains('|'));
        assert!(!out.contains('`'));
    }

    #[test]
    fn test_sanitize_keeps_only_allowed_alphabet() {
        let out = sanitize_argument("a.b/c-d_e:f=g,h@i j").unwrap();
        assert_eq!(out, "a.b/c-d_e:f=g,h@i j");
    }

    #[test]
    fn test_sanitize_rejects_overlong_argument() {
        let long = "a".repeat(MAX_ARG_LEN + 1);
        assert!(sanitize_argument(&long).is_err());
    }

    #[test]
    fn test_sanitize_result_contains_only_allowed_alphabet_property() {
        // Any argument that survives sanitization contains only allowed chars.
        let inputs = [
            "plain text",
            "weird$(injection)here",
            "a/b/../c", // path validation would catch this separately
            "",
        ];
        for input in inputs {
            let out = sanitize_argument(input).unwrap();
            assert!(out.chars().all(is_allowed_char));
        }
    }

    #[test]
    fn test_validate_integer_accepts_in_range() {
        assert_eq!(validate_integer("5", 0, 10).unwrap(), 5);
    }

    #[test]
    fn test_validate_integer_rejects_out_of_range() {
        assert!(validate_integer("11", 0, 10).is_err());
        assert!(validate_integer("-1", 0, 10).is_err());
    }

    #[test]
    fn test_validate_integer_rejects_partial_consumption() {
        assert!(validate_integer("5abc", 0, 10).is_err());
        assert!(validate_integer(" 5", 0, 10).is_err());
    }
}
