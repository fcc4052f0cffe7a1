//! Minimal JSON field extraction and envelope assembly (C1).
//!
//! This is intentionally not a general JSON parser. It locates a named field
//! by substring search, then reads either a quoted string (unescaping
//! `\n \t \r \\ \"`) or a bare scalar up to the next `,`/`}`/`]`/newline. It
//! does not parse nested arrays or objects — callers that need a field from
//! inside a nested object (the `params` object, a catalog command entry) must
//! first isolate that object's substring with [`object_span`] and re-probe it
//! with [`extract_field`]. Failure to find a field is signaled by `None`,
//! never by a partial write.

/// A field value as extracted from a JSON object, before any further typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A quoted JSON string, already unescaped.
    Str(String),
    /// A bare scalar (number, bool, null, or unquoted token), verbatim.
    Raw(String),
}

impl FieldValue {
    /// Borrow the value as a string slice regardless of variant.
    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Str(s) => s,
            FieldValue::Raw(s) => s,
        }
    }

    /// Consume into an owned `String`.
    pub fn into_string(self) -> String {
        match self {
            FieldValue::Str(s) => s,
            FieldValue::Raw(s) => s,
        }
    }
}

/// Find the `"field":` key and return the start index of its value (the
/// first non-whitespace byte after the colon), or `None` if the key does not
/// appear as a quoted object key in `src`.
fn find_value_start(src: &str, field: &str) -> Option<usize> {
    let needle = format!("\"{}\"", field);
    let mut search_from = 0;
    while let Some(rel) = src[search_from..].find(&needle) {
        let key_start = search_from + rel;
        let after_key = key_start + needle.len();
        let rest = &src[after_key..];
        let colon_offset = rest.find(':')?;
        // Only whitespace may separate the key from the colon.
        if rest[..colon_offset].trim().is_empty() {
            let value_region = &rest[colon_offset + 1..];
            let value_start = after_key
                + colon_offset
                + 1
                + (value_region.len() - value_region.trim_start().len());
            return Some(value_start);
        }
        search_from = after_key;
    }
    None
}

/// Extract a named field's value from a JSON object substring.
///
/// Returns `None` if the field is absent. Does not validate that `src` is a
/// well-formed object; it only needs `"field":` to appear somewhere in it
/// followed by a scalar or quoted-string value.
pub fn extract_field(src: &str, field: &str) -> Option<FieldValue> {
    let value_start = find_value_start(src, field)?;
    let rest = &src[value_start..];
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, '"')) => {
            let mut out = String::new();
            let mut escaped = false;
            for (idx, c) in chars {
                if escaped {
                    match c {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        other => out.push(other),
                    }
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    let _ = idx;
                    return Some(FieldValue::Str(out));
                } else {
                    out.push(c);
                }
            }
            // Unterminated string — treat as absent rather than partial.
            None
        }
        Some(_) => {
            let end = rest
                .find([',', '}', ']', '\n'])
                .unwrap_or(rest.len());
            let raw = rest[..end].trim();
            if raw.is_empty() {
                None
            } else {
                Some(FieldValue::Raw(raw.to_string()))
            }
        }
        None => None,
    }
}

/// Isolate the substring of a brace-delimited object value for a named field,
/// starting at its opening `{` and ending at its matching `}` (inclusive).
///
/// Used to hand a nested object (e.g. `params`) to another extractor without
/// this module needing to understand its contents. Returns `None` if the
/// field is absent or its value does not start with `{`.
pub fn object_span(src: &str, field: &str) -> Option<&str> {
    let value_start = find_value_start(src, field)?;
    let rest = &src[value_start..];
    if !rest.starts_with('{') {
        return None;
    }
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in rest.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Escape a string for embedding as a JSON string literal (without the
/// surrounding quotes). Covers `" \ \n \r \t \x08 \x0c` and drops other
/// non-printable ASCII control bytes.
pub fn escape_json_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                // Drop other non-printable ASCII control characters silently.
            }
            c => out.push(c),
        }
    }
    out
}

/// Build a `{"id":..., "type":"response", "result":<raw>}` envelope.
///
/// `id` is `None` when the request carried no `id`; `result` is a raw JSON
/// fragment (object or array literal) assembled by the caller, inserted
/// verbatim.
pub fn build_response(id: Option<&str>, result: &str) -> String {
    format!(
        "{{\"id\":{},\"type\":\"response\",\"result\":{}}}",
        encode_id(id),
        result
    )
}

/// Build a `{"id":..., "type":"error", "error":"<escaped>"}` envelope.
pub fn build_error(id: Option<&str>, message: &str) -> String {
    format!(
        "{{\"id\":{},\"type\":\"error\",\"error\":\"{}\"}}",
        encode_id(id),
        escape_json_string(message)
    )
}

/// Build a `{"id":..., "type":"notification", "event":"...", "message":"..."}` envelope.
pub fn build_notification(id: Option<&str>, event: &str, message: &str) -> String {
    format!(
        "{{\"id\":{},\"type\":\"notification\",\"event\":\"{}\",\"message\":\"{}\"}}",
        encode_id(id),
        escape_json_string(event),
        escape_json_string(message)
    )
}

fn encode_id(id: Option<&str>) -> String {
    match id {
        Some(s) => format!("\"{}\"", escape_json_string(s)),
        None => "null".to_string(),
    }
}
