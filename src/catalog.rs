//! Catalog loader (C4): turns the external catalog document into
//! tool descriptors with inferred JSON-schema, appends the synthetic
//! introspection tools, and resolves the alias table.

use tokio::sync::OnceCell;

use crate::collaborators::CatalogProvider;
use crate::error::{Result, ServerError};
use crate::protocol::json::extract_field;

/// Maximum size of the catalog document.
pub const MAX_CATALOG_BYTES: usize = 512 * 1024;

/// Maximum number of command entries read from the catalog document.
pub const MAX_TOOLS: usize = 100;

/// Aliases resolved before whitelist/blacklist checks. Unknown
/// names pass through unchanged.
const ALIASES: &[(&str, &str)] = &[
    ("list_directory", "ls"),
    ("change_directory", "cd"),
    ("remove_file", "myrm"),
    ("copy_file", "mycp"),
    ("move_file", "mymv"),
    ("create_directory", "mymkdir"),
    ("remove_directory", "myrmdir"),
    ("display_file", "mycat"),
];

/// Resolve a tool name through the alias table; names with no alias entry
/// pass through unchanged.
pub fn resolve_alias(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

/// One argument/option of a tool, with its inferred JSON-schema type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaProperty {
    pub name: String,
    pub json_type: &'static str,
    pub description: String,
    pub required: bool,
}

/// A single callable tool, either derived from the catalog document or one
/// of the two synthetic introspection tools.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub properties: Vec<SchemaProperty>,
}

impl Tool {
    /// Render this tool's `inputSchema` as a JSON object literal.
    pub fn input_schema_json(&self) -> String {
        let props: Vec<String> = self
            .properties
            .iter()
            .map(|p| {
                format!(
                    "\"{}\":{{\"type\":\"{}\",\"description\":\"{}\"}}",
                    crate::protocol::json::escape_json_string(&p.name),
                    p.json_type,
                    crate::protocol::json::escape_json_string(&p.description),
                )
            })
            .collect();
        format!(
            "{{\"type\":\"object\",\"properties\":{{{}}}}}",
            props.join(",")
        )
    }
}

/// Infer a schema type from an argument name.
fn infer_type(arg_name: &str) -> &'static str {
    let lower = arg_name.to_ascii_lowercase();
    const INTEGER_MARKERS: &[&str] = &["count", "number", "size", "limit", "max", "min"];
    const BOOLEAN_MARKERS: &[&str] = &["flag", "enable", "disable", "recursive"];
    if INTEGER_MARKERS.iter().any(|m| lower.contains(m)) {
        "integer"
    } else if BOOLEAN_MARKERS.iter().any(|m| lower.contains(m)) {
        "boolean"
    } else {
        "string"
    }
}

/// Infer required-ness of `arg_name` from the tool's `usage` string:
/// `<name>` is required, `[name]` is optional, absence is optional.
fn infer_required(usage: &str, arg_name: &str) -> bool {
    usage.contains(&format!("<{}>", arg_name))
}

/// Parse one `{"name":...,"summary":...,...}` command entry (already
/// isolated to its own brace-delimited substring) into a [`Tool`].
fn parse_command_entry(entry: &str) -> Option<Tool> {
    let name = extract_field(entry, "name")?.into_string();
    let summary = extract_field(entry, "summary")
        .map(|v| v.into_string())
        .unwrap_or_default();
    let description = extract_field(entry, "description").map(|v| v.into_string());
    let usage = extract_field(entry, "usage")
        .map(|v| v.into_string())
        .unwrap_or_default();

    let full_description = match description {
        Some(d) if !d.is_empty() => format!("{}: {}", summary, d),
        _ => summary,
    };

    let properties = parse_options(entry, &usage);

    Some(Tool {
        name,
        description: full_description,
        properties,
    })
}

/// Scan the `options` array of a command entry (brace-depth over each
/// `{...}` element) and emit a schema property for every option whose `arg`
/// field is present.
fn parse_options(entry: &str, usage: &str) -> Vec<SchemaProperty> {
    let Some(array_start) = entry.find("\"options\"") else {
        return Vec::new();
    };
    let rest = &entry[array_start..];
    let Some(bracket_start) = rest.find('[') else {
        return Vec::new();
    };
    let rest = &rest[bracket_start..];

    let mut properties = Vec::new();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut object_start: Option<usize> = None;

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
            '{' => {
                if depth == 0 {
                    object_start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = object_start.take() {
                        let object = &rest[start..=idx];
                        if let Some(arg) = extract_field(object, "arg") {
                            let arg_name = arg.into_string();
                            let help = extract_field(object, "help")
                                .map(|v| v.into_string())
                                .unwrap_or_default();
                            let json_type = infer_type(&arg_name);
                            let required = infer_required(usage, &arg_name);
                            properties.push(SchemaProperty {
                                name: arg_name,
                                json_type,
                                description: help,
                                required,
                            });
                        }
                    }
                }
            }
            ']' if depth == 0 => break,
            _ => {}
        }
    }
    properties
}

/// Split the `commands` array of the catalog document into the raw substring
/// of each element (brace-depth counting, same discipline as
/// [`crate::protocol::json::object_span`]).
fn split_command_entries(document: &str) -> Vec<&str> {
    let Some(array_start) = document.find("\"commands\"") else {
        return Vec::new();
    };
    let rest = &document[array_start..];
    let Some(bracket_start) = rest.find('[') else {
        return Vec::new();
    };
    let rest = &rest[bracket_start..];

    let mut entries = Vec::new();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut object_start: Option<usize> = None;

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
            '{' => {
                if depth == 0 {
                    object_start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = object_start.take() {
                        entries.push(&rest[start..=idx]);
                    }
                }
            }
            ']' if depth == 0 => break,
            _ => {}
        }
    }
    entries
}

/// The two synthetic tools appended unconditionally.
fn synthetic_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "get_shell_info".to_string(),
            description: "Returns the shell's current working directory, user, and hostname"
                .to_string(),
            properties: Vec::new(),
        },
        Tool {
            name: "get_history".to_string(),
            description: "Returns recent command history".to_string(),
            properties: vec![SchemaProperty {
                name: "limit".to_string(),
                json_type: "integer",
                description: "Maximum number of history entries to return".to_string(),
                required: false,
            }],
        },
    ]
}

/// The loaded, immutable tool catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub tools: Vec<Tool>,
}

impl Catalog {
    /// Parse a raw catalog document into a [`Catalog`], enforcing the
    /// 512 KiB / 100-tool caps and appending the synthetic tools.
    pub fn parse(document: &str) -> Result<Catalog> {
        if document.len() > MAX_CATALOG_BYTES {
            return Err(ServerError::CatalogTooLarge("<in-memory document>".to_string()));
        }
        let mut tools: Vec<Tool> = split_command_entries(document)
            .into_iter()
            .take(MAX_TOOLS)
            .filter_map(parse_command_entry)
            .collect();
        tools.extend(synthetic_tools());
        Ok(Catalog { tools })
    }

    /// Look up a tool by name.
    pub fn find(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Render the full tools array as a JSON array literal, for `list_tools`.
    pub fn to_tools_json(&self) -> String {
        let entries: Vec<String> = self
            .tools
            .iter()
            .map(|t| {
                format!(
                    "{{\"name\":\"{}\",\"description\":\"{}\",\"inputSchema\":{}}}",
                    crate::protocol::json::escape_json_string(&t.name),
                    crate::protocol::json::escape_json_string(&t.description),
                    t.input_schema_json(),
                )
            })
            .collect();
        format!("[{}]", entries.join(","))
    }
}

/// Loads and caches a [`Catalog`] at most once per owning [`McpServer`]
/// instance. An instance field rather than a process-wide static, so
/// multiple servers can coexist in one process without sharing a catalog.
#[derive(Default)]
pub struct CatalogCache {
    cell: OnceCell<Catalog>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog via `provider` on first call; subsequent calls
    /// return the cached result regardless of `provider`.
    pub async fn get_or_load(&self, provider: &dyn CatalogProvider) -> Result<&Catalog> {
        self.cell
            .get_or_try_init(|| async {
                let raw = provider.load_raw()?;
                Catalog::parse(&raw)
            })
            .await
    }
}
