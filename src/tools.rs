//! Special tool handlers (C9): introspection tools that do not go
//! through the safe-exec pipeline.

use crate::catalog::Catalog;
use crate::collaborators::ShellStateProvider;
use crate::protocol::json::escape_json_string;

const DEFAULT_HISTORY_LIMIT: usize = 10;
const DEFAULT_SEARCH_LIMIT: usize = 5;

/// `get_shell_info`: `{cwd, user, hostname}` from OS queries.
pub fn get_shell_info(shell: &dyn ShellStateProvider) -> String {
    format!(
        "{{\"cwd\":\"{}\",\"user\":\"{}\",\"hostname\":\"{}\"}}",
        escape_json_string(&shell.cwd().display().to_string()),
        escape_json_string(&shell.user()),
        escape_json_string(&shell.hostname()),
    )
}

/// `get_history`: bounded array of recent command strings.
pub fn get_history(shell: &dyn ShellStateProvider, limit: Option<usize>) -> String {
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let entries: Vec<String> = shell
        .history(limit)
        .into_iter()
        .map(|h| format!("\"{}\"", escape_json_string(&h)))
        .collect();
    format!("[{}]", entries.join(","))
}

/// `get_shell_context`: composite `{cwd, user, history, env}`.
pub fn get_shell_context(shell: &dyn ShellStateProvider) -> String {
    let history: Vec<String> = shell
        .history(DEFAULT_HISTORY_LIMIT)
        .into_iter()
        .map(|h| format!("\"{}\"", escape_json_string(&h)))
        .collect();
    let env: Vec<String> = shell
        .env_snapshot()
        .into_iter()
        .map(|(k, v)| {
            format!(
                "\"{}\":\"{}\"",
                escape_json_string(&k),
                escape_json_string(&v)
            )
        })
        .collect();
    format!(
        "{{\"cwd\":\"{}\",\"user\":\"{}\",\"history\":[{}],\"env\":{{{}}}}}",
        escape_json_string(&shell.cwd().display().to_string()),
        escape_json_string(&shell.user()),
        history.join(","),
        env.join(","),
    )
}

/// One scored search hit.
struct SearchHit<'a> {
    name: &'a str,
    description: &'a str,
    score: usize,
}

/// Count case-insensitive whitespace-token overlap between `query` and
/// `haystack`.
fn keyword_overlap(query_tokens: &[String], haystack: &str) -> usize {
    let haystack_lower = haystack.to_ascii_lowercase();
    query_tokens
        .iter()
        .filter(|token| haystack_lower.contains(token.as_str()))
        .count()
}

/// `search_commands`: rank catalog tools by keyword overlap against `query`.
pub fn search_commands(catalog: &Catalog, query: &str, limit: Option<usize>) -> String {
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let query_tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_ascii_lowercase())
        .collect();

    let mut hits: Vec<SearchHit> = catalog
        .tools
        .iter()
        .map(|tool| {
            let haystack = format!("{} {}", tool.name, tool.description);
            SearchHit {
                name: &tool.name,
                description: &tool.description,
                score: keyword_overlap(&query_tokens, &haystack),
            }
        })
        .filter(|hit| hit.score > 0)
        .collect();

    // Stable sort by descending score; ties keep catalog order.
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(limit);

    let results: Vec<String> = hits
        .iter()
        .map(|hit| {
            format!(
                "{{\"name\":\"{}\",\"description\":\"{}\",\"score\":{}}}",
                escape_json_string(hit.name),
                escape_json_string(hit.description),
                hit.score,
            )
        })
        .collect();

    format!(
        "{{\"query\":\"{}\",\"results\":[{}]}}",
        escape_json_string(query),
        results.join(",")
    )
}

/// One `suggest_command` rule: all `keywords` must be present (as
/// case-insensitive substrings of the query) for the rule to fire.
struct SuggestRule {
    keywords: &'static [&'static str],
    command: &'static str,
    explanation: &'static str,
}

const SUGGEST_RULES: &[SuggestRule] = &[
    SuggestRule {
        keywords: &["list", "file"],
        command: "ls -la",
        explanation: "Lists files, including hidden ones, in long format",
    },
    SuggestRule {
        keywords: &["find", "python"],
        command: "find . -name '*.py'",
        explanation: "Finds all Python source files under the current directory",
    },
    SuggestRule {
        keywords: &["current", "directory"],
        command: "pwd",
        explanation: "Prints the current working directory",
    },
];

/// `suggest_command`: evaluate keyword rules top-to-bottom, first full
/// keyword-subset match wins. Missing `query` is its own distinct case
/// handled by the caller.
pub fn suggest_command(query: &str) -> String {
    let lower = query.to_ascii_lowercase();
    for rule in SUGGEST_RULES {
        if rule.keywords.iter().all(|k| lower.contains(k)) {
            return format!(
                "{{\"query\":\"{}\",\"command\":\"{}\",\"explanation\":\"{}\"}}",
                escape_json_string(query),
                escape_json_string(rule.command),
                escape_json_string(rule.explanation),
            );
        }
    }
    format!(
        "{{\"error\":\"No matching command suggestion for query: {}\"}}",
        escape_json_string(query)
    )
}
