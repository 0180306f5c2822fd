//! SQL extraction from model output.
//!
//! Models wrap SQL in markdown fences, prefix it with chatter, or quote it.
//! This module isolates a single statement from that text.

use crate::error::{AskError, Result};

/// Words a statement may start with. Write verbs are included so the
/// safety gate, not the extractor, decides what gets refused.
const SQL_VERBS: &[&str] = &[
    "select", "with", "insert", "update", "delete", "drop", "alter", "create", "truncate",
    "grant", "revoke", "execute", "call", "explain", "show", "merge",
];

/// Words that may stand next to each other in a statement without any
/// punctuation between them.
const SQL_KEYWORDS: &[&str] = &[
    "add", "all", "analyze", "and", "any", "as", "asc", "at", "between", "by", "cascade", "case",
    "cast", "check", "column", "constraint", "cross", "default", "desc", "distinct", "else",
    "end", "escape", "except", "if", "index", "key", "primary", "references", "unique", "view",
    "exists", "false", "fetch", "filter", "first", "for", "from", "full", "group", "having",
    "ilike", "in", "inner", "intersect", "interval", "into", "is", "join", "last", "lateral",
    "left", "like", "limit", "materialized", "natural", "next", "not", "null", "nulls", "of",
    "offset", "on", "only", "or", "order", "outer", "over", "partition", "range", "recursive",
    "right", "rows", "set", "similar", "some", "then", "time", "timestamp", "to", "true",
    "union", "using", "values", "when", "where", "window", "within", "zone",
];

/// Longest run of plain non-keyword words a statement may contain. Aliases
/// (`FROM users u`) make two; English sentences quickly exceed it.
const MAX_PLAIN_WORD_RUN: usize = 2;

/// Fence tags treated as SQL.
const SQL_FENCE_TAGS: &[&str] = &["sql", "postgres", "postgresql", "pgsql"];

/// Raw model output together with the statement isolated from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedStatement {
    /// Text exactly as the model returned it.
    pub raw_model_output: String,
    /// Extracted SQL, if any.
    pub extracted_sql: Option<String>,
}

impl GeneratedStatement {
    /// Runs extraction over `raw`.
    pub fn from_model_output(raw: impl Into<String>) -> Self {
        let raw_model_output = raw.into();
        let extracted_sql = find_statement(&raw_model_output);
        Self {
            raw_model_output,
            extracted_sql,
        }
    }

    /// Returns the extracted SQL or an `ExtractionFailed` error.
    pub fn sql(&self) -> Result<&str> {
        self.extracted_sql.as_deref().ok_or_else(|| {
            AskError::extraction("model output did not contain a recognizable SQL statement")
        })
    }
}

/// Extracts a single SQL statement from model output.
pub fn extract_sql(raw: &str) -> Result<String> {
    find_statement(raw).ok_or_else(|| {
        AskError::extraction("model output did not contain a recognizable SQL statement")
    })
}

/// Fenced SQL first, then a generic fence, then the first verb-led line.
fn find_statement(raw: &str) -> Option<String> {
    let fenced = fenced_blocks(raw);

    let tagged = fenced
        .iter()
        .find(|block| block.tag.as_deref().is_some_and(is_sql_tag))
        .map(|block| block.body);
    let untagged = fenced
        .iter()
        .find(|block| block.tag.is_none())
        .map(|block| block.body);

    for candidate in [tagged, untagged].into_iter().flatten() {
        if let Some(sql) = clean_candidate(candidate) {
            return Some(sql);
        }
    }

    first_verb_led_block(raw).and_then(clean_candidate)
}

struct FencedBlock<'a> {
    tag: Option<String>,
    body: &'a str,
}

/// Splits out every closed ``` block, in order of appearance.
fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut rest = text;
    let mut offset = 0;

    while let Some(start) = rest.find("```") {
        let after_fence = offset + start + 3;
        let Some(newline) = text[after_fence..].find('\n') else {
            break;
        };
        let tag = text[after_fence..after_fence + newline].trim();
        let body_start = after_fence + newline + 1;
        let Some(end) = text[body_start..].find("```") else {
            break;
        };

        blocks.push(FencedBlock {
            tag: (!tag.is_empty()).then(|| tag.to_lowercase()),
            body: &text[body_start..body_start + end],
        });

        offset = body_start + end + 3;
        rest = &text[offset..];
    }

    blocks
}

fn is_sql_tag(tag: &str) -> bool {
    SQL_FENCE_TAGS.contains(&tag)
}

/// Finds the first SQL-looking line led by a verb and the continuation
/// lines after it. The block ends at a blank line, a fence, a line that
/// reads as prose, or after a line terminated by `;`.
fn first_verb_led_block(text: &str) -> Option<&str> {
    let mut start = None;
    let mut end = text.len();
    let mut position = 0;

    for line in text.split_inclusive('\n') {
        let line_start = position;
        position += line.len();
        let trimmed = line.trim();

        match start {
            None => {
                let candidate = strip_label(trimmed);
                if starts_with_verb(candidate) && !reads_as_prose(candidate) {
                    start = Some(line_start);
                } else {
                    continue;
                }
            }
            Some(_)
                if trimmed.is_empty() || trimmed.starts_with("```") || reads_as_prose(trimmed) =>
            {
                end = line_start;
                break;
            }
            Some(_) => {}
        }

        if trimmed.ends_with(';') {
            end = position;
            break;
        }
    }

    start.map(|s| &text[s..end])
}

/// Trims labels, quotes and terminators; `None` if what's left is not a
/// verb-led statement.
fn clean_candidate(candidate: &str) -> Option<String> {
    let mut sql = strip_label(candidate.trim()).trim();

    loop {
        let stripped = strip_matching_quotes(sql)
            .trim()
            .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if stripped == sql {
            break;
        }
        sql = stripped;
    }

    (!sql.is_empty() && starts_with_verb(sql) && !reads_as_prose(sql)).then(|| sql.to_string())
}

/// True when `text` reads like an English sentence rather than SQL: it ends
/// with sentence punctuation, leaves a quote open, or strings together more
/// plain words than SQL grammar allows.
fn reads_as_prose(text: &str) -> bool {
    let Some(code) = without_literals(text) else {
        return true;
    };
    if code.trim_end().ends_with(['.', '?', '!']) {
        return true;
    }

    let mut run = 0;
    for token in code.split_whitespace() {
        let plain = token.chars().all(|c| c.is_ascii_alphabetic());
        if plain && !is_keyword(token) {
            run += 1;
            if run > MAX_PLAIN_WORD_RUN {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn is_keyword(word: &str) -> bool {
    let word = word.to_lowercase();
    SQL_KEYWORDS.contains(&word.as_str()) || SQL_VERBS.contains(&word.as_str())
}

/// Replaces quoted literals and identifiers with `_` and drops comments.
/// `None` when a quote or block comment is never closed.
fn without_literals(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                chars.by_ref().find(|&next| next == c)?;
                out.push('_');
            }
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                loop {
                    let next = chars.next()?;
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Drops a leading `sql:` label.
fn strip_label(text: &str) -> &str {
    match text.get(..4) {
        Some(label) if label.eq_ignore_ascii_case("sql:") => text[4..].trim_start(),
        _ => text,
    }
}

fn strip_matching_quotes(text: &str) -> &str {
    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn starts_with_verb(text: &str) -> bool {
    let word: String = text
        .trim_start_matches(['"', '\'', '`'])
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();
    SQL_VERBS.contains(&word.as_str())
}
