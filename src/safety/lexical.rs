//! Lexical classification of SQL statements.
//!
//! This is a conservative keyword filter, not a parser. It over-rejects:
//! forbidden words inside string literals or quoted identifiers still
//! count. Comments that split a keyword (`DEL/**/ETE`) and homoglyphs are
//! not detected; the executor's read-only transaction is the backstop.

use regex::Regex;
use std::sync::OnceLock;

use super::{RejectReason, ValidationVerdict};

/// Keywords that must not appear anywhere in an allowed statement.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "grant", "revoke",
    "execute", "call",
];

fn forbidden_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let alternation = FORBIDDEN_KEYWORDS.join("|");
        Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
            .expect("keyword alternation is a valid pattern")
    })
}

/// Classifies `sql` as read-only or not.
///
/// Rules are applied in order and the first failing rule decides the reason:
/// leading keyword, statement separators, then forbidden keywords.
pub fn validate(sql: &str) -> ValidationVerdict {
    let statement = sql.trim();

    if !leading_word(statement).eq_ignore_ascii_case("select") {
        return ValidationVerdict::reject(RejectReason::NonSelect);
    }

    let body = statement.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if body.contains(';') {
        return ValidationVerdict::reject(RejectReason::MultipleStatements);
    }

    if forbidden_pattern().is_match(body) {
        return ValidationVerdict::reject(RejectReason::ForbiddenKeyword);
    }

    ValidationVerdict::allow()
}

/// Returns the leading run of word characters.
fn leading_word(statement: &str) -> &str {
    let end = statement
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(statement.len());
    &statement[..end]
}
