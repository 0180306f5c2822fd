//! Read-only safety gate.
//!
//! Classifies a SQL string with a lexical allow-list policy. The gate is
//! the only place a [`ValidatedSql`] can be created, so anything that
//! executes SQL can only be handed statements that passed it.

mod lexical;

pub use lexical::{validate, FORBIDDEN_KEYWORDS};

use serde::Serialize;
use std::fmt;

use crate::error::{AskError, Result};

/// Why the gate refused a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RejectReason {
    /// The statement does not lead with `SELECT`.
    #[serde(rename = "non-select statement")]
    NonSelect,
    /// A statement separator is followed by more content.
    #[serde(rename = "multiple statements")]
    MultipleStatements,
    /// A write/DDL/privilege keyword appears somewhere in the statement.
    #[serde(rename = "forbidden keyword present")]
    ForbiddenKeyword,
}

impl RejectReason {
    /// Returns the reason code reported to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonSelect => "non-select statement",
            Self::MultipleStatements => "multiple statements",
            Self::ForbiddenKeyword => "forbidden keyword present",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running a statement through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub allowed: bool,
    pub reason: Option<RejectReason>,
}

impl ValidationVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn reject(reason: RejectReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// A statement that passed the gate.
///
/// The field is private; the only constructor is [`gate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runs `sql` through the gate, returning a [`ValidatedSql`] on success.
///
/// Trailing semicolons are dropped from the validated text; the statement is
/// otherwise passed through unchanged.
pub fn gate(sql: &str) -> Result<ValidatedSql> {
    let verdict = validate(sql);
    match verdict.reason {
        None if verdict.allowed => Ok(ValidatedSql(
            sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace()).to_string(),
        )),
        Some(reason) => Err(AskError::ValidationRejected(reason)),
        None => Err(AskError::internal("gate produced a rejection without a reason")),
    }
}
