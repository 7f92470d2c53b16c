//! Query Guards
//!
//! Read-only enforcement for oracle-supplied SQL. Statements are tokenized so
//! keywords inside string literals and comments are ignored.

use crate::error::{AgentError, Result};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Keywords that may never appear as a bare word in an accepted statement.
const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "TRUNCATE", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM", "REINDEX", "ANALYZE", "BEGIN", "COMMIT", "ROLLBACK",
    "SAVEPOINT", "RELEASE", "GRANT", "REVOKE", "MERGE", "UPSERT",
];

/// Keywords that double as SQLite scalar functions when followed by `(`.
const CALLABLE_KEYWORDS: &[&str] = &["REPLACE"];

const LEADING_KEYWORDS: &[&str] = &["SELECT", "WITH"];

/// Validate that `sql` is a single read-only statement.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let tokens = Tokenizer::new(&SQLiteDialect {}, sql)
        .tokenize()
        .map_err(|e| AgentError::UnsafeQueryRejected(format!("could not tokenize query: {}", e)))?;

    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .collect();

    if significant.is_empty() {
        return Err(AgentError::UnsafeQueryRejected("query is empty".to_string()));
    }

    // One statement, optionally terminated by semicolons.
    if let Some(pos) = significant.iter().position(|t| matches!(t, Token::SemiColon)) {
        if significant[pos..].iter().any(|t| !matches!(t, Token::SemiColon)) {
            return Err(AgentError::UnsafeQueryRejected(
                "multiple statements are not allowed".to_string(),
            ));
        }
    }

    for (idx, token) in significant.iter().enumerate() {
        let Token::Word(word) = token else {
            continue;
        };
        let upper = word.value.to_ascii_uppercase();
        if !MUTATING_KEYWORDS.contains(&upper.as_str()) {
            continue;
        }
        let is_call = matches!(significant.get(idx + 1), Some(Token::LParen));
        if is_call && CALLABLE_KEYWORDS.contains(&upper.as_str()) {
            continue;
        }
        return Err(AgentError::UnsafeQueryRejected(format!(
            "keyword {} is not allowed; only SELECT statements may run",
            upper
        )));
    }

    match significant[0] {
        Token::Word(word) if LEADING_KEYWORDS.contains(&word.value.to_ascii_uppercase().as_str()) => {
            Ok(())
        }
        other => Err(AgentError::UnsafeQueryRejected(format!(
            "statement must start with SELECT or WITH, found '{}'",
            other
        ))),
    }
}
