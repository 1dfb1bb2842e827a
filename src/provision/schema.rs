//! Idempotent schema definitions.

use super::ProvisionError;
use regex::Regex;

/// Longest statement prefix kept in error messages.
const STATEMENT_PREVIEW: usize = 60;

/// An ordered list of schema statements, each safe to run again.
///
/// Every `CREATE` must be `CREATE TABLE|DATABASE|SCHEMA IF NOT EXISTS`, so a
/// retry after a partially applied schema never fails on objects the
/// earlier attempt already created.
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::Schema;
///
/// assert!(Schema::new(["CREATE TABLE IF NOT EXISTS t (id INT)"]).is_ok());
/// assert!(Schema::new(["CREATE TABLE t (id INT)"]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    statements: Vec<String>,
}

impl Schema {
    /// Validate and wrap `statements`.
    pub fn new<I, S>(statements: I) -> Result<Self, ProvisionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let create = Regex::new(r"(?i)^\s*CREATE\b").expect("Invalid regex pattern");
        let guarded = Regex::new(r"(?i)^\s*CREATE\s+(?:TABLE|DATABASE|SCHEMA)\s+IF\s+NOT\s+EXISTS\b")
            .expect("Invalid regex pattern");

        let statements: Vec<String> = statements.into_iter().map(Into::into).collect();
        if let Some(bad) = statements
            .iter()
            .find(|s| create.is_match(s) && !guarded.is_match(s))
        {
            return Err(ProvisionError::NonIdempotentSchema {
                statement: preview(bad),
            });
        }
        Ok(Self { statements })
    }

    /// The application schema: its database and the `notes` table.
    pub fn for_database(database: &str) -> Self {
        Self {
            statements: vec![
                format!("CREATE DATABASE IF NOT EXISTS `{}`", database),
                format!(
                    "CREATE TABLE IF NOT EXISTS `{}`.notes (\
                     id BIGINT AUTO_INCREMENT PRIMARY KEY, \
                     title VARCHAR(255) NOT NULL, \
                     content TEXT, \
                     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP, \
                     updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP)",
                    database
                ),
            ],
        }
    }

    /// Statements in execution order.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

/// Statement abbreviated for messages.
pub(crate) fn preview(statement: &str) -> String {
    let flat = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(STATEMENT_PREVIEW) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
