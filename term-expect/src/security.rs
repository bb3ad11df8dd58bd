//! SQL hardening for generated and user-supplied SQL fragments.
//!
//! Every identifier the DataFusion backend splices into a query is quoted.
//! Table names go through the strict [`SqlSecurity::escape_identifier`];
//! column names, which are checked against the table schema first, go through
//! [`SqlSecurity::quote_identifier`] so that names such as `unit price`
//! survive. Row conditions and the queries of
//! query-level expectations are user-written SQL and are screened by
//! [`SqlSecurity::validate_sql_expression`] and [`SqlSecurity::validate_query`].

use crate::error::{Result, TermError};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_IDENTIFIER_LENGTH: usize = 128;
const MAX_EXPRESSION_LENGTH: usize = 5000;
const MAX_QUERY_LENGTH: usize = 20_000;

#[allow(clippy::expect_used)]
static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$")
        .expect("Hard-coded regex pattern should be valid")
});

// Statements that mutate state or reach outside the registered tables.
#[allow(clippy::expect_used)]
static DANGEROUS_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(drop|create|alter|truncate|insert|update|delete|merge|exec|execute|declare|grant|revoke|copy|attach|detach|pragma|load_file|into\s+outfile|into\s+dumpfile)\b",
    )
    .expect("Hard-coded regex pattern should be valid")
});

#[allow(clippy::expect_used)]
static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)union\s+(all\s+)?select", // union-based injection
        r"(?i)'\s*or\s+'",              // OR-based injection
        r"(?i)'\s*and\s+'",             // AND-based injection
        r"(?i)\(\s*select\s",           // subqueries
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Hard-coded regex pattern should be valid"))
    .collect()
});

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and escapes a SQL identifier (table name, column name, etc.).
    ///
    /// # Examples
    /// ```rust
    /// use term_expect::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("customer_id").unwrap(), "\"customer_id\"");
    /// assert!(SqlSecurity::escape_identifier("id; DROP TABLE users--").is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(double_quote(identifier))
    }

    /// Quotes an identifier of any spelling, doubling embedded `"`.
    ///
    /// Only the structural checks apply (non-empty, bounded length, no null
    /// bytes), so callers must make sure the name refers to a real column.
    ///
    /// # Examples
    /// ```rust
    /// use term_expect::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::quote_identifier("unit price").unwrap(), "\"unit price\"");
    /// assert_eq!(SqlSecurity::quote_identifier("a\"b").unwrap(), "\"a\"\"b\"");
    /// ```
    pub fn quote_identifier(identifier: &str) -> Result<String> {
        Self::check_identifier_shape(identifier)?;
        Ok(double_quote(identifier))
    }

    /// Validates a SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        Self::check_identifier_shape(identifier)?;

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(TermError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers, underscores, and dots"
            )));
        }

        Ok(())
    }

    fn check_identifier_shape(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(TermError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(TermError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }

        if identifier.contains('\0') {
            return Err(TermError::SecurityError(
                "SQL identifier cannot contain null bytes".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates a boolean SQL expression such as a `row_condition`.
    pub fn validate_sql_expression(expression: &str) -> Result<()> {
        Self::check_common(expression, MAX_EXPRESSION_LENGTH, "SQL expression")?;

        if expression.contains(';') {
            return Err(TermError::SecurityError(
                "SQL expression cannot contain statement separators".to_string(),
            ));
        }

        for pattern in INJECTION_PATTERNS.iter() {
            if pattern.is_match(expression) {
                return Err(TermError::SecurityError(format!(
                    "SQL expression contains suspicious pattern matching: {}",
                    pattern.as_str()
                )));
            }
        }

        Ok(())
    }

    /// Validates a full read-only query.
    ///
    /// Accepts exactly one `SELECT` or `WITH` statement, optionally followed by
    /// a single trailing semicolon. Subqueries are allowed.
    pub fn validate_query(query: &str) -> Result<()> {
        Self::check_common(query, MAX_QUERY_LENGTH, "SQL query")?;

        let statement = query.trim().trim_end_matches(';').trim_end();
        if statement.contains(';') {
            return Err(TermError::SecurityError(
                "SQL query must be a single statement".to_string(),
            ));
        }

        let leading = statement
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if leading != "select" && leading != "with" {
            return Err(TermError::SecurityError(format!(
                "SQL query must start with SELECT or WITH, found '{leading}'"
            )));
        }

        Ok(())
    }

    /// Checks shared by expressions and queries.
    fn check_common(sql: &str, max_length: usize, what: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Err(TermError::SecurityError(format!("{what} cannot be empty")));
        }

        if sql.len() > max_length {
            return Err(TermError::SecurityError(format!(
                "{what} too long (max {max_length} characters)"
            )));
        }

        if sql.contains('\0') {
            return Err(TermError::SecurityError(format!(
                "{what} cannot contain null bytes"
            )));
        }

        if sql.contains("--") || sql.contains("/*") {
            return Err(TermError::SecurityError(format!(
                "{what} cannot contain comments"
            )));
        }

        if let Some(found) = DANGEROUS_KEYWORDS.find(sql) {
            return Err(TermError::SecurityError(format!(
                "{what} contains dangerous keyword: '{}'",
                found.as_str().to_lowercase()
            )));
        }

        Ok(())
    }
}

fn double_quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Input validation utilities for expectation parameters.
pub struct InputValidator;

impl InputValidator {
    /// Validates a numeric threshold value.
    pub fn validate_threshold(value: f64, name: &str) -> Result<()> {
        if !value.is_finite() {
            return Err(TermError::SecurityError(format!(
                "Invalid {name} value: must be finite (not NaN or infinite)"
            )));
        }
        Ok(())
    }

    /// Validates a fraction value (0.0 to 1.0).
    pub fn validate_fraction(value: f64, name: &str) -> Result<()> {
        Self::validate_threshold(value, name)?;

        if !(0.0..=1.0).contains(&value) {
            return Err(TermError::SecurityError(format!(
                "Invalid {name} value: must be between 0.0 and 1.0, got {value}"
            )));
        }
        Ok(())
    }
}
