use crate::error::{Result, TermError};
use crate::metrics::Kwargs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A declared expectation: its type name and arguments.
///
/// # Examples
///
/// ```rust
/// use term_expect::expectations::ExpectationConfiguration;
///
/// let config = ExpectationConfiguration::new("expect_column_mean_to_be_between")
///     .with_kwarg("column", "x")
///     .with_kwarg("min_value", 0)
///     .with_kwarg("max_value", 10);
/// assert_eq!(config.column(), Some("x"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationConfiguration {
    pub expectation_type: String,
    #[serde(default)]
    pub kwargs: Kwargs,
    /// Free-form user metadata, echoed back untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ExpectationConfiguration {
    pub fn new(expectation_type: impl Into<String>) -> Self {
        Self {
            expectation_type: expectation_type.into(),
            kwargs: Kwargs::new(),
            meta: None,
        }
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key, value);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn column(&self) -> Option<&str> {
        self.kwargs.get_str("column")
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.kwargs.get_str("batch_id")
    }

    /// Returns an optional numeric kwarg, rejecting non-numeric values.
    pub fn optional_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.kwargs.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                TermError::invalid_expectation(
                    &self.expectation_type,
                    format!("'{key}' must be a number, got {value}"),
                )
            }),
        }
    }

    /// Returns an optional boolean kwarg, defaulting to `false`.
    pub fn flag(&self, key: &str) -> Result<bool> {
        match self.kwargs.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(value) => Err(TermError::invalid_expectation(
                &self.expectation_type,
                format!("'{key}' must be a boolean, got {value}"),
            )),
        }
    }

    /// Returns a required string kwarg.
    pub fn required_str(&self, key: &str) -> Result<&str> {
        self.kwargs.get_str(key).ok_or_else(|| {
            TermError::invalid_expectation(
                &self.expectation_type,
                format!("missing required argument '{key}'"),
            )
        })
    }
}

impl fmt::Display for ExpectationConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.expectation_type,
            self.kwargs.canonical_json()
        )
    }
}
