//! Error types for the term-expect validation engine.
//!
//! All fallible operations return [`TermError`]. Errors fall in three groups
//! that the engine treats differently:
//!
//! - configuration errors (unknown metrics, missing kwargs) surface while the
//!   dependency graph is being built;
//! - metric resolution errors are attributed to the metric (or bundle) that
//!   raised them and only fail the expectations depending on it;
//! - fatal errors ([`TermError::is_fatal`]) cannot be attributed to a metric
//!   and abort the whole resolution pass.
//!
//! [`ExceptionInfo`] is the serializable failure record carried by aborted
//! metrics and failed expectation results.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for term-expect.
#[derive(Error, Debug)]
pub enum TermError {
    /// A metric or expectation was configured incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An expectation configuration failed its own validation.
    #[error("Invalid expectation configuration for '{expectation_type}': {message}")]
    InvalidExpectation {
        /// Type name of the expectation
        expectation_type: String,
        /// Detailed error message
        message: String,
    },

    /// No expectation is registered under the requested type name.
    #[error("Unknown expectation type '{0}'")]
    UnknownExpectation(String),

    /// A backend failed while computing one metric or one bundle of metrics.
    #[error("Metric resolution failed for '{metric}': {message}")]
    MetricResolution {
        /// Name of the metric that failed
        metric: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A required column is not present in the dataset.
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },

    /// Data types don't match what a metric expects.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend cannot serve any request (lost session, closed connection).
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Metric dependency declarations form a cycle or expand without bound.
    #[error("Metric dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Security-related error.
    #[error("Security error: {0}")]
    SecurityError(String),
}

/// A type alias for `Result<T, TermError>`.
pub type Result<T> = std::result::Result<T, TermError>;

impl TermError {
    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a new invalid expectation error.
    pub fn invalid_expectation(
        expectation_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidExpectation {
            expectation_type: expectation_type.into(),
            message: message.into(),
        }
    }

    /// Creates a new metric resolution error.
    pub fn metric_resolution(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetricResolution {
            metric: metric.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new metric resolution error with a source error.
    pub fn metric_resolution_with_source(
        metric: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::MetricResolution {
            metric: metric.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns true if the error cannot be attributed to a single metric.
    ///
    /// Fatal errors abort a resolution pass; every other error raised by a
    /// backend is recorded against the metrics of the failing request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TermError::BackendUnavailable(_)
                | TermError::DependencyCycle(_)
                | TermError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for TermError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Why a metric ended up unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The metric's own computation raised an error.
    Computation,
    /// An upstream metric could not be resolved.
    DependencyUnresolved,
    /// The whole run failed outside the scope of any metric.
    General,
    /// The expectation's own validation logic raised.
    Validation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Computation => "computation",
            FailureKind::DependencyUnresolved => "dependency_unresolved",
            FailureKind::General => "general",
            FailureKind::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// A de-duplicable failure record.
///
/// Two records are equal when message, trace and kind are equal, so the same
/// root cause reached through several graph edges collapses to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Human-readable error message
    pub exception_message: String,
    /// Formatted error source chain, outermost first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_traceback: Option<String>,
    /// Classification of the failure
    pub failure_kind: FailureKind,
}

impl ExceptionInfo {
    /// Creates a record from a message.
    pub fn new(message: impl Into<String>, failure_kind: FailureKind) -> Self {
        Self {
            exception_message: message.into(),
            exception_traceback: None,
            failure_kind,
        }
    }

    /// Creates a record from an error, capturing its source chain.
    pub fn from_error(error: &TermError, failure_kind: FailureKind) -> Self {
        Self {
            exception_message: error.to_string(),
            exception_traceback: Some(format_error_chain(error)),
            failure_kind,
        }
    }

    /// Returns true if the record describes an upstream failure.
    pub fn is_dependency_failure(&self) -> bool {
        self.failure_kind == FailureKind::DependencyUnresolved
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.failure_kind, self.exception_message)
    }
}

/// Renders an error and all of its sources, one per line.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::error::Error;

    #[test]
    fn test_metric_resolution_error() {
        let err = TermError::metric_resolution("column.mean", "query failed");
        assert_eq!(
            err.to_string(),
            "Metric resolution failed for 'column.mean': query failed"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = TermError::metric_resolution_with_source(
            "table.row_count",
            "could not scan",
            Box::new(source),
        );

        assert!(err.source().is_some());
        let chain = format_error_chain(&err);
        assert!(chain.contains("could not scan"));
        assert!(chain.contains("caused by: file missing"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TermError::BackendUnavailable("connection reset".into()).is_fatal());
        assert!(TermError::DependencyCycle("a -> a".into()).is_fatal());
        assert!(!TermError::ColumnNotFound {
            column: "x".to_string()
        }
        .is_fatal());
        assert!(!TermError::configuration("bad").is_fatal());
    }

    #[test]
    fn test_column_not_found() {
        let err = TermError::ColumnNotFound {
            column: "user_id".to_string(),
        };
        assert_eq!(err.to_string(), "Column 'user_id' not found in dataset");
    }

    #[test]
    fn test_exception_info_deduplicates() {
        let err = TermError::ColumnNotFound {
            column: "x".to_string(),
        };
        let mut set = HashSet::new();
        set.insert(ExceptionInfo::from_error(&err, FailureKind::Computation));
        set.insert(ExceptionInfo::from_error(&err, FailureKind::Computation));
        set.insert(ExceptionInfo::from_error(
            &err,
            FailureKind::DependencyUnresolved,
        ));
        assert_eq!(set.len(), 2);
    }
}
