//! Expectations: declared assertions about data.
//!
//! An [`Expectation`] does two things. It declares the metrics it needs
//! ([`Expectation::get_validation_dependencies`]) and, once those metrics
//! are resolved, turns their values into a pass/fail outcome
//! ([`Expectation::validate`]). It never computes anything against data
//! itself.
//!
//! Expectations are looked up by type name in an [`ExpectationRegistry`].
//!
//! # Examples
//!
//! ```rust
//! use term_expect::expectations::ExpectationRegistry;
//!
//! let registry = ExpectationRegistry::with_builtins();
//! assert!(registry.get("expect_column_mean_to_be_between").is_ok());
//! assert!(registry.get("expect_column_to_exist").is_err());
//! ```

pub mod builtin;
mod configuration;
mod dependencies;
pub mod helpers;
mod result;

pub use configuration::ExpectationConfiguration;
pub use dependencies::ValidationDependencies;
pub use result::{ExpectationOutcome, ExpectationValidationResult, ResultPayload};

use crate::config::RuntimeConfiguration;
use crate::error::{Result, TermError};
use crate::graph::ResolvedMetrics;
use crate::metrics::MetricValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// The family an expectation belongs to.
///
/// The kind decides which kwargs an expectation requires and which domain
/// its metrics are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectationKind {
    /// Whole-table assertions.
    TableLevel,
    /// Aggregate over a single column.
    ColumnLevel,
    /// Row-wise comparison of two columns.
    ColumnPairLevel,
    /// Row-wise condition on a column, tolerating a `mostly` fraction of misses.
    MapLevel,
    /// Assertion over the rows of a user query.
    QueryLevel,
}

impl ExpectationKind {
    pub fn required_kwargs(&self) -> &'static [&'static str] {
        match self {
            ExpectationKind::TableLevel | ExpectationKind::QueryLevel => &[],
            ExpectationKind::ColumnLevel | ExpectationKind::MapLevel => &["column"],
            ExpectationKind::ColumnPairLevel => &["column_A", "column_B"],
        }
    }
}

impl fmt::Display for ExpectationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpectationKind::TableLevel => "table",
            ExpectationKind::ColumnLevel => "column",
            ExpectationKind::ColumnPairLevel => "column_pair",
            ExpectationKind::MapLevel => "column_map",
            ExpectationKind::QueryLevel => "query",
        };
        f.write_str(name)
    }
}

/// Resolved metrics as seen by one expectation.
///
/// Lookups go through the expectation's own logical metric names, so an
/// expectation can only read what it declared.
#[derive(Debug)]
pub struct MetricsView<'a> {
    dependencies: &'a ValidationDependencies,
    resolved: &'a ResolvedMetrics,
}

impl<'a> MetricsView<'a> {
    pub fn new(dependencies: &'a ValidationDependencies, resolved: &'a ResolvedMetrics) -> Self {
        Self {
            dependencies,
            resolved,
        }
    }

    /// Returns the value behind a declared metric name.
    pub fn get(&self, metric_name: &str) -> Result<&'a MetricValue> {
        let configuration = self
            .dependencies
            .get_metric_configuration(metric_name)
            .ok_or_else(|| {
                TermError::configuration(format!(
                    "metric '{metric_name}' was not declared as a validation dependency"
                ))
            })?;
        self.resolved.get(configuration.id()).ok_or_else(|| {
            TermError::Internal(format!(
                "metric '{metric_name}' was declared but never resolved"
            ))
        })
    }

    /// Returns a numeric metric; `Null` reads as `None`.
    pub fn get_f64(&self, metric_name: &str) -> Result<Option<f64>> {
        let value = self.get(metric_name)?;
        if value.is_null() {
            return Ok(None);
        }
        value.as_f64().map(Some).ok_or_else(|| TermError::TypeMismatch {
            expected: "numeric metric value".to_string(),
            found: value.to_string(),
        })
    }

    /// Returns a count metric; `Null` reads as zero.
    pub fn get_count(&self, metric_name: &str) -> Result<u64> {
        Ok(self.get_f64(metric_name)?.unwrap_or(0.0).max(0.0) as u64)
    }

    /// True if every declared metric has a value.
    pub fn is_complete(&self) -> bool {
        self.dependencies
            .get_metric_configurations()
            .iter()
            .all(|configuration| self.resolved.contains_key(configuration.id()))
    }
}

/// A validation capability looked up by expectation type name.
pub trait Expectation: Send + Sync + fmt::Debug {
    fn expectation_type(&self) -> &str;

    fn kind(&self) -> ExpectationKind;

    /// Rejects configurations this expectation cannot evaluate.
    fn validate_configuration(&self, configuration: &ExpectationConfiguration) -> Result<()> {
        helpers::check_required_kwargs(self.kind(), configuration)
    }

    /// Declares the metrics [`Expectation::validate`] will read.
    fn get_validation_dependencies(
        &self,
        configuration: &ExpectationConfiguration,
        runtime: &RuntimeConfiguration,
    ) -> Result<ValidationDependencies>;

    /// Turns resolved metric values into an outcome.
    fn validate(
        &self,
        configuration: &ExpectationConfiguration,
        metrics: &MetricsView<'_>,
        runtime: &RuntimeConfiguration,
    ) -> Result<ExpectationOutcome>;
}

/// Expectation type name to implementation.
#[derive(Debug, Clone, Default)]
pub struct ExpectationRegistry {
    expectations: HashMap<String, Arc<dyn Expectation>>,
}

impl ExpectationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in expectation.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for expectation in builtin::all() {
            registry.register(expectation);
        }
        registry
    }

    /// Registers an expectation, replacing any earlier one with the same type.
    pub fn register(&mut self, expectation: Arc<dyn Expectation>) -> &mut Self {
        let expectation_type = expectation.expectation_type().to_string();
        if self
            .expectations
            .insert(expectation_type.clone(), expectation)
            .is_some()
        {
            warn!(expectation.type = %expectation_type, "Replacing existing expectation");
        }
        self
    }

    pub fn get(&self, expectation_type: &str) -> Result<Arc<dyn Expectation>> {
        self.expectations
            .get(expectation_type)
            .cloned()
            .ok_or_else(|| TermError::UnknownExpectation(expectation_type.to_string()))
    }

    /// Registered type names, sorted.
    pub fn expectation_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.expectations.keys().cloned().collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Kwargs, MetricConfiguration};

    #[test]
    fn test_builtins_registered() {
        let registry = ExpectationRegistry::with_builtins();
        let types = registry.expectation_types();
        assert!(types.contains(&"expect_column_mean_to_be_between".to_string()));
        assert!(types.contains(&"expect_queried_column_values_to_be_unique".to_string()));
        assert_eq!(types.len(), 8);
    }

    #[test]
    fn test_unknown_expectation() {
        let err = ExpectationRegistry::new()
            .get("expect_the_unexpected")
            .unwrap_err();
        assert!(matches!(err, TermError::UnknownExpectation(_)));
    }

    #[test]
    fn test_metrics_view_is_scoped() {
        let mean = MetricConfiguration::with_domain("column.mean", Kwargs::new().with("column", "x"));
        let other = MetricConfiguration::with_domain("column.sum", Kwargs::new().with("column", "x"));
        let mut deps = ValidationDependencies::default();
        deps.set_metric_configuration("column.mean", mean.clone());

        let mut resolved = ResolvedMetrics::new();
        resolved.insert(mean.id().clone(), MetricValue::Double(2.0));
        resolved.insert(other.id().clone(), MetricValue::Double(6.0));

        let view = MetricsView::new(&deps, &resolved);
        assert_eq!(view.get_f64("column.mean").unwrap(), Some(2.0));
        assert!(view.get("column.sum").is_err());
        assert!(view.is_complete());
    }

    #[test]
    fn test_metrics_view_type_mismatch() {
        let types = MetricConfiguration::with_domain("table.column_types", Kwargs::new());
        let mut deps = ValidationDependencies::default();
        deps.set_metric_configuration("table.column_types", types.clone());
        let mut resolved = ResolvedMetrics::new();
        resolved.insert(types.id().clone(), MetricValue::String("Int64".into()));

        let view = MetricsView::new(&deps, &resolved);
        assert!(matches!(
            view.get_f64("table.column_types"),
            Err(TermError::TypeMismatch { .. })
        ));
    }
}
