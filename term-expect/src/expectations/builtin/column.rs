use crate::config::RuntimeConfiguration;
use crate::error::Result;
use crate::expectations::helpers::{
    check_between_bounds, check_required_kwargs, domain_kwargs, effective_result_format,
    observed_value_payload, validate_metric_value_between,
};
use crate::expectations::{
    Expectation, ExpectationConfiguration, ExpectationKind, ExpectationOutcome, MetricsView,
    ValidationDependencies,
};
use crate::metrics::MetricConfiguration;

/// A single column aggregate within `[min_value, max_value]`.
///
/// Backs every `expect_column_<aggregate>_to_be_between` expectation; they
/// differ only in the metric they read.
#[derive(Debug)]
pub struct ColumnAggregateBetween {
    expectation_type: &'static str,
    metric_name: &'static str,
}

impl ColumnAggregateBetween {
    pub const fn new(expectation_type: &'static str, metric_name: &'static str) -> Self {
        Self {
            expectation_type,
            metric_name,
        }
    }

    pub const fn mean() -> Self {
        Self::new("expect_column_mean_to_be_between", "column.mean")
    }

    pub const fn stdev() -> Self {
        Self::new(
            "expect_column_stdev_to_be_between",
            "column.standard_deviation",
        )
    }
}

impl Expectation for ColumnAggregateBetween {
    fn expectation_type(&self) -> &str {
        self.expectation_type
    }

    fn kind(&self) -> ExpectationKind {
        ExpectationKind::ColumnLevel
    }

    fn validate_configuration(&self, configuration: &ExpectationConfiguration) -> Result<()> {
        check_required_kwargs(self.kind(), configuration)?;
        check_between_bounds(configuration)
    }

    fn get_validation_dependencies(
        &self,
        configuration: &ExpectationConfiguration,
        runtime: &RuntimeConfiguration,
    ) -> Result<ValidationDependencies> {
        let mut dependencies =
            ValidationDependencies::new(effective_result_format(configuration, runtime)?);
        dependencies.set_metric_configuration(
            self.metric_name,
            MetricConfiguration::with_domain(
                self.metric_name,
                domain_kwargs(self.kind(), configuration)?,
            ),
        );
        Ok(dependencies)
    }

    fn validate(
        &self,
        configuration: &ExpectationConfiguration,
        metrics: &MetricsView<'_>,
        runtime: &RuntimeConfiguration,
    ) -> Result<ExpectationOutcome> {
        let observed = metrics.get(self.metric_name)?;
        let success = validate_metric_value_between(metrics.get_f64(self.metric_name)?, configuration)?;
        let format = effective_result_format(configuration, runtime)?;
        Ok(ExpectationOutcome::new(
            success,
            observed_value_payload(&format, observed),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResultFormat, ResultFormatKind};
    use crate::graph::ResolvedMetrics;
    use crate::metrics::{Kwargs, MetricValue};
    use serde_json::json;

    fn config() -> ExpectationConfiguration {
        ExpectationConfiguration::new("expect_column_mean_to_be_between")
            .with_kwarg("column", "x")
            .with_kwarg("min_value", 0)
            .with_kwarg("max_value", 10)
    }

    fn outcome(value: MetricValue, runtime: &RuntimeConfiguration) -> ExpectationOutcome {
        let expectation = ColumnAggregateBetween::mean();
        let configuration = config();
        let dependencies = expectation
            .get_validation_dependencies(&configuration, runtime)
            .unwrap();
        let mean = dependencies.get_metric_configuration("column.mean").unwrap();
        let mut resolved = ResolvedMetrics::new();
        resolved.insert(mean.id().clone(), value);
        expectation
            .validate(
                &configuration,
                &MetricsView::new(&dependencies, &resolved),
                runtime,
            )
            .unwrap()
    }

    #[test]
    fn test_declares_column_mean() {
        let deps = ColumnAggregateBetween::mean()
            .get_validation_dependencies(&config(), &RuntimeConfiguration::default())
            .unwrap();
        assert_eq!(deps.get_metric_names(), vec!["column.mean"]);
        assert_eq!(
            deps.get_metric_configuration("column.mean")
                .unwrap()
                .metric_domain_kwargs(),
            &Kwargs::new().with("column", "x")
        );
    }

    #[test]
    fn test_mean_within_bounds() {
        let result = outcome(MetricValue::Double(2.0), &RuntimeConfiguration::default());
        assert!(result.success);
        assert_eq!(result.result.observed_value(), Some(&json!(2.0)));
    }

    #[test]
    fn test_null_mean_fails() {
        let result = outcome(MetricValue::Null, &RuntimeConfiguration::default());
        assert!(!result.success);
        assert_eq!(result.result.observed_value(), Some(&json!(null)));
    }

    #[test]
    fn test_boolean_only_has_no_payload() {
        let runtime = RuntimeConfiguration::default()
            .with_result_format(ResultFormat::new(ResultFormatKind::BooleanOnly));
        let result = outcome(MetricValue::Double(20.0), &runtime);
        assert!(!result.success);
        assert!(result.result.is_empty());
    }

    #[test]
    fn test_missing_column_rejected() {
        let expectation = ColumnAggregateBetween::stdev();
        let config = ExpectationConfiguration::new(expectation.expectation_type())
            .with_kwarg("max_value", 1);
        assert!(expectation.validate_configuration(&config).is_err());
    }
}
