use crate::config::RuntimeConfiguration;
use crate::error::{Result, TermError};
use crate::expectations::helpers::{
    check_between_bounds, check_required_kwargs, effective_result_format,
    observed_value_payload, table_domain_kwargs, validate_metric_value_between,
};
use crate::expectations::{
    Expectation, ExpectationConfiguration, ExpectationKind, ExpectationOutcome, MetricsView,
    ResultPayload, ValidationDependencies,
};
use crate::metrics::{MetricConfiguration, MetricValue};

/// Row count within `[min_value, max_value]`.
#[derive(Debug, Default)]
pub struct ExpectTableRowCountToBeBetween;

impl Expectation for ExpectTableRowCountToBeBetween {
    fn expectation_type(&self) -> &str {
        "expect_table_row_count_to_be_between"
    }

    fn kind(&self) -> ExpectationKind {
        ExpectationKind::TableLevel
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
            "table.row_count",
            MetricConfiguration::with_domain("table.row_count", table_domain_kwargs(configuration)?),
        );
        Ok(dependencies)
    }

    fn validate(
        &self,
        configuration: &ExpectationConfiguration,
        metrics: &MetricsView<'_>,
        runtime: &RuntimeConfiguration,
    ) -> Result<ExpectationOutcome> {
        let row_count = metrics.get("table.row_count")?;
        let success = validate_metric_value_between(row_count.as_f64(), configuration)?;
        let format = effective_result_format(configuration, runtime)?;
        Ok(ExpectationOutcome::new(
            success,
            observed_value_payload(&format, row_count),
        ))
    }
}

/// The declared type of `column` equals `type_`.
///
/// Types are compared by name, ignoring case (`"int64"` matches `Int64`).
#[derive(Debug, Default)]
pub struct ExpectColumnValuesToBeOfType;

impl Expectation for ExpectColumnValuesToBeOfType {
    fn expectation_type(&self) -> &str {
        "expect_column_values_to_be_of_type"
    }

    fn kind(&self) -> ExpectationKind {
        ExpectationKind::TableLevel
    }

    fn validate_configuration(&self, configuration: &ExpectationConfiguration) -> Result<()> {
        check_required_kwargs(self.kind(), configuration)?;
        configuration.required_str("column")?;
        configuration.required_str("type_")?;
        Ok(())
    }

    fn get_validation_dependencies(
        &self,
        configuration: &ExpectationConfiguration,
        runtime: &RuntimeConfiguration,
    ) -> Result<ValidationDependencies> {
        let mut dependencies =
            ValidationDependencies::new(effective_result_format(configuration, runtime)?);
        dependencies.set_metric_configuration(
            "table.column_types",
            MetricConfiguration::with_domain(
                "table.column_types",
                table_domain_kwargs(configuration)?,
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
        let column = configuration.required_str("column")?;
        let expected = configuration.required_str("type_")?;

        let types = metrics.get("table.column_types")?;
        let types = types.as_map().ok_or_else(|| TermError::TypeMismatch {
            expected: "map of column types".to_string(),
            found: types.to_string(),
        })?;
        let actual = types
            .get(column)
            .and_then(MetricValue::as_str)
            .ok_or_else(|| TermError::ColumnNotFound {
                column: column.to_string(),
            })?;

        let success = actual.eq_ignore_ascii_case(expected);
        let format = effective_result_format(configuration, runtime)?;
        let result = if format.is_boolean_only() {
            ResultPayload::new()
        } else {
            ResultPayload::new().with("observed_value", actual)
        };
        Ok(ExpectationOutcome::new(success, result))
    }
}
