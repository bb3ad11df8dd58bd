use crate::config::{ResultFormat, RuntimeConfiguration};
use crate::error::Result;
use crate::expectations::helpers::{
    check_required_kwargs, domain_kwargs, effective_result_format, map_payload, mostly,
    mostly_success, table_domain_kwargs,
};
use crate::expectations::{
    Expectation, ExpectationConfiguration, ExpectationKind, ExpectationOutcome, MetricsView,
    ValidationDependencies,
};
use crate::metrics::{Kwargs, MetricConfiguration};

/// Row-wise nullness of a column.
///
/// `condition` names the metric family, e.g. `column_values.nonnull`. The
/// family provides `<condition>.unexpected_count` and
/// `<condition>.unexpected_values`.
#[derive(Debug)]
pub struct ColumnValuesNullness {
    expectation_type: &'static str,
    condition: &'static str,
}

impl ColumnValuesNullness {
    pub const fn null() -> Self {
        Self {
            expectation_type: "expect_column_values_to_be_null",
            condition: "column_values.null",
        }
    }

    pub const fn not_null() -> Self {
        Self {
            expectation_type: "expect_column_values_to_not_be_null",
            condition: "column_values.nonnull",
        }
    }

    fn unexpected_count(&self) -> String {
        format!("{}.unexpected_count", self.condition)
    }

    fn unexpected_values(&self) -> String {
        format!("{}.unexpected_values", self.condition)
    }
}

fn values_kwargs(format: &ResultFormat) -> Kwargs {
    match format.unexpected_fetch_limit() {
        Some(limit) => Kwargs::new().with("limit", limit),
        None => Kwargs::new(),
    }
}

impl Expectation for ColumnValuesNullness {
    fn expectation_type(&self) -> &str {
        self.expectation_type
    }

    fn kind(&self) -> ExpectationKind {
        ExpectationKind::MapLevel
    }

    fn validate_configuration(&self, configuration: &ExpectationConfiguration) -> Result<()> {
        check_required_kwargs(self.kind(), configuration)?;
        mostly(configuration)?;
        Ok(())
    }

    fn get_validation_dependencies(
        &self,
        configuration: &ExpectationConfiguration,
        runtime: &RuntimeConfiguration,
    ) -> Result<ValidationDependencies> {
        let format = effective_result_format(configuration, runtime)?;
        let domain = domain_kwargs(self.kind(), configuration)?;
        let mut dependencies = ValidationDependencies::new(format);

        let unexpected_count = self.unexpected_count();
        dependencies.set_metric_configuration(
            unexpected_count.clone(),
            MetricConfiguration::with_domain(unexpected_count, domain.clone()),
        );
        dependencies.set_metric_configuration(
            "table.row_count",
            MetricConfiguration::with_domain("table.row_count", table_domain_kwargs(configuration)?),
        );
        if !format.is_boolean_only() {
            let unexpected_values = self.unexpected_values();
            dependencies.set_metric_configuration(
                unexpected_values.clone(),
                MetricConfiguration::new(unexpected_values, domain, values_kwargs(&format)),
            );
        }
        Ok(dependencies)
    }

    fn validate(
        &self,
        configuration: &ExpectationConfiguration,
        metrics: &MetricsView<'_>,
        runtime: &RuntimeConfiguration,
    ) -> Result<ExpectationOutcome> {
        let format = effective_result_format(configuration, runtime)?;
        let element_count = metrics.get_count("table.row_count")?;
        let unexpected_count = metrics.get_count(&self.unexpected_count())?;
        let success = mostly_success(element_count, unexpected_count, mostly(configuration)?);

        let values = if format.is_boolean_only() {
            None
        } else {
            metrics.get(&self.unexpected_values())?.as_list()
        };
        Ok(ExpectationOutcome::new(
            success,
            map_payload(&format, element_count, unexpected_count, values),
        ))
    }
}
