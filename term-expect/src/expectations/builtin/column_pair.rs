use crate::config::RuntimeConfiguration;
use crate::error::Result;
use crate::expectations::helpers::{
    check_required_kwargs, domain_kwargs, effective_result_format, map_payload, mostly,
    mostly_success, table_domain_kwargs,
};
use crate::expectations::{
    Expectation, ExpectationConfiguration, ExpectationKind, ExpectationOutcome, MetricsView,
    ValidationDependencies,
};
use crate::metrics::MetricConfiguration;

const UNEQUAL_COUNT: &str = "column_pair.values.unequal_count";

/// `column_A` equals `column_B` row by row, for at least a `mostly` fraction
/// of rows. Rows where both values are null count as equal.
#[derive(Debug, Default)]
pub struct ExpectColumnPairValuesToBeEqual;

impl Expectation for ExpectColumnPairValuesToBeEqual {
    fn expectation_type(&self) -> &str {
        "expect_column_pair_values_to_be_equal"
    }

    fn kind(&self) -> ExpectationKind {
        ExpectationKind::ColumnPairLevel
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
        let mut dependencies =
            ValidationDependencies::new(effective_result_format(configuration, runtime)?);
        dependencies.set_metric_configuration(
            UNEQUAL_COUNT,
            MetricConfiguration::with_domain(
                UNEQUAL_COUNT,
                domain_kwargs(self.kind(), configuration)?,
            ),
        );
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
        let element_count = metrics.get_count("table.row_count")?;
        let unexpected_count = metrics.get_count(UNEQUAL_COUNT)?;
        let success = mostly_success(element_count, unexpected_count, mostly(configuration)?);
        let format = effective_result_format(configuration, runtime)?;
        Ok(ExpectationOutcome::new(
            success,
            map_payload(&format, element_count, unexpected_count, None),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResolvedMetrics;
    use crate::metrics::MetricValue;
    use serde_json::json;

    fn run(config: &ExpectationConfiguration, rows: i64, unequal: i64) -> ExpectationOutcome {
        let expectation = ExpectColumnPairValuesToBeEqual;
        let runtime = RuntimeConfiguration::default();
        let deps = expectation
            .get_validation_dependencies(config, &runtime)
            .unwrap();
        let mut resolved = ResolvedMetrics::new();
        resolved.insert(
            deps.get_metric_configuration("table.row_count")
                .unwrap()
                .id()
                .clone(),
            MetricValue::Long(rows),
        );
        resolved.insert(
            deps.get_metric_configuration(UNEQUAL_COUNT)
                .unwrap()
                .id()
                .clone(),
            MetricValue::Long(unequal),
        );
        expectation
            .validate(config, &MetricsView::new(&deps, &resolved), &runtime)
            .unwrap()
    }

    #[test]
    fn test_pair_domain() {
        let config = ExpectationConfiguration::new("expect_column_pair_values_to_be_equal")
            .with_kwarg("column_A", "a")
            .with_kwarg("column_B", "b");
        let deps = ExpectColumnPairValuesToBeEqual
            .get_validation_dependencies(&config, &RuntimeConfiguration::default())
            .unwrap();
        let domain = deps
            .get_metric_configuration(UNEQUAL_COUNT)
            .unwrap()
            .metric_domain_kwargs();
        assert_eq!(domain.get_str("column_A"), Some("a"));
        assert_eq!(domain.get_str("column_B"), Some("b"));
    }

    #[test]
    fn test_mostly_tolerates_some_mismatches() {
        let config = ExpectationConfiguration::new("expect_column_pair_values_to_be_equal")
            .with_kwarg("column_A", "a")
            .with_kwarg("column_B", "b");
        let strict = run(&config, 4, 1);
        assert!(!strict.success);
        assert_eq!(strict.result.get("unexpected_percent"), Some(&json!(25.0)));

        let relaxed = run(&config.with_kwarg("mostly", 0.75), 4, 1);
        assert!(relaxed.success);
    }
}
