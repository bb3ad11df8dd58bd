use crate::config::RuntimeConfiguration;
use crate::error::{Result, TermError};
use crate::expectations::helpers::{check_required_kwargs, domain_kwargs, effective_result_format};
use crate::expectations::{
    Expectation, ExpectationConfiguration, ExpectationKind, ExpectationOutcome, MetricsView,
    ResultPayload, ValidationDependencies,
};
use crate::metrics::{Kwargs, MetricConfiguration};
use crate::security::SqlSecurity;
use serde_json::Value;
use std::collections::BTreeMap;

const QUERY_COLUMN: &str = "query.column";

/// Query used when the configuration supplies none.
pub const DEFAULT_QUERY: &str = "SELECT {column} FROM {active_batch}";

/// Values of `column`, as returned by `query`, are unique.
///
/// `{column}` in the query is replaced by the quoted column name here;
/// `{active_batch}` is replaced by the backend with the batch's table.
/// Nulls are ignored.
#[derive(Debug, Default)]
pub struct ExpectQueriedColumnValuesToBeUnique;

impl ExpectQueriedColumnValuesToBeUnique {
    fn query(configuration: &ExpectationConfiguration) -> Result<String> {
        let column = configuration.required_str("column")?;
        let template = match configuration.kwargs.get("query") {
            None | Some(Value::Null) => DEFAULT_QUERY,
            Some(Value::String(query)) => query.as_str(),
            Some(_) => {
                return Err(TermError::invalid_expectation(
                    &configuration.expectation_type,
                    "'query' must be a string",
                ))
            }
        };
        Ok(template.replace("{column}", &SqlSecurity::quote_identifier(column)?))
    }
}

impl Expectation for ExpectQueriedColumnValuesToBeUnique {
    fn expectation_type(&self) -> &str {
        "expect_queried_column_values_to_be_unique"
    }

    fn kind(&self) -> ExpectationKind {
        ExpectationKind::QueryLevel
    }

    fn validate_configuration(&self, configuration: &ExpectationConfiguration) -> Result<()> {
        check_required_kwargs(self.kind(), configuration)?;
        let query = Self::query(configuration)?;
        SqlSecurity::validate_query(&query.replace("{active_batch}", "active_batch"))
    }

    fn get_validation_dependencies(
        &self,
        configuration: &ExpectationConfiguration,
        runtime: &RuntimeConfiguration,
    ) -> Result<ValidationDependencies> {
        let mut dependencies =
            ValidationDependencies::new(effective_result_format(configuration, runtime)?);
        let value_kwargs = Kwargs::new()
            .with("query", Self::query(configuration)?)
            .with("column", configuration.required_str("column")?);
        dependencies.set_metric_configuration(
            QUERY_COLUMN,
            MetricConfiguration::new(
                QUERY_COLUMN,
                domain_kwargs(self.kind(), configuration)?,
                value_kwargs,
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
        let rows = metrics.get(QUERY_COLUMN)?;
        let rows = rows.as_list().ok_or_else(|| TermError::TypeMismatch {
            expected: "list of query values".to_string(),
            found: rows.to_string(),
        })?;

        let mut counts: BTreeMap<String, (Value, u64)> = BTreeMap::new();
        for value in rows.iter().filter(|value| !value.is_null()) {
            let json = value.to_json();
            counts
                .entry(json.to_string())
                .or_insert_with(|| (json, 0))
                .1 += 1;
        }
        let duplicates: Vec<Value> = counts
            .into_values()
            .filter(|(_, count)| *count > 1)
            .map(|(value, _)| value)
            .collect();

        let success = duplicates.is_empty();
        let format = effective_result_format(configuration, runtime)?;
        let result = if format.is_boolean_only() {
            ResultPayload::new()
        } else {
            ResultPayload::new()
                .with("observed_value", duplicates.len())
                .with("element_count", rows.len())
                .with("details", serde_json::json!({ "duplicates": duplicates }))
        };
        Ok(ExpectationOutcome::new(success, result))
    }
}
