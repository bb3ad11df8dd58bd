//! Behaviour shared by the expectation kinds.

use super::{ExpectationConfiguration, ExpectationKind, ResultPayload};
use crate::config::{ResultFormat, ResultFormatKind, RuntimeConfiguration};
use crate::error::{Result, TermError};
use crate::metrics::{Kwargs, MetricValue};
use crate::security::InputValidator;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Domain kwargs every kind passes through to its metrics.
const SHARED_DOMAIN_KEYS: &[&str] = &["batch_id", "row_condition"];

/// Checks the kwargs the expectation kind requires.
pub fn check_required_kwargs(
    kind: ExpectationKind,
    configuration: &ExpectationConfiguration,
) -> Result<()> {
    for key in kind.required_kwargs() {
        configuration.required_str(key)?;
    }
    if let Some(value) = configuration.kwargs.get("row_condition") {
        if !value.is_string() && !value.is_null() {
            return Err(TermError::invalid_expectation(
                &configuration.expectation_type,
                "'row_condition' must be a string",
            ));
        }
    }
    Ok(())
}

/// Builds the metric domain kwargs for an expectation of `kind`.
pub fn domain_kwargs(
    kind: ExpectationKind,
    configuration: &ExpectationConfiguration,
) -> Result<Kwargs> {
    let mut keys: Vec<&str> = SHARED_DOMAIN_KEYS.to_vec();
    match kind {
        ExpectationKind::TableLevel => {}
        // a query defines its own rows; only the batch applies
        ExpectationKind::QueryLevel => keys.retain(|key| *key == "batch_id"),
        _ => keys.extend_from_slice(kind.required_kwargs()),
    }
    for key in kind.required_kwargs() {
        configuration.required_str(key)?;
    }
    Ok(configuration
        .kwargs
        .only(&keys)
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect())
}

/// Table-level domain kwargs: the batch and row filter, never a column.
pub fn table_domain_kwargs(configuration: &ExpectationConfiguration) -> Result<Kwargs> {
    domain_kwargs(ExpectationKind::TableLevel, configuration)
}

/// The result format of one expectation.
///
/// A `result_format` kwarg (string or object form) overrides the run's format.
pub fn effective_result_format(
    configuration: &ExpectationConfiguration,
    runtime: &RuntimeConfiguration,
) -> Result<ResultFormat> {
    match configuration.kwargs.get("result_format") {
        None | Some(Value::Null) => Ok(runtime.result_format),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            TermError::invalid_expectation(
                &configuration.expectation_type,
                format!("invalid 'result_format': {e}"),
            )
        }),
    }
}

/// Checks `min_value`/`max_value` style bounds.
pub fn check_between_bounds(configuration: &ExpectationConfiguration) -> Result<()> {
    let min = configuration.optional_f64("min_value")?;
    let max = configuration.optional_f64("max_value")?;
    if min.is_none() && max.is_none() {
        return Err(TermError::invalid_expectation(
            &configuration.expectation_type,
            "at least one of 'min_value' or 'max_value' must be set",
        ));
    }
    for (name, bound) in [("min_value", min), ("max_value", max)] {
        if let Some(bound) = bound {
            InputValidator::validate_threshold(bound, name)?;
        }
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(TermError::invalid_expectation(
                &configuration.expectation_type,
                format!("'min_value' ({min}) is greater than 'max_value' ({max})"),
            ));
        }
    }
    configuration.flag("strict_min")?;
    configuration.flag("strict_max")?;
    Ok(())
}

/// Whether `observed` lies within the configured bounds.
///
/// A missing observation never succeeds. Strict bounds exclude equality.
pub fn validate_metric_value_between(
    observed: Option<f64>,
    configuration: &ExpectationConfiguration,
) -> Result<bool> {
    let Some(observed) = observed else {
        return Ok(false);
    };
    let min = configuration.optional_f64("min_value")?;
    let max = configuration.optional_f64("max_value")?;

    let above_min = match min {
        None => true,
        Some(min) if configuration.flag("strict_min")? => observed > min,
        Some(min) => observed >= min,
    };
    let below_max = match max {
        None => true,
        Some(max) if configuration.flag("strict_max")? => observed < max,
        Some(max) => observed <= max,
    };
    Ok(above_min && below_max)
}

/// The `mostly` fraction, defaulting to 1.0.
pub fn mostly(configuration: &ExpectationConfiguration) -> Result<f64> {
    let mostly = configuration.optional_f64("mostly")?.unwrap_or(1.0);
    InputValidator::validate_fraction(mostly, "mostly")?;
    Ok(mostly)
}

/// Whether enough rows met the condition.
///
/// Vacuously true when there are no rows to consider.
pub fn mostly_success(element_count: u64, unexpected_count: u64, mostly: f64) -> bool {
    if element_count == 0 {
        return true;
    }
    let expected = element_count.saturating_sub(unexpected_count) as f64;
    expected / element_count as f64 >= mostly
}

/// Payload for aggregate expectations: just the observed value.
pub fn observed_value_payload(format: &ResultFormat, observed: &MetricValue) -> ResultPayload {
    if format.is_boolean_only() {
        return ResultPayload::new();
    }
    ResultPayload::new().with("observed_value", observed.to_json())
}

/// Payload for row-wise expectations.
///
/// `unexpected_values` is the (possibly truncated) list fetched from the
/// backend; it is absent for `BOOLEAN_ONLY`.
pub fn map_payload(
    format: &ResultFormat,
    element_count: u64,
    unexpected_count: u64,
    unexpected_values: Option<&[MetricValue]>,
) -> ResultPayload {
    if format.is_boolean_only() {
        return ResultPayload::new();
    }

    let unexpected_percent = if element_count == 0 {
        Value::Null
    } else {
        json!(unexpected_count as f64 / element_count as f64 * 100.0)
    };
    let values: Vec<Value> = unexpected_values
        .unwrap_or_default()
        .iter()
        .map(MetricValue::to_json)
        .collect();
    let partial: Vec<Value> = values
        .iter()
        .take(format.partial_unexpected_count)
        .cloned()
        .collect();

    let mut payload = ResultPayload::new()
        .with("element_count", element_count)
        .with("unexpected_count", unexpected_count)
        .with("unexpected_percent", unexpected_percent);

    if matches!(
        format.result_format,
        ResultFormatKind::Summary | ResultFormatKind::Complete
    ) {
        payload.insert("partial_unexpected_counts", value_counts(&partial));
    }
    payload.insert("partial_unexpected_list", partial);
    if format.is_complete() {
        payload.insert("unexpected_list", values);
    }
    payload
}

/// `[{"value": v, "count": n}]`, most frequent first, ties in value order.
fn value_counts(values: &[Value]) -> Value {
    let mut counts: BTreeMap<String, (Value, u64)> = BTreeMap::new();
    for value in values {
        counts
            .entry(value.to_string())
            .or_insert_with(|| (value.clone(), 0))
            .1 += 1;
    }
    let mut counts: Vec<(Value, u64)> = counts.into_values().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    Value::Array(
        counts
            .into_iter()
            .map(|(value, count)| json!({"value": value, "count": count}))
            .collect(),
    )
}
