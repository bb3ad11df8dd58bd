//! End-to-end validation against the DataFusion backend.

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::json;
use std::sync::Arc;
use term_expect::backend::BackendStats;
use term_expect::prelude::*;

fn orders() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("amount", DataType::Float64, true),
        Field::new("billed", DataType::Float64, true),
        Field::new("email", DataType::Utf8, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 2, 3])),
            Arc::new(Float64Array::from(vec![
                Some(1.0),
                Some(2.0),
                Some(3.0),
                None,
            ])),
            Arc::new(Float64Array::from(vec![
                Some(1.0),
                Some(2.0),
                Some(4.0),
                None,
            ])),
            Arc::new(StringArray::from(vec![
                Some("a@example.com"),
                None,
                Some("c@example.com"),
                Some("d@example.com"),
            ])),
        ],
    )
    .unwrap()
}

fn backend() -> Arc<DataFusionBackend> {
    let backend = Arc::new(DataFusionBackend::new());
    backend.register_batch("orders", orders()).unwrap();
    backend
}

fn validator(backend: &Arc<DataFusionBackend>) -> Validator<DataFusionBackend> {
    Validator::datafusion(Arc::clone(backend)).with_batch_id("orders")
}

fn mean(column: &str, min: f64, max: f64) -> ExpectationConfiguration {
    ExpectationConfiguration::new("expect_column_mean_to_be_between")
        .with_kwarg("column", column)
        .with_kwarg("min_value", min)
        .with_kwarg("max_value", max)
}

fn stdev(column: &str) -> ExpectationConfiguration {
    ExpectationConfiguration::new("expect_column_stdev_to_be_between")
        .with_kwarg("column", column)
        .with_kwarg("min_value", 0)
        .with_kwarg("max_value", 5)
}

#[tokio::test]
async fn test_column_mean() {
    let backend = backend();
    let results = validator(&backend)
        .graph_validate(&[mean("amount", 1.0, 3.0)], &RuntimeConfiguration::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].result.observed_value(), Some(&json!(2.0)));
    assert!(results[0].exception_info.is_none());
}

#[tokio::test]
async fn test_missing_column_fails_only_its_expectation() {
    let backend = backend();
    let results = validator(&backend)
        .graph_validate(
            &[mean("amount", 1.0, 3.0), mean("missing", 0.0, 1.0)],
            &RuntimeConfiguration::default(),
        )
        .await
        .unwrap();

    assert!(results[0].success);
    let failed = &results[1];
    assert!(!failed.success);
    assert!(failed.result.observed_value().is_none());
    let exception = failed.exception_info.as_ref().unwrap();
    assert!(exception.exception_message.contains("missing"));
    assert_eq!(failed.expectation_config.column(), Some("missing"));
}

#[tokio::test]
async fn test_aggregates_on_one_table_share_a_query() {
    let backend = backend();
    let results = validator(&backend)
        .graph_validate(
            &[mean("amount", 1.0, 3.0), stdev("amount"), mean("billed", 0.0, 10.0)],
            &RuntimeConfiguration::default(),
        )
        .await
        .unwrap();

    assert!(results.iter().all(|result| result.success));
    assert_eq!(
        backend.stats(),
        BackendStats {
            bundled_requests: 1,
            single_requests: 0,
        }
    );
}

#[tokio::test]
async fn test_bundling_disabled_sends_one_query_per_metric() {
    let backend = backend();
    let runtime = RuntimeConfiguration::default().with_bundling(false);
    let results = validator(&backend)
        .graph_validate(&[mean("amount", 1.0, 3.0), stdev("amount")], &runtime)
        .await
        .unwrap();

    assert!(results.iter().all(|result| result.success));
    assert_eq!(backend.stats().bundled_requests, 2);
}

#[tokio::test]
async fn test_row_condition_restricts_rows() {
    let backend = backend();
    let configuration = mean("amount", 2.5, 3.0).with_kwarg("row_condition", "\"id\" >= 2");
    let results = validator(&backend)
        .graph_validate(&[configuration], &RuntimeConfiguration::default())
        .await
        .unwrap();

    assert!(results[0].success);
    assert_eq!(results[0].result.observed_value(), Some(&json!(2.5)));
}

#[tokio::test]
async fn test_column_pair_equal_with_mostly() {
    let backend = backend();
    let strict = ExpectationConfiguration::new("expect_column_pair_values_to_be_equal")
        .with_kwarg("column_A", "amount")
        .with_kwarg("column_B", "billed");
    let relaxed = strict.clone().with_kwarg("mostly", 0.75);

    let results = validator(&backend)
        .graph_validate(&[strict, relaxed], &RuntimeConfiguration::default())
        .await
        .unwrap();

    assert!(!results[0].success);
    assert!(results[1].success);
    assert_eq!(results[0].result.get("unexpected_count"), Some(&json!(1)));
    assert_eq!(results[0].result.get("element_count"), Some(&json!(4)));
}

#[tokio::test]
async fn test_not_null_reports_unexpected_values() {
    let backend = backend();
    let configuration = ExpectationConfiguration::new("expect_column_values_to_not_be_null")
        .with_kwarg("column", "email");
    let runtime = RuntimeConfiguration::default()
        .with_result_format(ResultFormat::new(ResultFormatKind::Complete));
    let results = validator(&backend)
        .graph_validate(&[configuration], &runtime)
        .await
        .unwrap();

    let result = &results[0];
    assert!(!result.success);
    assert_eq!(result.result.get("unexpected_count"), Some(&json!(1)));
    assert_eq!(result.result.get("unexpected_percent"), Some(&json!(25.0)));
    assert_eq!(result.result.get("unexpected_list"), Some(&json!([null])));
}

#[tokio::test]
async fn test_queried_column_values_unique() {
    let backend = backend();
    let all_ids = ExpectationConfiguration::new("expect_queried_column_values_to_be_unique")
        .with_kwarg("column", "id");
    let filtered = all_ids
        .clone()
        .with_kwarg("query", "SELECT {column} FROM {active_batch} WHERE \"id\" <> 2");

    let results = validator(&backend)
        .graph_validate(&[all_ids, filtered], &RuntimeConfiguration::default())
        .await
        .unwrap();

    assert!(!results[0].success);
    assert_eq!(
        results[0].result.get("details"),
        Some(&json!({"duplicates": [2]}))
    );
    assert!(results[1].success);
}

#[tokio::test]
async fn test_column_type_and_row_count() {
    let backend = backend();
    let results = validator(&backend)
        .graph_validate(
            &[
                ExpectationConfiguration::new("expect_column_values_to_be_of_type")
                    .with_kwarg("column", "email")
                    .with_kwarg("type_", "Utf8"),
                ExpectationConfiguration::new("expect_table_row_count_to_be_between")
                    .with_kwarg("min_value", 1)
                    .with_kwarg("max_value", 3),
            ],
            &RuntimeConfiguration::default(),
        )
        .await
        .unwrap();

    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].result.observed_value(), Some(&json!(4)));
}

#[tokio::test]
async fn test_unregistered_batch_fails_its_expectations() {
    let backend = backend();
    let elsewhere = mean("amount", 1.0, 3.0).with_kwarg("batch_id", "nowhere");
    let results = validator(&backend)
        .graph_validate(
            &[elsewhere, mean("amount", 1.0, 3.0)],
            &RuntimeConfiguration::default(),
        )
        .await
        .unwrap();

    assert!(!results[0].success);
    assert!(results[0].exception_info.is_some());
    assert!(results[1].success);
}

#[tokio::test]
async fn test_suite_statistics() {
    let backend = backend();
    let suite = validator(&backend)
        .with_suite_name("orders_suite")
        .validate(
            &[
                mean("amount", 1.0, 3.0),
                mean("amount", 10.0, 20.0),
                mean("missing", 0.0, 1.0),
                ExpectationConfiguration::new("expect_no_such_thing"),
            ],
            &RuntimeConfiguration::default(),
        )
        .await
        .unwrap();

    assert_eq!(suite.suite_name, "orders_suite");
    assert!(!suite.success);
    assert_eq!(suite.results.len(), 4);
    assert_eq!(suite.statistics.evaluated_expectations, 4);
    assert_eq!(suite.statistics.successful_expectations, 1);
    assert_eq!(suite.statistics.success_percent, Some(25.0));
    assert_eq!(suite.meta.batch_id.as_deref(), Some("orders"));
    assert_eq!(
        suite.results[3].exception_info.as_ref().map(|e| e.failure_kind),
        Some(FailureKind::Validation)
    );
}

#[tokio::test]
async fn test_strict_mode_returns_configuration_errors() {
    let backend = backend();
    let result = validator(&backend)
        .graph_validate(
            &[ExpectationConfiguration::new("expect_column_mean_to_be_between")],
            &RuntimeConfiguration::strict(),
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_results_serialize() {
    let backend = backend();
    let suite = validator(&backend)
        .validate(&[mean("amount", 1.0, 3.0)], &RuntimeConfiguration::default())
        .await
        .unwrap();
    let value = serde_json::to_value(&suite).unwrap();
    assert_eq!(value["statistics"]["success_percent"], json!(100.0));
    assert_eq!(
        value["results"][0]["expectation_config"]["expectation_type"],
        json!("expect_column_mean_to_be_between")
    );
}

#[tokio::test]
async fn test_direct_metric_access() {
    let backend = backend();
    let validator = validator(&backend);
    let runtime = RuntimeConfiguration::default();

    let mean = MetricConfiguration::with_domain(
        "column.mean",
        Kwargs::new().with("column", "amount"),
    );
    assert_eq!(
        validator.get_metric(&mean, &runtime).await.unwrap(),
        MetricValue::Double(2.0)
    );
    assert_eq!(
        validator.columns(&runtime).await.unwrap(),
        vec!["id", "amount", "billed", "email"]
    );

    let missing = MetricConfiguration::with_domain(
        "column.max",
        Kwargs::new().with("column", "missing"),
    );
    let resolution = validator
        .compute_metrics(&[mean.clone(), missing], &runtime)
        .await
        .unwrap();
    assert_eq!(resolution.resolved.len(), 1);
    assert_eq!(resolution.aborted.len(), 1);
    assert_eq!(resolution.stats.bundled_requests, 1);
}

#[tokio::test]
async fn test_only_return_failures_over_datafusion() {
    let backend = backend();
    let suite = validator(&backend)
        .validate(
            &[mean("amount", 1.0, 3.0), mean("billed", 10.0, 20.0)],
            &RuntimeConfiguration::default().with_only_return_failures(true),
        )
        .await
        .unwrap();

    assert_eq!(suite.results.len(), 1);
    assert_eq!(suite.results[0].expectation_config.column(), Some("billed"));
    assert_eq!(suite.statistics.evaluated_expectations, 2);
    assert_eq!(suite.statistics.success_percent, Some(50.0));
}
