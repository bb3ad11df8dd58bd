//! Suite validation: from expectation configurations to results.
//!
//! [`Validator::graph_validate`] runs the whole pipeline for a list of
//! expectations:
//!
//! 1. look up each expectation, check its configuration and build the
//!    metric sub-graph of its validation dependencies;
//! 2. merge the sub-graphs and resolve the merged graph once, so metrics
//!    shared between expectations are computed once and aggregates on the
//!    same rows travel in one backend request;
//! 3. give every expectation with an aborted metric a failed result
//!    carrying the attributed exceptions, and evaluate the others.
//!
//! Results come back in the order the configurations were given.
//!
//! [`Validator::compute_metrics`] and [`Validator::get_metric`] resolve
//! metrics directly, without any expectation on top.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use term_expect::prelude::*;
//!
//! # async fn example(batch: arrow::record_batch::RecordBatch) -> Result<()> {
//! let backend = Arc::new(DataFusionBackend::new());
//! backend.register_batch("orders", batch)?;
//!
//! let validator = Validator::datafusion(backend)
//!     .with_suite_name("orders_suite")
//!     .with_batch_id("orders");
//!
//! let suite = validator
//!     .validate(
//!         &[ExpectationConfiguration::new("expect_column_mean_to_be_between")
//!             .with_kwarg("column", "amount")
//!             .with_kwarg("min_value", 0)],
//!         &RuntimeConfiguration::default(),
//!     )
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&suite)?);
//! # Ok(())
//! # }
//! ```

mod statistics;

pub use statistics::ValidationStatistics;

use crate::backend::{DataFusionBackend, ExecutionBackend};
use crate::config::RuntimeConfiguration;
use crate::error::{ExceptionInfo, FailureKind, Result, TermError};
use crate::expectations::{
    Expectation, ExpectationConfiguration, ExpectationRegistry, ExpectationValidationResult,
    MetricsView, ValidationDependencies,
};
use crate::graph::{
    DependencyGraphBuilder, ExpectationValidationGraph, GraphResolution, GraphResolver,
    MetricOutcome, ValidationGraph,
};
use crate::logging::LogConfig;
use crate::metrics::{Kwargs, MetricConfiguration, MetricProviderRegistry, MetricValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Run metadata of one suite validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMeta {
    pub run_time: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

/// Results of a suite run together with their statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationSuiteValidationResult {
    pub suite_name: String,
    pub success: bool,
    pub results: Vec<ExpectationValidationResult>,
    pub statistics: ValidationStatistics,
    pub meta: ValidationMeta,
}

/// An expectation that made it through graph construction.
struct PlannedExpectation {
    index: usize,
    expectation: Arc<dyn Expectation>,
    dependencies: ValidationDependencies,
    graph: ExpectationValidationGraph,
}

/// Validates expectation suites against one backend.
#[derive(Debug)]
pub struct Validator<B: ExecutionBackend> {
    backend: Arc<B>,
    metric_registry: Arc<MetricProviderRegistry<B>>,
    expectation_registry: Arc<ExpectationRegistry>,
    batch_id: Option<String>,
    suite_name: String,
    log_config: LogConfig,
}

impl Validator<DataFusionBackend> {
    /// A validator over DataFusion with every built-in metric and expectation.
    pub fn datafusion(backend: Arc<DataFusionBackend>) -> Self {
        Self::new(backend, Arc::new(DataFusionBackend::default_registry()))
    }
}

impl<B: ExecutionBackend> Validator<B> {
    pub fn new(backend: Arc<B>, metric_registry: Arc<MetricProviderRegistry<B>>) -> Self {
        Self {
            backend,
            metric_registry,
            expectation_registry: Arc::new(ExpectationRegistry::with_builtins()),
            batch_id: None,
            suite_name: "default".to_string(),
            log_config: LogConfig::default(),
        }
    }

    pub fn with_expectation_registry(mut self, registry: Arc<ExpectationRegistry>) -> Self {
        self.expectation_registry = registry;
        self
    }

    /// Batch every expectation runs against unless it names its own.
    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_suite_name(mut self, suite_name: impl Into<String>) -> Self {
        self.suite_name = suite_name.into();
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn list_available_expectation_types(&self) -> Vec<String> {
        self.expectation_registry.expectation_types()
    }

    /// Validates `configurations` and wraps the results with statistics.
    ///
    /// With `only_return_failures` set, successful results are dropped after
    /// the statistics have been computed over all of them.
    pub async fn validate(
        &self,
        configurations: &[ExpectationConfiguration],
        runtime: &RuntimeConfiguration,
    ) -> Result<ExpectationSuiteValidationResult> {
        let run_time = Utc::now();
        let start = Instant::now();

        let results = self.graph_validate(configurations, runtime).await?;
        let statistics = ValidationStatistics::from_results(&results);
        let duration_ms = start.elapsed().as_millis() as u64;
        let results = if runtime.only_return_failures {
            results.into_iter().filter(|result| !result.success).collect()
        } else {
            results
        };

        if self.log_config.log_statistics {
            info!(
                suite.name = %self.suite_name,
                suite.evaluated = statistics.evaluated_expectations,
                suite.successful = statistics.successful_expectations,
                suite.success_percent = ?statistics.success_percent,
                suite.duration_ms = duration_ms,
                "Validation suite completed"
            );
        }

        Ok(ExpectationSuiteValidationResult {
            suite_name: self.suite_name.clone(),
            success: statistics.success,
            results,
            statistics,
            meta: ValidationMeta {
                run_time,
                completed_at: Utc::now(),
                duration_ms,
                batch_id: self.batch_id.clone(),
            },
        })
    }

    /// Evaluates every expectation over one merged metric graph.
    ///
    /// Metric failures never surface as `Err`: they become failed results of
    /// the expectations that needed the metric. Configuration and validation
    /// errors do too unless `catch_exceptions` is off. A fatal resolution
    /// error fails every expectation that reached resolution with the same
    /// exception, or is returned when `catch_exceptions` is off.
    #[instrument(skip_all, fields(suite.name = %self.suite_name, expectations = configurations.len()))]
    pub async fn graph_validate(
        &self,
        configurations: &[ExpectationConfiguration],
        runtime: &RuntimeConfiguration,
    ) -> Result<Vec<ExpectationValidationResult>> {
        runtime.validate()?;
        info!(
            suite.name = %self.suite_name,
            suite.expectations = configurations.len(),
            backend = self.backend.name(),
            "Starting validation"
        );

        let mut results: Vec<Option<ExpectationValidationResult>> =
            (0..configurations.len()).map(|_| None).collect();
        let mut planned = Vec::with_capacity(configurations.len());

        let builder = DependencyGraphBuilder::new(&self.metric_registry);
        for (index, configuration) in configurations.iter().enumerate() {
            let configuration = self.with_batch(configuration);
            match self.plan(&builder, &configuration, runtime) {
                Ok((expectation, dependencies, graph)) => planned.push(PlannedExpectation {
                    index,
                    expectation,
                    dependencies,
                    graph: ExpectationValidationGraph::new(configuration, graph),
                }),
                Err(error) if runtime.catch_exceptions => {
                    warn!(
                        expectation.type = %configuration.expectation_type,
                        error = %error,
                        "Expectation could not be prepared"
                    );
                    let kind = if error.is_fatal() {
                        FailureKind::General
                    } else {
                        FailureKind::Validation
                    };
                    results[index] = Some(ExpectationValidationResult::failed(
                        [ExceptionInfo::from_error(&error, kind)],
                        configuration,
                    ));
                }
                Err(error) => return Err(error),
            }
        }

        if !planned.is_empty() {
            let graph = ValidationGraph::merge(planned.iter().map(|p| &p.graph.graph));
            match self.resolver().resolve(&graph, runtime).await {
                Ok(resolution) => {
                    for expectation in planned {
                        let index = expectation.index;
                        results[index] = Some(self.evaluate(expectation, &resolution, runtime)?);
                    }
                }
                Err(error) if runtime.catch_exceptions => {
                    error!(error = %error, "Metric resolution failed for the whole suite");
                    let exception = ExceptionInfo::from_error(&error, FailureKind::General);
                    for expectation in planned {
                        results[expectation.index] = Some(ExpectationValidationResult::failed(
                            [exception.clone()],
                            expectation.graph.configuration,
                        ));
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Resolves `metrics` and everything they depend on.
    ///
    /// Metrics whose domain names no batch run against the validator's batch.
    /// A metric that fails ends up in [`GraphResolution::aborted`]; only
    /// unknown metrics, bad domains and fatal errors come back as `Err`.
    #[instrument(skip_all, fields(metrics = metrics.len()))]
    pub async fn compute_metrics(
        &self,
        metrics: &[MetricConfiguration],
        runtime: &RuntimeConfiguration,
    ) -> Result<GraphResolution> {
        runtime.validate()?;
        let metrics: Vec<MetricConfiguration> =
            metrics.iter().map(|metric| self.metric_with_batch(metric)).collect();
        let graph = DependencyGraphBuilder::new(&self.metric_registry).build(&metrics, runtime)?;
        self.resolver().resolve(&graph, runtime).await
    }

    /// Resolves one metric, returning its failures as an error.
    pub async fn get_metric(
        &self,
        metric: &MetricConfiguration,
        runtime: &RuntimeConfiguration,
    ) -> Result<MetricValue> {
        let metric = self.metric_with_batch(metric);
        let resolution = self
            .compute_metrics(std::slice::from_ref(&metric), runtime)
            .await?;

        match resolution.outcome(metric.id()) {
            Some(MetricOutcome::Resolved(value)) => Ok(value),
            Some(MetricOutcome::Aborted(exceptions)) => {
                let mut messages: Vec<String> = exceptions
                    .into_iter()
                    .map(|exception| exception.exception_message)
                    .collect();
                messages.sort();
                Err(TermError::metric_resolution(
                    metric.metric_name(),
                    messages.join("; "),
                ))
            }
            None => Err(TermError::Internal(format!(
                "metric '{}' is missing from its own graph",
                metric.metric_name()
            ))),
        }
    }

    /// Column names of the validator's batch, in schema order.
    pub async fn columns(&self, runtime: &RuntimeConfiguration) -> Result<Vec<String>> {
        let metric = MetricConfiguration::with_domain("table.columns", Kwargs::new());
        let value = self.get_metric(&metric, runtime).await?;
        let names = value.as_list().ok_or_else(|| TermError::TypeMismatch {
            expected: "list of column names".to_string(),
            found: value.to_string(),
        })?;
        names
            .iter()
            .map(|name| {
                name.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| TermError::TypeMismatch {
                        expected: "column name".to_string(),
                        found: name.to_string(),
                    })
            })
            .collect()
    }

    fn resolver(&self) -> GraphResolver<'_, B> {
        GraphResolver::new(self.backend.as_ref(), &self.metric_registry)
            .with_log_config(self.log_config.clone())
    }

    fn metric_with_batch(&self, metric: &MetricConfiguration) -> MetricConfiguration {
        match &self.batch_id {
            Some(batch_id) if metric.metric_domain_kwargs().get("batch_id").is_none() => {
                MetricConfiguration::new(
                    metric.metric_name(),
                    metric
                        .metric_domain_kwargs()
                        .clone()
                        .with("batch_id", batch_id.as_str()),
                    metric.metric_value_kwargs().clone(),
                )
            }
            _ => metric.clone(),
        }
    }

    /// Stamps the validator's batch onto a configuration that names none.
    fn with_batch(&self, configuration: &ExpectationConfiguration) -> ExpectationConfiguration {
        let mut configuration = configuration.clone();
        if let Some(batch_id) = &self.batch_id {
            if configuration.batch_id().is_none() {
                configuration.kwargs.insert("batch_id", batch_id.as_str());
            }
        }
        configuration
    }

    fn plan(
        &self,
        builder: &DependencyGraphBuilder<'_, B>,
        configuration: &ExpectationConfiguration,
        runtime: &RuntimeConfiguration,
    ) -> Result<(Arc<dyn Expectation>, ValidationDependencies, ValidationGraph)> {
        let expectation = self
            .expectation_registry
            .get(&configuration.expectation_type)?;
        expectation.validate_configuration(configuration)?;
        let dependencies = expectation.get_validation_dependencies(configuration, runtime)?;
        let graph = builder.build(&dependencies.get_metric_configurations(), runtime)?;
        Ok((expectation, dependencies, graph))
    }

    fn evaluate(
        &self,
        planned: PlannedExpectation,
        resolution: &GraphResolution,
        runtime: &RuntimeConfiguration,
    ) -> Result<ExpectationValidationResult> {
        let PlannedExpectation {
            expectation,
            dependencies,
            graph,
            ..
        } = planned;

        let exceptions = graph.get_exception_info(&resolution.aborted);
        if !exceptions.is_empty() {
            debug!(
                expectation.type = %graph.configuration.expectation_type,
                exceptions = exceptions.len(),
                "Expectation has aborted metrics"
            );
            return Ok(ExpectationValidationResult::failed(
                exceptions,
                graph.configuration,
            ));
        }

        let view = MetricsView::new(&dependencies, &resolution.resolved);
        if !view.is_complete() {
            let error = TermError::Internal(format!(
                "metrics of '{}' were neither resolved nor aborted",
                graph.configuration.expectation_type
            ));
            if !runtime.catch_exceptions {
                return Err(error);
            }
            error!(error = %error, "Expectation cannot be evaluated");
            return Ok(ExpectationValidationResult::failed(
                [ExceptionInfo::from_error(&error, FailureKind::General)],
                graph.configuration,
            ));
        }

        match expectation.validate(&graph.configuration, &view, runtime) {
            Ok(outcome) => {
                debug!(
                    expectation.type = %graph.configuration.expectation_type,
                    success = outcome.success,
                    "Evaluated expectation"
                );
                Ok(ExpectationValidationResult::evaluated(
                    outcome,
                    graph.configuration,
                ))
            }
            Err(error) if runtime.catch_exceptions => {
                warn!(
                    expectation.type = %graph.configuration.expectation_type,
                    error = %error,
                    "Expectation validation raised"
                );
                Ok(ExpectationValidationResult::failed(
                    [ExceptionInfo::from_error(&error, FailureKind::Validation)],
                    graph.configuration,
                ))
            }
            Err(error) => Err(error),
        }
    }
}
