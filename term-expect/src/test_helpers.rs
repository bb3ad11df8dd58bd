//! In-memory backend for unit tests.
//!
//! [`ScriptedBackend`] computes a handful of aggregates over `f64` columns,
//! records every request it receives and can be told to fail specific
//! metrics or to become unavailable altogether.

use crate::backend::{
    BundledMetricRequest, ComputeDomain, ExecutionBackend, MetricFunction, MetricRequest,
};
use crate::error::{Result, TermError};
use crate::metrics::{
    Kwargs, MetricDependency, MetricDomainType, MetricId, MetricProviderRegistry, MetricValue,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub type Columns = BTreeMap<String, Vec<Option<f64>>>;

/// A request as the backend saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Bundle { metric_names: Vec<String> },
    Single { metric_name: String },
}

#[derive(Debug, Clone)]
pub struct ScriptedTable {
    pub columns: Arc<Columns>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptedAggregate {
    RowCount,
    Mean,
    StdDev,
    Sum,
    Min,
    Max,
    NullCount,
    NonNullCount,
}

#[derive(Debug)]
pub enum ScriptedFunction {
    ColumnNames,
    ColumnTypes,
    /// max - min, from its dependencies
    Range,
    /// range / max, from its dependencies
    RangeRatio,
    /// Non-null values, limited by the `limit` value kwarg
    NonNullValues,
    /// Null markers, limited by the `limit` value kwarg
    NullValues,
}

#[derive(Debug)]
pub struct ScriptedBackend {
    tables: HashMap<String, Arc<Columns>>,
    failing_metrics: HashSet<String>,
    unavailable: AtomicBool,
    calls: Mutex<Vec<BackendCall>>,
}

impl ScriptedBackend {
    /// A backend serving one table named `data`.
    pub fn new(columns: Columns) -> Self {
        let mut tables = HashMap::new();
        tables.insert("data".to_string(), Arc::new(columns));
        Self {
            tables,
            failing_metrics: HashSet::new(),
            unavailable: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Backend over `{x: [1, 2, 3], y: [10, 20, null]}`.
    pub fn sample() -> Self {
        Self::new(sample_columns())
    }

    pub fn with_table(mut self, name: &str, columns: Columns) -> Self {
        self.tables.insert(name.to_string(), Arc::new(columns));
        self
    }

    /// Every request computing this metric fails with a resolution error.
    pub fn failing(mut self, metric_name: &str) -> Self {
        self.failing_metrics.insert(metric_name.to_string());
        self
    }

    /// Every request fails with a fatal error from now on.
    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bundle_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Bundle { metric_names } => Some(metric_names),
                BackendCall::Single { .. } => None,
            })
            .collect()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TermError::BackendUnavailable(
                "scripted session closed".to_string(),
            ));
        }
        Ok(())
    }

    fn check_failure(&self, metric_name: &str) -> Result<()> {
        if self.failing_metrics.contains(metric_name) {
            return Err(TermError::metric_resolution(
                metric_name,
                "scripted failure",
            ));
        }
        Ok(())
    }
}

pub fn sample_columns() -> Columns {
    let mut columns = Columns::new();
    columns.insert("x".to_string(), vec![Some(1.0), Some(2.0), Some(3.0)]);
    columns.insert("y".to_string(), vec![Some(10.0), Some(20.0), None]);
    columns
}

fn column<'a>(table: &'a ScriptedTable, accessor: &Kwargs) -> Result<&'a [Option<f64>]> {
    let name = accessor.require_str("column")?;
    table
        .columns
        .get(name)
        .map(Vec::as_slice)
        .ok_or_else(|| TermError::ColumnNotFound {
            column: name.to_string(),
        })
}

fn compute_aggregate(
    aggregate: ScriptedAggregate,
    table: &ScriptedTable,
    accessor: &Kwargs,
) -> Result<MetricValue> {
    if aggregate == ScriptedAggregate::RowCount {
        let rows = table.columns.values().next().map(Vec::len).unwrap_or(0);
        return Ok(MetricValue::Long(rows as i64));
    }

    let values = column(table, accessor)?;
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let n = present.len() as f64;
    let mean = if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / n)
    };

    let value = match aggregate {
        ScriptedAggregate::RowCount => unreachable!(),
        ScriptedAggregate::Mean => mean.into(),
        ScriptedAggregate::StdDev => match mean {
            Some(mean) if present.len() > 1 => {
                let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
                MetricValue::Double(var.sqrt())
            }
            _ => MetricValue::Null,
        },
        ScriptedAggregate::Sum => MetricValue::Double(present.iter().sum()),
        ScriptedAggregate::Min => present.iter().copied().reduce(f64::min).into(),
        ScriptedAggregate::Max => present.iter().copied().reduce(f64::max).into(),
        ScriptedAggregate::NullCount => MetricValue::Long((values.len() - present.len()) as i64),
        ScriptedAggregate::NonNullCount => MetricValue::Long(present.len() as i64),
    };
    Ok(value)
}

fn limited<T>(items: impl Iterator<Item = T>, value_kwargs: &Kwargs) -> Vec<T> {
    match value_kwargs.get_u64("limit") {
        Some(limit) => items.take(limit as usize).collect(),
        None => items.collect(),
    }
}

#[async_trait]
impl MetricFunction<ScriptedBackend> for ScriptedFunction {
    async fn compute(
        &self,
        backend: &ScriptedBackend,
        request: &MetricRequest<ScriptedTable>,
    ) -> Result<MetricValue> {
        backend.check_available()?;
        backend.calls.lock().unwrap().push(BackendCall::Single {
            metric_name: request.configuration.metric_name().to_string(),
        });
        backend.check_failure(request.configuration.metric_name())?;

        let table = &request.domain.data;
        let value_kwargs = request.configuration.metric_value_kwargs();
        match self {
            ScriptedFunction::ColumnNames => Ok(MetricValue::List(
                table.columns.keys().map(|k| k.as_str().into()).collect(),
            )),
            ScriptedFunction::ColumnTypes => Ok(MetricValue::Map(
                table
                    .columns
                    .keys()
                    .map(|k| (k.clone(), MetricValue::from("Float64")))
                    .collect(),
            )),
            ScriptedFunction::Range => {
                let min = request.dependency("column.min")?.as_f64();
                let max = request.dependency("column.max")?.as_f64();
                Ok(min.zip(max).map(|(min, max)| max - min).into())
            }
            ScriptedFunction::RangeRatio => {
                let range = request.dependency("column.range")?.as_f64();
                let max = request.dependency("column.max")?.as_f64();
                Ok(range.zip(max).map(|(range, max)| range / max).into())
            }
            ScriptedFunction::NonNullValues => {
                let values = column(table, &request.domain.accessor_kwargs)?;
                Ok(MetricValue::List(limited(
                    values.iter().flatten().map(|v| MetricValue::Double(*v)),
                    value_kwargs,
                )))
            }
            ScriptedFunction::NullValues => {
                let values = column(table, &request.domain.accessor_kwargs)?;
                Ok(MetricValue::List(limited(
                    values.iter().filter(|v| v.is_none()).map(|_| MetricValue::Null),
                    value_kwargs,
                )))
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    type Dataset = ScriptedTable;
    type Aggregate = ScriptedAggregate;

    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_compute_domain(
        &self,
        domain_kwargs: &Kwargs,
        domain_type: MetricDomainType,
    ) -> Result<ComputeDomain<ScriptedTable>> {
        self.check_available()?;
        let table_name = domain_kwargs.get_str("batch_id").unwrap_or("data");
        let columns = self.tables.get(table_name).cloned().ok_or_else(|| {
            TermError::configuration(format!("unknown batch '{table_name}'"))
        })?;

        let (compute_kwargs, accessor_kwargs) = domain_type.split_domain_kwargs(domain_kwargs);
        if let Some(name) = accessor_kwargs.get_str("column") {
            if !columns.contains_key(name) {
                return Err(TermError::ColumnNotFound {
                    column: name.to_string(),
                });
            }
        }

        Ok(ComputeDomain {
            data: ScriptedTable { columns },
            compute_kwargs,
            accessor_kwargs,
        })
    }

    async fn resolve_metric_bundle(
        &self,
        data: &ScriptedTable,
        requests: &[BundledMetricRequest<ScriptedAggregate>],
    ) -> Result<HashMap<MetricId, MetricValue>> {
        self.check_available()?;
        self.calls.lock().unwrap().push(BackendCall::Bundle {
            metric_names: requests
                .iter()
                .map(|r| r.metric_id.metric_name.clone())
                .collect(),
        });
        for request in requests {
            self.check_failure(&request.metric_id.metric_name)?;
        }

        requests
            .iter()
            .map(|request| {
                compute_aggregate(request.aggregate, data, &request.accessor_kwargs)
                    .map(|value| (request.metric_id.clone(), value))
            })
            .collect()
    }
}

/// Registry with the metric names used by the built-in expectations.
pub fn scripted_registry() -> MetricProviderRegistry<ScriptedBackend> {
    use MetricDomainType::{Column, Table};

    let mut registry = MetricProviderRegistry::new();
    registry
        .register_aggregate("table.row_count", Table, ScriptedAggregate::RowCount)
        .register_aggregate("column.mean", Column, ScriptedAggregate::Mean)
        .register_aggregate(
            "column.standard_deviation",
            Column,
            ScriptedAggregate::StdDev,
        )
        .register_aggregate("column.sum", Column, ScriptedAggregate::Sum)
        .register_aggregate("column.min", Column, ScriptedAggregate::Min)
        .register_aggregate("column.max", Column, ScriptedAggregate::Max)
        .register_aggregate(
            "column_values.null.unexpected_count",
            Column,
            ScriptedAggregate::NonNullCount,
        )
        .register_aggregate(
            "column_values.nonnull.unexpected_count",
            Column,
            ScriptedAggregate::NullCount,
        )
        .register_function(
            "table.column_types",
            Table,
            Arc::new(ScriptedFunction::ColumnTypes),
            vec![],
        )
        .register_function(
            "table.columns",
            Table,
            Arc::new(ScriptedFunction::ColumnNames),
            vec![MetricDependency::table("table.column_types")],
        )
        .register_function(
            "column.range",
            Column,
            Arc::new(ScriptedFunction::Range),
            vec![
                MetricDependency::same_domain("column.min"),
                MetricDependency::same_domain("column.max"),
            ],
        )
        .register_function(
            "column.range_ratio",
            Column,
            Arc::new(ScriptedFunction::RangeRatio),
            vec![
                MetricDependency::same_domain("column.range"),
                MetricDependency::same_domain("column.max"),
            ],
        )
        .register_function(
            "column_values.null.unexpected_values",
            Column,
            Arc::new(ScriptedFunction::NonNullValues),
            vec![],
        )
        .register_function(
            "column_values.nonnull.unexpected_values",
            Column,
            Arc::new(ScriptedFunction::NullValues),
            vec![],
        );
    registry
}

/// Shorthand for domain kwargs on a single column.
pub fn column_domain(column: &str) -> Kwargs {
    Kwargs::new().with("column", column)
}
