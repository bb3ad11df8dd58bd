//! DataFusion execution backend.
//!
//! Batches are tables registered in a DataFusion [`SessionContext`]; the
//! `batch_id` domain kwarg names the table. A bundle becomes one
//! `SELECT agg_0 AS m0, agg_1 AS m1, ... FROM table [WHERE row_condition]`
//! query. Everything generated here quotes its identifiers through
//! [`SqlSecurity`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use arrow::array::Int64Array;
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//! use term_expect::backend::DataFusionBackend;
//!
//! # fn example() -> term_expect::error::Result<()> {
//! let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, true)]));
//! let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))])?;
//!
//! let backend = DataFusionBackend::new();
//! backend.register_batch("data", batch)?;
//! # Ok(())
//! # }
//! ```

use super::{
    convert, BundledMetricRequest, ComputeDomain, ExecutionBackend, MetricFunction, MetricRequest,
};
use crate::config::DataFusionBackendConfig;
use crate::error::{Result, TermError};
use crate::log_backend_query;
use crate::logging::{truncate_field, LogConfig};
use crate::metrics::{Kwargs, MetricDomainType, MetricId, MetricProviderRegistry, MetricValue};
use crate::security::SqlSecurity;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::TableProvider;
use datafusion::execution::context::{SessionConfig, SessionContext};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// The rows of one compute domain: a table plus an optional filter.
#[derive(Debug, Clone)]
pub struct SqlDomain {
    /// Table name as registered
    pub table_name: String,
    /// Quoted table name, ready to splice into SQL
    pub table: String,
    pub schema: SchemaRef,
    /// Validated `row_condition`
    pub predicate: Option<String>,
}

impl SqlDomain {
    /// ` WHERE (<row_condition>)`, or nothing.
    pub fn where_clause(&self) -> String {
        match &self.predicate {
            Some(predicate) => format!(" WHERE ({predicate})"),
            None => String::new(),
        }
    }

    /// A `WHERE` clause combining the row condition with `condition`.
    pub fn filtered(&self, condition: &str) -> String {
        match &self.predicate {
            Some(predicate) => format!(" WHERE ({predicate}) AND ({condition})"),
            None => format!(" WHERE {condition}"),
        }
    }
}

type AggregateFn = dyn Fn(&Kwargs, &Kwargs) -> Result<String> + Send + Sync;

/// A bundlable metric: renders one SQL aggregate expression from the
/// accessor kwargs and value kwargs of a request.
#[derive(Clone)]
pub struct SqlAggregate(Arc<AggregateFn>);

impl SqlAggregate {
    pub fn new(
        render: impl Fn(&Kwargs, &Kwargs) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(render))
    }

    /// `FUNCTION("column")` over the `column` accessor kwarg.
    pub fn column_function(function: &'static str) -> Self {
        Self::new(move |accessor, _| Ok(format!("{function}({})", quoted(accessor, "column")?)))
    }

    pub fn expression(&self, accessor_kwargs: &Kwargs, value_kwargs: &Kwargs) -> Result<String> {
        (self.0)(accessor_kwargs, value_kwargs)
    }
}

impl fmt::Debug for SqlAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SqlAggregate(..)")
    }
}

/// Quotes the column stored under `key`. The compute domain has already
/// checked that it names a column of the table.
pub(crate) fn quoted(kwargs: &Kwargs, key: &str) -> Result<String> {
    SqlSecurity::quote_identifier(kwargs.require_str(key)?)
}

/// Requests served since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub bundled_requests: usize,
    pub single_requests: usize,
}

#[derive(Debug, Default)]
struct RequestCounters {
    bundled: AtomicUsize,
    single: AtomicUsize,
}

/// [`ExecutionBackend`] over a DataFusion [`SessionContext`].
pub struct DataFusionBackend {
    ctx: SessionContext,
    config: DataFusionBackendConfig,
    log_config: LogConfig,
    counters: RequestCounters,
}

impl fmt::Debug for DataFusionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFusionBackend")
            .field("config", &self.config)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Default for DataFusionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFusionBackend {
    pub fn new() -> Self {
        Self::with_config(DataFusionBackendConfig::default())
    }

    #[instrument(skip(config))]
    pub fn with_config(config: DataFusionBackendConfig) -> Self {
        let session_config = SessionConfig::new()
            .with_batch_size(config.batch_size)
            .with_target_partitions(config.target_partitions);
        Self::with_context(SessionContext::new_with_config(session_config), config)
    }

    /// Wraps a context whose tables were registered elsewhere.
    pub fn with_context(ctx: SessionContext, config: DataFusionBackendConfig) -> Self {
        Self {
            ctx,
            config,
            log_config: LogConfig::default(),
            counters: RequestCounters::default(),
        }
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn config(&self) -> &DataFusionBackendConfig {
        &self.config
    }

    /// Registers an in-memory batch under `name`, replacing any earlier table.
    pub fn register_batch(&self, name: &str, batch: RecordBatch) -> Result<()> {
        SqlSecurity::validate_identifier(name)?;
        self.ctx.deregister_table(name)?;
        self.ctx.register_batch(name, batch)?;
        debug!(table = name, "Registered batch");
        Ok(())
    }

    /// Registers any DataFusion table under `name`, replacing any earlier table.
    pub fn register_table(&self, name: &str, table: Arc<dyn TableProvider>) -> Result<()> {
        SqlSecurity::validate_identifier(name)?;
        self.ctx.deregister_table(name)?;
        self.ctx.register_table(name, table)?;
        debug!(table = name, "Registered table");
        Ok(())
    }

    pub fn stats(&self) -> BackendStats {
        BackendStats {
            bundled_requests: self.counters.bundled.load(Ordering::Relaxed),
            single_requests: self.counters.single.load(Ordering::Relaxed),
        }
    }

    /// Every built-in metric provider.
    pub fn default_registry() -> MetricProviderRegistry<Self> {
        super::providers::default_registry()
    }

    /// Runs `sql` and collects all result batches.
    pub(crate) async fn collect(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        log_backend_query!(
            self.log_config,
            backend = "datafusion",
            sql = %truncate_field(sql, self.log_config.max_field_length),
            "Executing query"
        );
        let batches = self.ctx.sql(sql).await?.collect().await?;
        Ok(batches)
    }
}

/// Column names referenced by accessor kwargs.
fn accessor_columns(accessor_kwargs: &Kwargs) -> Result<Vec<String>> {
    let mut columns = Vec::new();
    for key in ["column", "column_A", "column_B"] {
        if let Some(column) = accessor_kwargs.get_str(key) {
            columns.push(column.to_string());
        }
    }
    if let Some(list) = accessor_kwargs.get_str_list("column_list")? {
        columns.extend(list);
    }
    Ok(columns)
}

#[async_trait]
impl ExecutionBackend for DataFusionBackend {
    type Dataset = SqlDomain;
    type Aggregate = SqlAggregate;

    fn name(&self) -> &str {
        "datafusion"
    }

    #[instrument(skip(self, domain_kwargs), fields(domain.type = %domain_type))]
    async fn get_compute_domain(
        &self,
        domain_kwargs: &Kwargs,
        domain_type: MetricDomainType,
    ) -> Result<ComputeDomain<SqlDomain>> {
        let (compute_kwargs, accessor_kwargs) = domain_type.split_domain_kwargs(domain_kwargs);

        let table_name = compute_kwargs
            .get_str("batch_id")
            .unwrap_or(self.config.table_name.as_str())
            .to_string();
        let table = SqlSecurity::escape_identifier(&table_name)?;
        let provider = self
            .ctx
            .table_provider(table_name.as_str())
            .await
            .map_err(|e| {
                TermError::configuration(format!("no table registered for batch '{table_name}': {e}"))
            })?;
        let schema = provider.schema();

        for column in accessor_columns(&accessor_kwargs)? {
            if schema.field_with_name(&column).is_err() {
                return Err(TermError::ColumnNotFound { column });
            }
            SqlSecurity::quote_identifier(&column)?;
        }

        let predicate = match compute_kwargs.get("row_condition") {
            None | Some(Value::Null) => None,
            Some(Value::String(condition)) => {
                SqlSecurity::validate_sql_expression(condition)?;
                Some(condition.clone())
            }
            Some(other) => {
                return Err(TermError::configuration(format!(
                    "'row_condition' must be a string, got {other}"
                )))
            }
        };

        Ok(ComputeDomain {
            data: SqlDomain {
                table_name,
                table,
                schema,
                predicate,
            },
            compute_kwargs,
            accessor_kwargs,
        })
    }

    #[instrument(skip(self, data, requests), fields(table = %data.table_name, bundle.size = requests.len()))]
    async fn resolve_metric_bundle(
        &self,
        data: &SqlDomain,
        requests: &[BundledMetricRequest<SqlAggregate>],
    ) -> Result<HashMap<MetricId, MetricValue>> {
        self.counters.bundled.fetch_add(1, Ordering::Relaxed);
        if requests.is_empty() {
            return Ok(HashMap::new());
        }

        let select = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                let expression = request
                    .aggregate
                    .expression(&request.accessor_kwargs, &request.value_kwargs)?;
                Ok(format!("{expression} AS m{index}"))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("SELECT {select} FROM {}{}", data.table, data.where_clause());

        let batches = self.collect(&sql).await.map_err(|err| {
            if err.is_fatal() {
                return err;
            }
            let metrics: Vec<&str> = requests
                .iter()
                .map(|request| request.metric_id.metric_name.as_str())
                .collect();
            TermError::metric_resolution_with_source(
                metrics.join(", "),
                "bundled aggregate query failed",
                Box::new(err),
            )
        })?;
        let batch = batches
            .iter()
            .find(|batch| batch.num_rows() > 0)
            .ok_or_else(|| {
                TermError::metric_resolution(
                    requests[0].metric_id.metric_name.clone(),
                    "aggregate query returned no rows",
                )
            })?;

        let mut values = HashMap::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            values.insert(
                request.metric_id.clone(),
                convert::value_at(batch.column(index), 0)?,
            );
        }
        Ok(values)
    }

    async fn resolve_metric(
        &self,
        function: &dyn MetricFunction<Self>,
        request: &MetricRequest<SqlDomain>,
    ) -> Result<MetricValue> {
        self.counters.single.fetch_add(1, Ordering::Relaxed);
        function.compute(self, request).await
    }
}
