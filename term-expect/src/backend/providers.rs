//! Built-in metric providers for the DataFusion backend.

use super::datafusion::{quoted, DataFusionBackend, SqlAggregate, SqlDomain};
use super::{convert, MetricFunction, MetricRequest};
use crate::error::{Result, TermError};
use crate::metrics::{
    MetricDependency, MetricDomainType, MetricProviderRegistry, MetricValue,
};
use crate::security::SqlSecurity;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) fn default_registry() -> MetricProviderRegistry<DataFusionBackend> {
    use MetricDomainType::{Column, ColumnPair, Table};

    let mut registry = MetricProviderRegistry::new();
    registry
        .register_aggregate(
            "table.row_count",
            Table,
            SqlAggregate::new(|_, _| Ok("COUNT(*)".to_string())),
        )
        .register_aggregate("column.mean", Column, SqlAggregate::column_function("AVG"))
        .register_aggregate(
            "column.standard_deviation",
            Column,
            SqlAggregate::column_function("STDDEV"),
        )
        .register_aggregate("column.sum", Column, SqlAggregate::column_function("SUM"))
        .register_aggregate("column.min", Column, SqlAggregate::column_function("MIN"))
        .register_aggregate("column.max", Column, SqlAggregate::column_function("MAX"))
        // rows that are not null are the unexpected ones for "to be null"
        .register_aggregate(
            "column_values.null.unexpected_count",
            Column,
            SqlAggregate::column_function("COUNT"),
        )
        .register_aggregate(
            "column_values.nonnull.unexpected_count",
            Column,
            SqlAggregate::new(|accessor, _| {
                Ok(format!("COUNT(*) - COUNT({})", quoted(accessor, "column")?))
            }),
        )
        .register_aggregate(
            "column_pair.values.unequal_count",
            ColumnPair,
            SqlAggregate::new(|accessor, _| {
                Ok(format!(
                    "COUNT(CASE WHEN {} IS DISTINCT FROM {} THEN 1 END)",
                    quoted(accessor, "column_A")?,
                    quoted(accessor, "column_B")?
                ))
            }),
        )
        .register_function("table.column_types", Table, Arc::new(ColumnTypes), Vec::new())
        .register_function(
            "table.columns",
            Table,
            Arc::new(ColumnNames),
            vec![MetricDependency::same_domain("table.column_types")],
        )
        .register_function(
            "column_values.null.unexpected_values",
            Column,
            Arc::new(UnexpectedValues {
                condition: "IS NOT NULL",
            }),
            Vec::new(),
        )
        .register_function(
            "column_values.nonnull.unexpected_values",
            Column,
            Arc::new(UnexpectedValues {
                condition: "IS NULL",
            }),
            Vec::new(),
        )
        .register_function("query.column", Table, Arc::new(QueryColumn), Vec::new());
    registry
}

/// Column name to Arrow type name, read from the table schema.
#[derive(Debug)]
struct ColumnTypes;

#[async_trait]
impl MetricFunction<DataFusionBackend> for ColumnTypes {
    async fn compute(
        &self,
        _backend: &DataFusionBackend,
        request: &MetricRequest<SqlDomain>,
    ) -> Result<MetricValue> {
        let types: BTreeMap<String, MetricValue> = request
            .domain
            .data
            .schema
            .fields()
            .iter()
            .map(|field| {
                (
                    field.name().clone(),
                    MetricValue::String(field.data_type().to_string()),
                )
            })
            .collect();
        Ok(MetricValue::Map(types))
    }
}

/// Column names in schema order.
#[derive(Debug)]
struct ColumnNames;

#[async_trait]
impl MetricFunction<DataFusionBackend> for ColumnNames {
    async fn compute(
        &self,
        _backend: &DataFusionBackend,
        request: &MetricRequest<SqlDomain>,
    ) -> Result<MetricValue> {
        let types = request.dependency("table.column_types")?;
        let types = types.as_map().ok_or_else(|| TermError::TypeMismatch {
            expected: "map of column types".to_string(),
            found: types.to_string(),
        })?;
        let names = request
            .domain
            .data
            .schema
            .fields()
            .iter()
            .map(|field| field.name())
            .filter(|name| types.contains_key(*name))
            .map(|name| MetricValue::String(name.clone()))
            .collect();
        Ok(MetricValue::List(names))
    }
}

/// Values of rows where `column <condition>` holds, up to the `limit` value kwarg.
#[derive(Debug)]
struct UnexpectedValues {
    condition: &'static str,
}

#[async_trait]
impl MetricFunction<DataFusionBackend> for UnexpectedValues {
    async fn compute(
        &self,
        backend: &DataFusionBackend,
        request: &MetricRequest<SqlDomain>,
    ) -> Result<MetricValue> {
        let value_kwargs = request.configuration.metric_value_kwargs();
        let limit = match value_kwargs.get("limit") {
            None => String::new(),
            Some(_) => {
                let limit = value_kwargs.get_u64("limit").ok_or_else(|| {
                    TermError::configuration("'limit' must be a non-negative integer")
                })?;
                format!(" LIMIT {limit}")
            }
        };

        let column = SqlSecurity::quote_identifier(request.column()?)?;
        let data = &request.domain.data;
        let sql = format!(
            "SELECT {column} FROM {}{}{limit}",
            data.table,
            data.filtered(&format!("{column} {}", self.condition))
        );
        let batches = backend.collect(&sql).await?;
        first_column_values(&batches).map(MetricValue::List)
    }
}

fn first_column_values(batches: &[RecordBatch]) -> Result<Vec<MetricValue>> {
    let mut values = Vec::new();
    for batch in batches {
        values.extend(convert::column_values(batch.column(0))?);
    }
    Ok(values)
}

/// Values of one column of a user query over the active batch.
#[derive(Debug)]
struct QueryColumn;

#[async_trait]
impl MetricFunction<DataFusionBackend> for QueryColumn {
    async fn compute(
        &self,
        backend: &DataFusionBackend,
        request: &MetricRequest<SqlDomain>,
    ) -> Result<MetricValue> {
        let value_kwargs = request.configuration.metric_value_kwargs();
        let column = value_kwargs.require_str("column")?;
        let sql = value_kwargs
            .require_str("query")?
            .replace("{active_batch}", &request.domain.data.table);
        SqlSecurity::validate_query(&sql)?;

        let batches = backend.collect(&sql).await?;
        let mut values = Vec::new();
        for batch in &batches {
            let index = match batch.schema().index_of(column) {
                Ok(index) => index,
                Err(_) if batch.num_columns() == 1 => 0,
                Err(_) => {
                    return Err(TermError::ColumnNotFound {
                        column: column.to_string(),
                    })
                }
            };
            values.extend(convert::column_values(batch.column(index))?);
        }
        Ok(MetricValue::List(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ExecutionBackend, MetricFunction};
    use crate::metrics::{Kwargs, MetricConfiguration};
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::collections::HashMap;

    async fn backend() -> DataFusionBackend {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 2, 4])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c"), None])),
            ],
        )
        .unwrap();
        let backend = DataFusionBackend::new();
        backend.register_batch("people", batch).unwrap();
        backend
    }

    async fn request(
        backend: &DataFusionBackend,
        configuration: MetricConfiguration,
        domain_type: MetricDomainType,
        dependencies: HashMap<String, MetricValue>,
    ) -> MetricRequest<SqlDomain> {
        let domain = backend
            .get_compute_domain(configuration.metric_domain_kwargs(), domain_type)
            .await
            .unwrap();
        MetricRequest {
            configuration,
            domain,
            dependencies,
        }
    }

    #[test]
    fn test_registry_contents() {
        let registry = default_registry();
        assert_eq!(registry.len(), 14);
        assert!(registry.get("column.mean").unwrap().provider.is_bundlable());
        assert!(!registry.get("query.column").unwrap().provider.is_bundlable());
    }

    #[tokio::test]
    async fn test_column_types_and_names() {
        let backend = backend().await;
        let domain = Kwargs::new().with("batch_id", "people");
        let types_request = request(
            &backend,
            MetricConfiguration::with_domain("table.column_types", domain.clone()),
            MetricDomainType::Table,
            HashMap::new(),
        )
        .await;
        let types = ColumnTypes.compute(&backend, &types_request).await.unwrap();
        assert_eq!(
            types.as_map().unwrap().get("id"),
            Some(&MetricValue::from("Int64"))
        );

        let names_request = request(
            &backend,
            MetricConfiguration::with_domain("table.columns", domain),
            MetricDomainType::Table,
            HashMap::from([("table.column_types".to_string(), types)]),
        )
        .await;
        let names = ColumnNames.compute(&backend, &names_request).await.unwrap();
        assert_eq!(
            names,
            MetricValue::List(vec![MetricValue::from("id"), MetricValue::from("name")])
        );
    }

    #[tokio::test]
    async fn test_unexpected_values_limit() {
        let backend = backend().await;
        let configuration = MetricConfiguration::new(
            "column_values.null.unexpected_values",
            Kwargs::new().with("batch_id", "people").with("column", "name"),
            Kwargs::new().with("limit", 1),
        );
        let request = request(&backend, configuration, MetricDomainType::Column, HashMap::new()).await;
        let values = UnexpectedValues {
            condition: "IS NOT NULL",
        }
        .compute(&backend, &request)
        .await
        .unwrap();
        assert_eq!(values.as_list().map(<[MetricValue]>::len), Some(1));
    }

    #[tokio::test]
    async fn test_query_column() {
        let backend = backend().await;
        let configuration = MetricConfiguration::new(
            "query.column",
            Kwargs::new().with("batch_id", "people"),
            Kwargs::new()
                .with("query", "SELECT \"id\" FROM {active_batch} WHERE \"id\" > 1")
                .with("column", "id"),
        );
        let request = request(&backend, configuration, MetricDomainType::Table, HashMap::new()).await;
        let mut values: Vec<i64> = QueryColumn
            .compute(&backend, &request)
            .await
            .unwrap()
            .as_list()
            .unwrap()
            .iter()
            .filter_map(MetricValue::as_i64)
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![2, 2, 4]);
    }
}
