//! Metric identity.

use super::kwargs::Kwargs;
use crate::error::{Result, TermError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Deterministic identity of a metric.
///
/// Equal names and canonically equal kwargs always give equal ids, and the
/// digests are long enough that distinct inputs never collide in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricId {
    pub metric_name: String,
    pub domain_id: String,
    pub value_id: String,
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}:{}]",
            self.metric_name,
            &self.domain_id[..8.min(self.domain_id.len())],
            &self.value_id[..8.min(self.value_id.len())]
        )
    }
}

/// The shape of data a metric is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDomainType {
    Table,
    Column,
    ColumnPair,
    MultiColumn,
}

impl MetricDomainType {
    /// Domain kwargs that identify a sub-part of the table.
    ///
    /// These keys are accessor kwargs: they are stripped from the compute
    /// domain so that metrics on different columns of one table bundle together.
    pub fn accessor_keys(&self) -> &'static [&'static str] {
        match self {
            MetricDomainType::Table => &[],
            MetricDomainType::Column => &["column"],
            MetricDomainType::ColumnPair => &["column_A", "column_B"],
            MetricDomainType::MultiColumn => &["column_list"],
        }
    }

    /// Checks that the domain carries every key this domain type needs.
    pub fn check_domain(&self, metric_name: &str, domain: &Kwargs) -> Result<()> {
        for key in self.accessor_keys() {
            let present = match domain.get(key) {
                Some(serde_json::Value::String(s)) => !s.is_empty(),
                Some(serde_json::Value::Array(items)) => !items.is_empty(),
                _ => false,
            };
            if !present {
                return Err(TermError::configuration(format!(
                    "metric '{metric_name}' requires domain kwarg '{key}' for a {self} domain"
                )));
            }
        }
        Ok(())
    }

    /// Splits domain kwargs into compute kwargs and accessor kwargs.
    pub fn split_domain_kwargs(&self, domain: &Kwargs) -> (Kwargs, Kwargs) {
        let keys = self.accessor_keys();
        (domain.without(keys), domain.only(keys))
    }
}

impl fmt::Display for MetricDomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricDomainType::Table => "table",
            MetricDomainType::Column => "column",
            MetricDomainType::ColumnPair => "column_pair",
            MetricDomainType::MultiColumn => "multicolumn",
        };
        f.write_str(name)
    }
}

/// One computable statistic: a metric name applied to a domain with parameters.
///
/// Immutable once built; equality and hashing go through [`MetricId`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricConfiguration {
    metric_name: String,
    metric_domain_kwargs: Kwargs,
    metric_value_kwargs: Kwargs,
    #[serde(skip)]
    id: MetricId,
}

impl MetricConfiguration {
    pub fn new(
        metric_name: impl Into<String>,
        metric_domain_kwargs: Kwargs,
        metric_value_kwargs: Kwargs,
    ) -> Self {
        let metric_name = metric_name.into();
        let id = MetricId {
            metric_name: metric_name.clone(),
            domain_id: metric_domain_kwargs.id(),
            value_id: metric_value_kwargs.id(),
        };
        Self {
            metric_name,
            metric_domain_kwargs,
            metric_value_kwargs,
            id,
        }
    }

    /// Shorthand for a metric without value kwargs.
    pub fn with_domain(metric_name: impl Into<String>, metric_domain_kwargs: Kwargs) -> Self {
        Self::new(metric_name, metric_domain_kwargs, Kwargs::new())
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn metric_domain_kwargs(&self) -> &Kwargs {
        &self.metric_domain_kwargs
    }

    pub fn metric_value_kwargs(&self) -> &Kwargs {
        &self.metric_value_kwargs
    }

    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

impl PartialEq for MetricConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MetricConfiguration {}

impl Hash for MetricConfiguration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MetricConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {})",
            self.metric_name,
            self.metric_domain_kwargs.canonical_json(),
            self.metric_value_kwargs.canonical_json()
        )
    }
}
