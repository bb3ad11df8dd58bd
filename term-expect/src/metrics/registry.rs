//! Explicit registry of metric providers.
//!
//! A registry is built once (usually via the backend's `default_registry`)
//! and shared as `Arc` by the graph builder and the resolver.

use super::configuration::{MetricConfiguration, MetricDomainType};
use super::kwargs::Kwargs;
use crate::backend::{ExecutionBackend, MetricFunction};
use crate::error::{Result, TermError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// How a metric is computed.
pub enum MetricProvider<B: ExecutionBackend> {
    /// Single-pass aggregate, eligible for bundling.
    Aggregate(B::Aggregate),
    /// Computed on its own, with access to its resolved dependencies.
    Function(Arc<dyn MetricFunction<B>>),
}

impl<B: ExecutionBackend> MetricProvider<B> {
    pub fn is_bundlable(&self) -> bool {
        matches!(self, MetricProvider::Aggregate(_))
    }
}

impl<B: ExecutionBackend> Clone for MetricProvider<B> {
    fn clone(&self) -> Self {
        match self {
            MetricProvider::Aggregate(aggregate) => MetricProvider::Aggregate(aggregate.clone()),
            MetricProvider::Function(function) => MetricProvider::Function(Arc::clone(function)),
        }
    }
}

impl<B: ExecutionBackend> fmt::Debug for MetricProvider<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricProvider::Aggregate(aggregate) => {
                f.debug_tuple("Aggregate").field(aggregate).finish()
            }
            MetricProvider::Function(function) => {
                f.debug_tuple("Function").field(function).finish()
            }
        }
    }
}

/// Domain a dependency is computed over, relative to its dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyDomain {
    /// The dependent's domain kwargs, unchanged.
    Inherit,
    /// The dependent's domain without its column accessor kwargs.
    Table,
}

/// A declared upstream metric.
#[derive(Debug, Clone)]
pub struct MetricDependency {
    /// Name the provider looks the resolved value up by
    pub key: String,
    pub metric_name: String,
    pub domain: DependencyDomain,
    pub value_kwargs: Kwargs,
    /// Merge the dependent's value kwargs under `value_kwargs`
    pub inherit_value_kwargs: bool,
}

impl MetricDependency {
    /// A dependency on the same domain as the dependent.
    pub fn same_domain(metric_name: impl Into<String>) -> Self {
        let metric_name = metric_name.into();
        Self {
            key: metric_name.clone(),
            metric_name,
            domain: DependencyDomain::Inherit,
            value_kwargs: Kwargs::new(),
            inherit_value_kwargs: false,
        }
    }

    /// A dependency on the whole table of the dependent.
    pub fn table(metric_name: impl Into<String>) -> Self {
        Self {
            domain: DependencyDomain::Table,
            ..Self::same_domain(metric_name)
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value_kwargs(mut self, value_kwargs: Kwargs) -> Self {
        self.value_kwargs = value_kwargs;
        self
    }

    pub fn inheriting_value_kwargs(mut self) -> Self {
        self.inherit_value_kwargs = true;
        self
    }

    /// Builds the concrete dependency configuration for `dependent`.
    pub fn configure(&self, dependent: &MetricConfiguration) -> MetricConfiguration {
        let domain = match self.domain {
            DependencyDomain::Inherit => dependent.metric_domain_kwargs().clone(),
            DependencyDomain::Table => dependent.metric_domain_kwargs().without(&[
                "column",
                "column_A",
                "column_B",
                "column_list",
            ]),
        };
        let value_kwargs = if self.inherit_value_kwargs {
            dependent.metric_value_kwargs().merged(&self.value_kwargs)
        } else {
            self.value_kwargs.clone()
        };
        MetricConfiguration::new(self.metric_name.clone(), domain, value_kwargs)
    }
}

/// A metric name bound to its provider and declared dependencies.
#[derive(Debug)]
pub struct MetricRegistration<B: ExecutionBackend> {
    pub metric_name: String,
    pub domain_type: MetricDomainType,
    pub provider: MetricProvider<B>,
    pub dependencies: Vec<MetricDependency>,
}

impl<B: ExecutionBackend> Clone for MetricRegistration<B> {
    fn clone(&self) -> Self {
        Self {
            metric_name: self.metric_name.clone(),
            domain_type: self.domain_type,
            provider: self.provider.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

/// Metric name to provider mapping for one backend type.
#[derive(Debug)]
pub struct MetricProviderRegistry<B: ExecutionBackend> {
    providers: HashMap<String, MetricRegistration<B>>,
}

impl<B: ExecutionBackend> Default for MetricProviderRegistry<B> {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }
}

impl<B: ExecutionBackend> MetricProviderRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, replacing any earlier one under the same name.
    pub fn register(
        &mut self,
        metric_name: impl Into<String>,
        domain_type: MetricDomainType,
        provider: MetricProvider<B>,
        dependencies: Vec<MetricDependency>,
    ) -> &mut Self {
        let metric_name = metric_name.into();
        let registration = MetricRegistration {
            metric_name: metric_name.clone(),
            domain_type,
            provider,
            dependencies,
        };
        if self.providers.insert(metric_name.clone(), registration).is_some() {
            warn!(metric.name = %metric_name, "Replacing existing metric provider");
        }
        self
    }

    pub fn register_aggregate(
        &mut self,
        metric_name: impl Into<String>,
        domain_type: MetricDomainType,
        aggregate: B::Aggregate,
    ) -> &mut Self {
        self.register(
            metric_name,
            domain_type,
            MetricProvider::Aggregate(aggregate),
            Vec::new(),
        )
    }

    pub fn register_function(
        &mut self,
        metric_name: impl Into<String>,
        domain_type: MetricDomainType,
        function: Arc<dyn MetricFunction<B>>,
        dependencies: Vec<MetricDependency>,
    ) -> &mut Self {
        self.register(
            metric_name,
            domain_type,
            MetricProvider::Function(function),
            dependencies,
        )
    }

    /// Looks up a provider by metric name.
    pub fn get(&self, metric_name: &str) -> Result<&MetricRegistration<B>> {
        self.providers.get(metric_name).ok_or_else(|| {
            TermError::configuration(format!(
                "no provider registered for metric '{metric_name}'"
            ))
        })
    }

    pub fn contains(&self, metric_name: &str) -> bool {
        self.providers.contains_key(metric_name)
    }

    /// Registered metric names, sorted.
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
