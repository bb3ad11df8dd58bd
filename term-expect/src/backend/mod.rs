//! Execution backends.
//!
//! The engine never touches data itself. It asks an [`ExecutionBackend`] to
//! turn domain kwargs into a dataset handle, then to compute metrics on it
//! either in bundles (aggregates sharing one compute domain, computed in a
//! single pass) or one at a time (everything else).
//!
//! A backend reports per-request failures as ordinary [`TermError`]s, which
//! the resolver pins on the metrics of that request. Errors for which
//! [`TermError::is_fatal`] holds end the resolution pass instead.
//!
//! [`TermError`]: crate::error::TermError
//! [`TermError::is_fatal`]: crate::error::TermError::is_fatal

pub mod datafusion;

mod convert;
mod providers;

use crate::error::{Result, TermError};
use crate::metrics::{Kwargs, MetricConfiguration, MetricDomainType, MetricId, MetricValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub use self::datafusion::{BackendStats, DataFusionBackend, SqlAggregate, SqlDomain};

/// A dataset handle plus the kwargs that produced it.
#[derive(Debug, Clone)]
pub struct ComputeDomain<D> {
    /// Backend-native handle to the rows the metric covers
    pub data: D,
    /// Kwargs defining the rows; metrics with equal compute kwargs bundle together
    pub compute_kwargs: Kwargs,
    /// Kwargs selecting a part of those rows, such as a column
    pub accessor_kwargs: Kwargs,
}

impl<D> ComputeDomain<D> {
    /// Grouping key for bundling.
    pub fn id(&self) -> String {
        self.compute_kwargs.id()
    }
}

/// One aggregate inside a bundled request.
#[derive(Debug, Clone)]
pub struct BundledMetricRequest<A> {
    pub metric_id: MetricId,
    pub aggregate: A,
    pub accessor_kwargs: Kwargs,
    pub value_kwargs: Kwargs,
}

/// Everything a non-bundlable metric needs to compute its value.
#[derive(Debug, Clone)]
pub struct MetricRequest<D> {
    pub configuration: MetricConfiguration,
    pub domain: ComputeDomain<D>,
    /// Resolved upstream values, keyed by the dependency key the provider declared
    pub dependencies: HashMap<String, MetricValue>,
}

impl<D> MetricRequest<D> {
    /// Returns a resolved dependency by its declared key.
    pub fn dependency(&self, key: &str) -> Result<&MetricValue> {
        self.dependencies.get(key).ok_or_else(|| {
            TermError::metric_resolution(
                self.configuration.metric_name(),
                format!("dependency '{key}' was not provided"),
            )
        })
    }

    /// Returns the `column` accessor kwarg.
    pub fn column(&self) -> Result<&str> {
        self.domain.accessor_kwargs.require_str("column")
    }
}

/// A metric computed on its own rather than inside a bundle.
#[async_trait]
pub trait MetricFunction<B: ExecutionBackend>: Send + Sync + fmt::Debug {
    async fn compute(&self, backend: &B, request: &MetricRequest<B::Dataset>)
        -> Result<MetricValue>;
}

/// Computation engine the resolver runs metrics against.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + fmt::Debug + Sized + 'static {
    /// Handle to the rows of one compute domain.
    type Dataset: Clone + Send + Sync + fmt::Debug;
    /// A bundlable single-pass aggregate.
    type Aggregate: Clone + Send + Sync + fmt::Debug;

    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Resolves domain kwargs into a dataset handle.
    ///
    /// Implementations split off the accessor kwargs of `domain_type` and
    /// fail if the domain refers to data that does not exist.
    async fn get_compute_domain(
        &self,
        domain_kwargs: &Kwargs,
        domain_type: MetricDomainType,
    ) -> Result<ComputeDomain<Self::Dataset>>;

    /// Computes several aggregates over one dataset in a single pass.
    ///
    /// Fails as a whole: an error means none of the requested ids resolved.
    async fn resolve_metric_bundle(
        &self,
        data: &Self::Dataset,
        requests: &[BundledMetricRequest<Self::Aggregate>],
    ) -> Result<HashMap<MetricId, MetricValue>>;

    /// Computes one non-bundlable metric.
    async fn resolve_metric(
        &self,
        function: &dyn MetricFunction<Self>,
        request: &MetricRequest<Self::Dataset>,
    ) -> Result<MetricValue> {
        function.compute(self, request).await
    }
}
