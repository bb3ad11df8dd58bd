use crate::error::ExceptionInfo;
use crate::metrics::{MetricConfiguration, MetricId, MetricValue};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Resolved values by metric id.
pub type ResolvedMetrics = HashMap<MetricId, MetricValue>;

/// Final state of one metric after resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Resolved(MetricValue),
    Aborted(HashSet<ExceptionInfo>),
}

/// A metric that could not be resolved.
#[derive(Debug, Clone, Serialize)]
pub struct AbortedMetric {
    pub configuration: MetricConfiguration,
    pub exception_info: HashSet<ExceptionInfo>,
    /// Number of graph edges whose dependent is this metric
    pub num_occurrences: usize,
}

/// Every unresolved metric of a run with the distinct failures behind it.
#[derive(Debug, Clone, Default)]
pub struct AbortedMetricInfo {
    metrics: HashMap<MetricId, AbortedMetric>,
}

impl AbortedMetricInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure; repeated identical failures collapse.
    pub fn record(
        &mut self,
        configuration: &MetricConfiguration,
        exception: ExceptionInfo,
        num_occurrences: usize,
    ) {
        self.metrics
            .entry(configuration.id().clone())
            .or_insert_with(|| AbortedMetric {
                configuration: configuration.clone(),
                exception_info: HashSet::new(),
                num_occurrences,
            })
            .exception_info
            .insert(exception);
    }

    /// The failure record of one metric.
    pub fn get(&self, id: &MetricId) -> Option<&AbortedMetric> {
        self.metrics.get(id)
    }

    /// Whether the metric aborted.
    pub fn contains(&self, id: &MetricId) -> bool {
        self.metrics.contains_key(id)
    }

    /// Ids of every aborted metric.
    pub fn ids(&self) -> HashSet<MetricId> {
        self.metrics.keys().cloned().collect()
    }

    /// Aborted metrics in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&MetricId, &AbortedMetric)> {
        self.metrics.iter()
    }

    /// Number of aborted metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// True when every metric resolved.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
