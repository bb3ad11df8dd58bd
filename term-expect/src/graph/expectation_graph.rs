use super::aborted::AbortedMetricInfo;
use super::validation_graph::ValidationGraph;
use crate::error::ExceptionInfo;
use crate::expectations::ExpectationConfiguration;
use std::collections::HashSet;

/// One expectation paired with its own metric sub-graph.
#[derive(Debug, Clone)]
pub struct ExpectationValidationGraph {
    pub configuration: ExpectationConfiguration,
    pub graph: ValidationGraph,
}

impl ExpectationValidationGraph {
    pub fn new(configuration: ExpectationConfiguration, graph: ValidationGraph) -> Self {
        Self {
            configuration,
            graph,
        }
    }

    /// Distinct failures of every aborted metric in this sub-graph.
    pub fn get_exception_info(&self, aborted: &AbortedMetricInfo) -> HashSet<ExceptionInfo> {
        self.graph
            .metric_ids()
            .iter()
            .filter_map(|id| aborted.get(id))
            .flat_map(|metric| metric.exception_info.iter().cloned())
            .collect()
    }
}
