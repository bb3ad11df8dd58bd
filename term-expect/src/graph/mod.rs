//! Metric dependency graphs: construction, merging and resolution.

mod aborted;
mod builder;
mod expectation_graph;
mod resolver;
mod validation_graph;

pub use aborted::{AbortedMetric, AbortedMetricInfo, MetricOutcome, ResolvedMetrics};
pub use builder::DependencyGraphBuilder;
pub use expectation_graph::ExpectationValidationGraph;
pub use resolver::{GraphResolution, GraphResolver, ResolutionStats};
pub use validation_graph::{MetricEdge, ValidationGraph};
