use super::validation_graph::{MetricEdge, ValidationGraph};
use crate::backend::ExecutionBackend;
use crate::config::RuntimeConfiguration;
use crate::error::{Result, TermError};
use crate::metrics::{MetricConfiguration, MetricId, MetricProviderRegistry};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Expands requested metrics into their full dependency closure.
#[derive(Debug)]
pub struct DependencyGraphBuilder<'a, B: ExecutionBackend> {
    registry: &'a MetricProviderRegistry<B>,
}

struct Expansion {
    graph: ValidationGraph,
    expanded: HashSet<MetricId>,
    path: Vec<MetricConfiguration>,
    max_depth: usize,
}

impl<'a, B: ExecutionBackend> DependencyGraphBuilder<'a, B> {
    pub fn new(registry: &'a MetricProviderRegistry<B>) -> Self {
        Self { registry }
    }

    /// Builds the graph for `requested`.
    ///
    /// Every metric of the closure appears as a dependent: metrics without
    /// dependencies get a leaf edge, every declared dependency gets one
    /// dependent-to-dependency edge.
    #[instrument(skip_all, fields(requested = requested.len()))]
    pub fn build(
        &self,
        requested: &[MetricConfiguration],
        runtime: &RuntimeConfiguration,
    ) -> Result<ValidationGraph> {
        if requested.is_empty() {
            return Err(TermError::configuration(
                "cannot build a validation graph without requested metrics",
            ));
        }

        let mut expansion = Expansion {
            graph: ValidationGraph::new(),
            expanded: HashSet::new(),
            path: Vec::new(),
            max_depth: runtime.max_dependency_depth,
        };
        for metric in requested {
            self.expand(metric, &mut expansion)?;
        }

        debug!(
            edges = expansion.graph.len(),
            metrics = expansion.expanded.len(),
            "Built validation graph"
        );
        Ok(expansion.graph)
    }

    fn expand(&self, metric: &MetricConfiguration, expansion: &mut Expansion) -> Result<()> {
        if expansion.path.iter().any(|m| m.id() == metric.id()) {
            let cycle: Vec<&str> = expansion
                .path
                .iter()
                .map(|m| m.metric_name())
                .chain(std::iter::once(metric.metric_name()))
                .collect();
            return Err(TermError::DependencyCycle(cycle.join(" -> ")));
        }
        if expansion.path.len() >= expansion.max_depth {
            return Err(TermError::DependencyCycle(format!(
                "expansion of '{}' exceeds the maximum dependency depth of {}",
                metric.metric_name(),
                expansion.max_depth
            )));
        }
        if expansion.expanded.contains(metric.id()) {
            return Ok(());
        }

        let registration = self.registry.get(metric.metric_name())?;
        registration
            .domain_type
            .check_domain(metric.metric_name(), metric.metric_domain_kwargs())?;

        if registration.dependencies.is_empty() {
            expansion.graph.add(MetricEdge::leaf(metric.clone()));
        } else {
            expansion.path.push(metric.clone());
            for dependency in &registration.dependencies {
                let upstream = dependency.configure(metric);
                expansion
                    .graph
                    .add(MetricEdge::new(metric.clone(), upstream.clone()));
                self.expand(&upstream, expansion)?;
            }
            expansion.path.pop();
        }

        expansion.expanded.insert(metric.id().clone());
        Ok(())
    }
}
