use crate::metrics::{MetricConfiguration, MetricId};
use std::collections::HashSet;
use std::fmt;

/// A dependency edge. `dependency == None` marks a metric with no upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricEdge {
    pub dependent: MetricConfiguration,
    pub dependency: Option<MetricConfiguration>,
}

impl MetricEdge {
    pub fn leaf(dependent: MetricConfiguration) -> Self {
        Self {
            dependent,
            dependency: None,
        }
    }

    pub fn new(dependent: MetricConfiguration, dependency: MetricConfiguration) -> Self {
        Self {
            dependent,
            dependency: Some(dependency),
        }
    }

    fn key(&self) -> (MetricId, Option<MetricId>) {
        (
            self.dependent.id().clone(),
            self.dependency.as_ref().map(|d| d.id().clone()),
        )
    }
}

impl fmt::Display for MetricEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dependency {
            Some(dependency) => write!(f, "{} -> {}", self.dependent.id(), dependency.id()),
            None => write!(f, "{} -> (leaf)", self.dependent.id()),
        }
    }
}

/// De-duplicated, insertion-ordered set of metric edges.
#[derive(Debug, Clone, Default)]
pub struct ValidationGraph {
    edges: Vec<MetricEdge>,
    seen: HashSet<(MetricId, Option<MetricId>)>,
}

impl ValidationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge, returning false if it was already present.
    pub fn add(&mut self, edge: MetricEdge) -> bool {
        if self.seen.insert(edge.key()) {
            self.edges.push(edge);
            true
        } else {
            false
        }
    }

    /// Adds every edge of `other`.
    pub fn extend(&mut self, other: &ValidationGraph) {
        for edge in &other.edges {
            self.add(edge.clone());
        }
    }

    /// Unions several graphs into one; duplicate edges collapse.
    pub fn merge<'a>(graphs: impl IntoIterator<Item = &'a ValidationGraph>) -> ValidationGraph {
        let mut merged = ValidationGraph::new();
        for graph in graphs {
            merged.extend(graph);
        }
        merged
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[MetricEdge] {
        &self.edges
    }

    /// Number of distinct edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True when the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether an edge with the same endpoints is present.
    pub fn contains_edge(&self, edge: &MetricEdge) -> bool {
        self.seen.contains(&edge.key())
    }

    /// Ids of every metric appearing on either side of an edge.
    pub fn metric_ids(&self) -> HashSet<MetricId> {
        let mut ids = HashSet::new();
        for edge in &self.edges {
            ids.insert(edge.dependent.id().clone());
            if let Some(dependency) = &edge.dependency {
                ids.insert(dependency.id().clone());
            }
        }
        ids
    }

    /// The edge set, for order-independent comparisons.
    pub fn edge_set(&self) -> HashSet<(MetricId, Option<MetricId>)> {
        self.seen.clone()
    }
}
