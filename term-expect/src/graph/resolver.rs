//! Wave-based resolution of a validation graph.
//!
//! Each wave collects the metrics whose dependencies are all settled, plans
//! the backend requests for them and runs those requests. Aggregates that
//! share a compute domain go out as one bundled request; every other metric
//! gets a request of its own. Results are folded into the resolution only
//! after every request of the wave has returned.
//!
//! A request that fails aborts exactly the metrics it was computing. Metrics
//! downstream of an aborted metric are aborted as unresolved dependencies
//! without ever reaching the backend. Only fatal errors end the pass early.

use super::aborted::{AbortedMetricInfo, MetricOutcome, ResolvedMetrics};
use super::validation_graph::ValidationGraph;
use crate::backend::{BundledMetricRequest, ExecutionBackend, MetricFunction, MetricRequest};
use crate::config::RuntimeConfiguration;
use crate::error::{ExceptionInfo, FailureKind, Result, TermError};
use crate::log_metric;
use crate::logging::LogConfig;
use crate::metrics::{MetricConfiguration, MetricId, MetricProvider, MetricProviderRegistry};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Request counters of one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    /// Waves of ready metrics the pass went through.
    pub waves: usize,
    /// Bundled aggregate requests sent to the backend.
    pub bundled_requests: usize,
    /// Single-metric function requests sent to the backend.
    pub single_requests: usize,
}

/// Outcome of resolving a graph: every metric ends up in exactly one of
/// `resolved` or `aborted`.
#[derive(Debug, Clone, Default)]
pub struct GraphResolution {
    /// Values of the metrics that resolved.
    pub resolved: ResolvedMetrics,
    /// Failures of the metrics that did not.
    pub aborted: AbortedMetricInfo,
    pub stats: ResolutionStats,
}

impl GraphResolution {
    /// Outcome of one metric, or `None` when it was not part of the graph.
    pub fn outcome(&self, id: &MetricId) -> Option<MetricOutcome> {
        if let Some(value) = self.resolved.get(id) {
            return Some(MetricOutcome::Resolved(value.clone()));
        }
        self.aborted
            .get(id)
            .map(|metric| MetricOutcome::Aborted(metric.exception_info.clone()))
    }
}

struct Node {
    configuration: MetricConfiguration,
    dependencies: Vec<MetricConfiguration>,
    occurrences: usize,
}

enum PlannedRequest<B: ExecutionBackend> {
    Bundle {
        data: B::Dataset,
        items: Vec<BundledMetricRequest<B::Aggregate>>,
        configurations: Vec<MetricConfiguration>,
    },
    Single {
        function: Arc<dyn MetricFunction<B>>,
        request: MetricRequest<B::Dataset>,
    },
}

struct BundleGroup<B: ExecutionBackend> {
    domain_id: String,
    data: B::Dataset,
    items: Vec<BundledMetricRequest<B::Aggregate>>,
    configurations: Vec<MetricConfiguration>,
}

type Outcomes = Vec<(MetricConfiguration, MetricOutcome)>;

/// Resolves validation graphs against one backend.
#[derive(Debug)]
pub struct GraphResolver<'a, B: ExecutionBackend> {
    backend: &'a B,
    registry: &'a MetricProviderRegistry<B>,
    log_config: LogConfig,
}

impl<'a, B: ExecutionBackend> GraphResolver<'a, B> {
    /// Resolver over `backend` using the providers in `registry`.
    pub fn new(backend: &'a B, registry: &'a MetricProviderRegistry<B>) -> Self {
        Self {
            backend,
            registry,
            log_config: LogConfig::default(),
        }
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Resolves every metric of `graph`.
    ///
    /// Returns `Err` only for fatal errors (see [`TermError::is_fatal`]) and
    /// for graphs whose remaining metrics wait on each other.
    #[instrument(skip_all, fields(backend = self.backend.name(), edges = graph.len()))]
    pub async fn resolve(
        &self,
        graph: &ValidationGraph,
        runtime: &RuntimeConfiguration,
    ) -> Result<GraphResolution> {
        runtime.validate()?;

        let (nodes, mut pending) = collect_nodes(graph);
        let mut resolution = GraphResolution::default();

        loop {
            let mut ready = Vec::new();
            let mut blocked = Vec::new();
            let mut progressed = false;

            for id in pending {
                let node = &nodes[&id];
                let settled = node.dependencies.iter().all(|dependency| {
                    resolution.resolved.contains_key(dependency.id())
                        || resolution.aborted.contains(dependency.id())
                });
                if !settled {
                    blocked.push(id);
                    continue;
                }

                let failed_upstream: Vec<&MetricConfiguration> = node
                    .dependencies
                    .iter()
                    .filter(|dependency| resolution.aborted.contains(dependency.id()))
                    .collect();
                if failed_upstream.is_empty() {
                    ready.push(id);
                } else {
                    for dependency in failed_upstream {
                        self.abort(
                            &mut resolution.aborted,
                            node,
                            unresolved_dependency(node, dependency),
                        );
                    }
                    progressed = true;
                }
            }
            pending = blocked;

            if !ready.is_empty() {
                resolution.stats.waves += 1;
                self.run_wave(&nodes, &ready, runtime, &mut resolution).await?;
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        if !pending.is_empty() {
            self.settle_leftovers(&nodes, pending, &mut resolution)?;
        }

        info!(
            resolved = resolution.resolved.len(),
            aborted = resolution.aborted.len(),
            waves = resolution.stats.waves,
            bundled_requests = resolution.stats.bundled_requests,
            single_requests = resolution.stats.single_requests,
            "Resolved validation graph"
        );
        Ok(resolution)
    }

    /// Metrics left waiting at the fixpoint.
    ///
    /// They are aborted when an upstream metric aborted; otherwise they can
    /// only be waiting on each other.
    fn settle_leftovers(
        &self,
        nodes: &HashMap<MetricId, Node>,
        pending: Vec<MetricId>,
        resolution: &mut GraphResolution,
    ) -> Result<()> {
        let stuck: Vec<&str> = pending
            .iter()
            .filter(|id| {
                !nodes[*id]
                    .dependencies
                    .iter()
                    .any(|dependency| resolution.aborted.contains(dependency.id()))
            })
            .map(|id| id.metric_name.as_str())
            .collect();
        if !stuck.is_empty() {
            let err = TermError::DependencyCycle(format!(
                "metrics wait on each other: {}",
                stuck.join(", ")
            ));
            error!(error = %err, "Validation graph cannot be resolved");
            return Err(err);
        }

        for id in pending {
            let node = &nodes[&id];
            let failed_upstream: Vec<&MetricConfiguration> = node
                .dependencies
                .iter()
                .filter(|dependency| resolution.aborted.contains(dependency.id()))
                .collect();
            for dependency in failed_upstream {
                let info = unresolved_dependency(node, dependency);
                self.abort(&mut resolution.aborted, node, info);
            }
        }
        Ok(())
    }

    async fn run_wave(
        &self,
        nodes: &HashMap<MetricId, Node>,
        ready: &[MetricId],
        runtime: &RuntimeConfiguration,
        resolution: &mut GraphResolution,
    ) -> Result<()> {
        let requests = self.plan_wave(nodes, ready, runtime, resolution).await?;
        debug!(
            metrics = ready.len(),
            requests = requests.len(),
            "Running resolution wave"
        );

        for request in &requests {
            match request {
                PlannedRequest::Bundle { .. } => resolution.stats.bundled_requests += 1,
                PlannedRequest::Single { .. } => resolution.stats.single_requests += 1,
            }
        }

        let results = if runtime.concurrent_requests {
            join_all(requests.into_iter().map(|request| self.execute(request))).await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.execute(request).await);
            }
            results
        };

        for result in results {
            let outcomes = result.inspect_err(|e| {
                error!(error = %e, "Fatal error while resolving metrics");
            })?;
            for (configuration, outcome) in outcomes {
                match outcome {
                    MetricOutcome::Resolved(value) => {
                        log_metric!(
                            self.log_config,
                            metric.name = %configuration.metric_name(),
                            metric.value = %value,
                            "Resolved metric"
                        );
                        resolution.resolved.insert(configuration.id().clone(), value);
                    }
                    MetricOutcome::Aborted(exceptions) => {
                        let node = &nodes[configuration.id()];
                        for exception in exceptions {
                            self.abort(&mut resolution.aborted, node, exception);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Turns ready metrics into backend requests.
    ///
    /// Metrics whose domain cannot be built are aborted here and never
    /// reach the backend.
    async fn plan_wave(
        &self,
        nodes: &HashMap<MetricId, Node>,
        ready: &[MetricId],
        runtime: &RuntimeConfiguration,
        resolution: &mut GraphResolution,
    ) -> Result<Vec<PlannedRequest<B>>> {
        let mut groups: Vec<BundleGroup<B>> = Vec::new();
        let mut open_groups: HashMap<String, usize> = HashMap::new();
        let mut singles = Vec::new();

        for id in ready {
            let node = &nodes[id];
            let configuration = &node.configuration;

            let registration = match self.registry.get(configuration.metric_name()) {
                Ok(registration) => registration,
                Err(e) => {
                    self.abort_with_error(&mut resolution.aborted, node, &e);
                    continue;
                }
            };

            let domain = match self
                .backend
                .get_compute_domain(
                    configuration.metric_domain_kwargs(),
                    registration.domain_type,
                )
                .await
            {
                Ok(domain) => domain,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.abort_with_error(&mut resolution.aborted, node, &e);
                    continue;
                }
            };

            match &registration.provider {
                MetricProvider::Aggregate(aggregate) => {
                    let domain_id = domain.id();
                    let item = BundledMetricRequest {
                        metric_id: configuration.id().clone(),
                        aggregate: aggregate.clone(),
                        accessor_kwargs: domain.accessor_kwargs,
                        value_kwargs: configuration.metric_value_kwargs().clone(),
                    };
                    let open = if runtime.bundling {
                        open_groups.get(&domain_id).copied()
                    } else {
                        None
                    };
                    let index = match open {
                        Some(index) => index,
                        None => {
                            groups.push(BundleGroup {
                                domain_id: domain_id.clone(),
                                data: domain.data,
                                items: Vec::new(),
                                configurations: Vec::new(),
                            });
                            open_groups.insert(domain_id, groups.len() - 1);
                            groups.len() - 1
                        }
                    };
                    let group = &mut groups[index];
                    group.items.push(item);
                    group.configurations.push(configuration.clone());
                    if group.items.len() >= runtime.max_bundle_size {
                        open_groups.remove(&group.domain_id);
                    }
                }
                MetricProvider::Function(function) => {
                    let mut dependencies = HashMap::new();
                    for declared in &registration.dependencies {
                        let upstream = declared.configure(configuration);
                        if let Some(value) = resolution.resolved.get(upstream.id()) {
                            dependencies.insert(declared.key.clone(), value.clone());
                        }
                    }
                    singles.push(PlannedRequest::Single {
                        function: Arc::clone(function),
                        request: MetricRequest {
                            configuration: configuration.clone(),
                            domain,
                            dependencies,
                        },
                    });
                }
            }
        }

        let mut requests: Vec<PlannedRequest<B>> = groups
            .into_iter()
            .map(|group| PlannedRequest::Bundle {
                data: group.data,
                items: group.items,
                configurations: group.configurations,
            })
            .collect();
        requests.extend(singles);
        Ok(requests)
    }

    async fn execute(&self, request: PlannedRequest<B>) -> Result<Outcomes> {
        match request {
            PlannedRequest::Bundle {
                data,
                items,
                configurations,
            } => {
                debug!(bundle.size = items.len(), "Resolving metric bundle");
                match self.backend.resolve_metric_bundle(&data, &items).await {
                    Ok(mut values) => Ok(configurations
                        .into_iter()
                        .map(|configuration| {
                            let outcome = match values.remove(configuration.id()) {
                                Some(value) => MetricOutcome::Resolved(value),
                                None => failed(&TermError::metric_resolution(
                                    configuration.metric_name(),
                                    "bundle returned no value for this metric",
                                )),
                            };
                            (configuration, outcome)
                        })
                        .collect()),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        debug!(bundle.size = items.len(), error = %e, "Metric bundle failed");
                        Ok(configurations
                            .into_iter()
                            .map(|configuration| (configuration, failed(&e)))
                            .collect())
                    }
                }
            }
            PlannedRequest::Single { function, request } => {
                let outcome = match self.backend.resolve_metric(function.as_ref(), &request).await
                {
                    Ok(value) => MetricOutcome::Resolved(value),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => failed(&e),
                };
                Ok(vec![(request.configuration, outcome)])
            }
        }
    }

    fn abort(&self, aborted: &mut AbortedMetricInfo, node: &Node, exception: ExceptionInfo) {
        log_metric!(
            self.log_config,
            metric.name = %node.configuration.metric_name(),
            failure = %exception,
            "Aborted metric"
        );
        aborted.record(&node.configuration, exception, node.occurrences);
    }

    fn abort_with_error(&self, aborted: &mut AbortedMetricInfo, node: &Node, error: &TermError) {
        self.abort(
            aborted,
            node,
            ExceptionInfo::from_error(error, FailureKind::Computation),
        );
    }
}

fn failed(error: &TermError) -> MetricOutcome {
    MetricOutcome::Aborted(HashSet::from([ExceptionInfo::from_error(
        error,
        FailureKind::Computation,
    )]))
}

fn unresolved_dependency(node: &Node, dependency: &MetricConfiguration) -> ExceptionInfo {
    ExceptionInfo::new(
        format!(
            "Metric '{}' depends on '{}', which could not be resolved",
            node.configuration.metric_name(),
            dependency.metric_name()
        ),
        FailureKind::DependencyUnresolved,
    )
}

/// Node table in edge insertion order, plus the initial pending list.
fn collect_nodes(graph: &ValidationGraph) -> (HashMap<MetricId, Node>, Vec<MetricId>) {
    let mut nodes: HashMap<MetricId, Node> = HashMap::new();
    let mut order = Vec::new();

    let mut ensure = |configuration: &MetricConfiguration, nodes: &mut HashMap<MetricId, Node>| {
        nodes
            .entry(configuration.id().clone())
            .or_insert_with(|| {
                order.push(configuration.id().clone());
                Node {
                    configuration: configuration.clone(),
                    dependencies: Vec::new(),
                    occurrences: 0,
                }
            });
    };

    for edge in graph.edges() {
        ensure(&edge.dependent, &mut nodes);
        if let Some(dependency) = &edge.dependency {
            ensure(dependency, &mut nodes);
        }
        if let Some(node) = nodes.get_mut(edge.dependent.id()) {
            node.occurrences += 1;
            if let Some(dependency) = &edge.dependency {
                if !node.dependencies.iter().any(|d| d.id() == dependency.id()) {
                    node.dependencies.push(dependency.clone());
                }
            }
        }
    }

    (nodes, order)
}
