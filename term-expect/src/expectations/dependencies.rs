use crate::config::ResultFormat;
use crate::metrics::MetricConfiguration;
use std::collections::BTreeMap;

/// The metrics one expectation needs, keyed by names local to it.
#[derive(Debug, Clone, Default)]
pub struct ValidationDependencies {
    metric_configurations: BTreeMap<String, MetricConfiguration>,
    result_format: ResultFormat,
}

impl ValidationDependencies {
    pub fn new(result_format: ResultFormat) -> Self {
        Self {
            metric_configurations: BTreeMap::new(),
            result_format,
        }
    }

    /// Declares (or replaces) the metric behind `metric_name`.
    pub fn set_metric_configuration(
        &mut self,
        metric_name: impl Into<String>,
        configuration: MetricConfiguration,
    ) {
        self.metric_configurations
            .insert(metric_name.into(), configuration);
    }

    pub fn get_metric_configuration(&self, metric_name: &str) -> Option<&MetricConfiguration> {
        self.metric_configurations.get(metric_name)
    }

    pub fn remove_metric_configuration(
        &mut self,
        metric_name: &str,
    ) -> Option<MetricConfiguration> {
        self.metric_configurations.remove(metric_name)
    }

    pub fn get_metric_names(&self) -> Vec<&str> {
        self.metric_configurations.keys().map(String::as_str).collect()
    }

    pub fn get_metric_configurations(&self) -> Vec<MetricConfiguration> {
        self.metric_configurations.values().cloned().collect()
    }

    pub fn result_format(&self) -> &ResultFormat {
        &self.result_format
    }

    pub fn is_empty(&self) -> bool {
        self.metric_configurations.is_empty()
    }
}
