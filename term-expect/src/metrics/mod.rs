//! Metric identity, values and providers.

mod configuration;
mod kwargs;
mod registry;
mod value;

pub use configuration::{MetricConfiguration, MetricDomainType, MetricId};
pub use kwargs::Kwargs;
pub use registry::{
    DependencyDomain, MetricDependency, MetricProvider, MetricProviderRegistry,
    MetricRegistration,
};
pub use value::MetricValue;
