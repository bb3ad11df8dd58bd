//! Prelude for commonly used types and traits in term-expect.

pub use crate::backend::{DataFusionBackend, ExecutionBackend};
pub use crate::config::{
    DataFusionBackendConfig, ResultFormat, ResultFormatKind, RuntimeConfiguration,
};
pub use crate::error::{ExceptionInfo, FailureKind, Result, TermError};
pub use crate::expectations::{
    Expectation, ExpectationConfiguration, ExpectationRegistry, ExpectationValidationResult,
};
pub use crate::logging::LogConfig;
pub use crate::metrics::{Kwargs, MetricConfiguration, MetricValue};
pub use crate::validator::{ExpectationSuiteValidationResult, ValidationStatistics, Validator};
