//! Runtime configuration for validation runs and backends.

use crate::error::{Result, TermError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of unexpected values reported by partial listings.
pub const DEFAULT_PARTIAL_UNEXPECTED_COUNT: usize = 20;

/// How much detail each expectation result carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultFormatKind {
    /// Only `success`; the result payload stays empty.
    BooleanOnly,
    /// Observed value, counts and a partial list of unexpected values.
    #[default]
    Basic,
    /// `Basic` plus per-value counts of the partial unexpected list.
    Summary,
    /// `Summary` plus the full list of unexpected values.
    Complete,
}

impl fmt::Display for ResultFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultFormatKind::BooleanOnly => "BOOLEAN_ONLY",
            ResultFormatKind::Basic => "BASIC",
            ResultFormatKind::Summary => "SUMMARY",
            ResultFormatKind::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

impl FromStr for ResultFormatKind {
    type Err = TermError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOOLEAN_ONLY" => Ok(ResultFormatKind::BooleanOnly),
            "BASIC" => Ok(ResultFormatKind::Basic),
            "SUMMARY" => Ok(ResultFormatKind::Summary),
            "COMPLETE" => Ok(ResultFormatKind::Complete),
            other => Err(TermError::configuration(format!(
                "unknown result_format '{other}'"
            ))),
        }
    }
}

/// Result format with its partial listing size.
///
/// Deserializes either from a bare string (`"SUMMARY"`) or from an object
/// (`{"result_format": "COMPLETE", "partial_unexpected_count": 5}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawResultFormat")]
pub struct ResultFormat {
    pub result_format: ResultFormatKind,
    pub partial_unexpected_count: usize,
}

impl Default for ResultFormat {
    fn default() -> Self {
        Self::new(ResultFormatKind::default())
    }
}

impl ResultFormat {
    /// Creates a format with the default partial listing size.
    pub fn new(result_format: ResultFormatKind) -> Self {
        Self {
            result_format,
            partial_unexpected_count: DEFAULT_PARTIAL_UNEXPECTED_COUNT,
        }
    }

    /// Sets the partial listing size.
    pub fn with_partial_unexpected_count(mut self, count: usize) -> Self {
        self.partial_unexpected_count = count;
        self
    }

    /// Returns true when results carry no payload at all.
    pub fn is_boolean_only(&self) -> bool {
        self.result_format == ResultFormatKind::BooleanOnly
    }

    /// Returns true when the full unexpected list is requested.
    pub fn is_complete(&self) -> bool {
        self.result_format == ResultFormatKind::Complete
    }

    /// Number of unexpected values to fetch, `None` meaning all of them.
    pub fn unexpected_fetch_limit(&self) -> Option<usize> {
        if self.is_complete() {
            None
        } else {
            Some(self.partial_unexpected_count)
        }
    }
}

impl FromStr for ResultFormat {
    type Err = TermError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::new(s.parse()?))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResultFormat {
    Kind(ResultFormatKind),
    Full {
        result_format: ResultFormatKind,
        #[serde(default = "default_partial_unexpected_count")]
        partial_unexpected_count: usize,
    },
}

fn default_partial_unexpected_count() -> usize {
    DEFAULT_PARTIAL_UNEXPECTED_COUNT
}

impl From<RawResultFormat> for ResultFormat {
    fn from(raw: RawResultFormat) -> Self {
        match raw {
            RawResultFormat::Kind(kind) => ResultFormat::new(kind),
            RawResultFormat::Full {
                result_format,
                partial_unexpected_count,
            } => ResultFormat {
                result_format,
                partial_unexpected_count,
            },
        }
    }
}

/// Options recognized by a single validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfiguration {
    /// Convert configuration and general errors into failed results
    pub catch_exceptions: bool,
    /// Detail level of each result
    pub result_format: ResultFormat,
    /// Combine aggregate metrics sharing a compute domain into one request
    pub bundling: bool,
    /// Largest number of metrics in one bundled request
    pub max_bundle_size: usize,
    /// Deepest metric dependency chain the graph builder will follow
    pub max_dependency_depth: usize,
    /// Issue the requests of one resolution wave together
    pub concurrent_requests: bool,
    /// Keep only unsuccessful results in a suite result; statistics still
    /// count every expectation
    pub only_return_failures: bool,
}

impl Default for RuntimeConfiguration {
    fn default() -> Self {
        Self {
            catch_exceptions: true,
            result_format: ResultFormat::default(),
            bundling: true,
            max_bundle_size: 64,
            max_dependency_depth: 32,
            concurrent_requests: false,
            only_return_failures: false,
        }
    }
}

impl RuntimeConfiguration {
    /// Propagate every configuration and general error instead of reporting it.
    pub fn strict() -> Self {
        Self {
            catch_exceptions: false,
            ..Self::default()
        }
    }

    pub fn with_catch_exceptions(mut self, enabled: bool) -> Self {
        self.catch_exceptions = enabled;
        self
    }

    pub fn with_result_format(mut self, result_format: ResultFormat) -> Self {
        self.result_format = result_format;
        self
    }

    pub fn with_bundling(mut self, enabled: bool) -> Self {
        self.bundling = enabled;
        self
    }

    pub fn with_max_bundle_size(mut self, size: usize) -> Self {
        self.max_bundle_size = size;
        self
    }

    pub fn with_max_dependency_depth(mut self, depth: usize) -> Self {
        self.max_dependency_depth = depth;
        self
    }

    pub fn with_concurrent_requests(mut self, enabled: bool) -> Self {
        self.concurrent_requests = enabled;
        self
    }

    pub fn with_only_return_failures(mut self, enabled: bool) -> Self {
        self.only_return_failures = enabled;
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_bundle_size == 0 {
            return Err(TermError::configuration(
                "max_bundle_size must be at least 1",
            ));
        }
        if self.max_dependency_depth == 0 {
            return Err(TermError::configuration(
                "max_dependency_depth must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for a [`DataFusionBackend`](crate::backend::datafusion::DataFusionBackend).
#[derive(Debug, Clone)]
pub struct DataFusionBackendConfig {
    /// Table used when the domain kwargs name no batch
    pub table_name: String,
    /// Batch size for query execution
    pub batch_size: usize,
    /// Target number of partitions for parallel execution
    pub target_partitions: usize,
}

impl Default for DataFusionBackendConfig {
    fn default() -> Self {
        Self {
            table_name: "data".to_string(),
            batch_size: 8192,
            target_partitions: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4),
        }
    }
}
