//! # term-expect - Expectation-based data validation
//!
//! term-expect validates tabular data against declared *expectations* such
//! as "the mean of `amount` is between 0 and 100" or "`email` is never null".
//! Expectations never touch data themselves. Each one declares the
//! statistics (*metrics*) it needs; the engine expands those into a metric
//! dependency graph, merges the graphs of a whole suite, and computes every
//! metric once against an execution backend. Aggregates over the same rows
//! are bundled into one query.
//!
//! ## Quick Start
//!
//! ```rust
//! use arrow::array::Float64Array;
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//! use term_expect::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, true)]));
//! let batch = RecordBatch::try_new(
//!     schema,
//!     vec![Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0]))],
//! )?;
//!
//! let backend = Arc::new(DataFusionBackend::new());
//! backend.register_batch("data", batch)?;
//!
//! let suite = Validator::datafusion(backend)
//!     .validate(
//!         &[ExpectationConfiguration::new("expect_column_mean_to_be_between")
//!             .with_kwarg("column", "x")
//!             .with_kwarg("min_value", 1)
//!             .with_kwarg("max_value", 3)],
//!         &RuntimeConfiguration::default(),
//!     )
//!     .await?;
//!
//! assert!(suite.success);
//! assert_eq!(suite.results[0].result.observed_value(), Some(&serde_json::json!(2.0)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure handling
//!
//! A metric that cannot be computed (a missing column, a failing query) is
//! *aborted*. Every expectation that needed it gets a failed result carrying
//! the error in `exception_info`; the rest of the suite is unaffected.
//! Configuration and validation errors behave the same way while
//! [`RuntimeConfiguration::catch_exceptions`](config::RuntimeConfiguration)
//! is on, and are returned as `Err` otherwise.
//!
//! ## Modules
//!
//! - [`metrics`]: metric identity, values and provider registries
//! - [`graph`]: dependency graph construction and wave-based resolution
//! - [`backend`]: the [`ExecutionBackend`](backend::ExecutionBackend) trait
//!   and the DataFusion backend
//! - [`expectations`]: the expectation trait, built-ins and result types
//! - [`validator`]: suite validation and statistics

pub mod backend;
pub mod config;
pub mod error;
pub mod expectations;
pub mod graph;
pub mod logging;
pub mod metrics;
pub mod prelude;
pub mod security;
pub mod validator;

#[cfg(test)]
mod test_helpers;
