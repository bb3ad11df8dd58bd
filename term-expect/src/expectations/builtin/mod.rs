//! Built-in expectations, one module per expectation kind.

pub mod column;
pub mod column_pair;
pub mod map;
pub mod query;
pub mod table;

pub use column::ColumnAggregateBetween;
pub use column_pair::ExpectColumnPairValuesToBeEqual;
pub use map::ColumnValuesNullness;
pub use query::ExpectQueriedColumnValuesToBeUnique;
pub use table::{ExpectColumnValuesToBeOfType, ExpectTableRowCountToBeBetween};

use super::Expectation;
use std::sync::Arc;

/// Every built-in expectation.
pub fn all() -> Vec<Arc<dyn Expectation>> {
    vec![
        Arc::new(ExpectTableRowCountToBeBetween),
        Arc::new(ExpectColumnValuesToBeOfType),
        Arc::new(ColumnAggregateBetween::mean()),
        Arc::new(ColumnAggregateBetween::stdev()),
        Arc::new(ExpectColumnPairValuesToBeEqual),
        Arc::new(ColumnValuesNullness::null()),
        Arc::new(ColumnValuesNullness::not_null()),
        Arc::new(ExpectQueriedColumnValuesToBeUnique),
    ]
}
