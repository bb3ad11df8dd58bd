//! Arrow cells to [`MetricValue`]s.

use crate::error::Result;
use crate::metrics::MetricValue;
use arrow::array::{Array, ArrayRef};
use datafusion::scalar::ScalarValue;

/// Converts one cell of `array`.
pub(crate) fn value_at(array: &ArrayRef, index: usize) -> Result<MetricValue> {
    if array.is_null(index) {
        return Ok(MetricValue::Null);
    }
    Ok(scalar_to_metric_value(ScalarValue::try_from_array(array, index)?))
}

/// Converts every cell of `array`, in row order.
pub(crate) fn column_values(array: &ArrayRef) -> Result<Vec<MetricValue>> {
    (0..array.len()).map(|index| value_at(array, index)).collect()
}

fn scalar_to_metric_value(value: ScalarValue) -> MetricValue {
    if value.is_null() {
        return MetricValue::Null;
    }
    match value {
        ScalarValue::Boolean(Some(v)) => MetricValue::Boolean(v),
        ScalarValue::Int8(Some(v)) => MetricValue::Long(v.into()),
        ScalarValue::Int16(Some(v)) => MetricValue::Long(v.into()),
        ScalarValue::Int32(Some(v)) => MetricValue::Long(v.into()),
        ScalarValue::Int64(Some(v)) => MetricValue::Long(v),
        ScalarValue::UInt8(Some(v)) => MetricValue::Long(v.into()),
        ScalarValue::UInt16(Some(v)) => MetricValue::Long(v.into()),
        ScalarValue::UInt32(Some(v)) => MetricValue::Long(v.into()),
        ScalarValue::UInt64(Some(v)) => match i64::try_from(v) {
            Ok(v) => MetricValue::Long(v),
            Err(_) => MetricValue::Double(v as f64),
        },
        ScalarValue::Float32(Some(v)) => MetricValue::Double(v.into()),
        ScalarValue::Float64(Some(v)) => MetricValue::Double(v),
        ScalarValue::Decimal128(Some(v), _, scale) => {
            MetricValue::Double(v as f64 / 10f64.powi(scale.into()))
        }
        ScalarValue::Utf8(Some(v))
        | ScalarValue::LargeUtf8(Some(v))
        | ScalarValue::Utf8View(Some(v)) => MetricValue::String(v),
        // dates, timestamps and nested values keep their SQL rendering
        other => MetricValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Decimal128Array, Float64Array, Int64Array, StringArray};
    use std::sync::Arc;

    #[test]
    fn test_numeric_cells() {
        let ints: ArrayRef = Arc::new(Int64Array::from(vec![Some(3), None]));
        assert_eq!(
            column_values(&ints).unwrap(),
            vec![MetricValue::Long(3), MetricValue::Null]
        );

        let floats: ArrayRef = Arc::new(Float64Array::from(vec![2.5]));
        assert_eq!(value_at(&floats, 0).unwrap(), MetricValue::Double(2.5));
    }

    #[test]
    fn test_decimal_and_string_cells() {
        let decimals: ArrayRef = Arc::new(
            Decimal128Array::from(vec![1250])
                .with_precision_and_scale(10, 2)
                .unwrap(),
        );
        assert_eq!(value_at(&decimals, 0).unwrap(), MetricValue::Double(12.5));

        let strings: ArrayRef = Arc::new(StringArray::from(vec!["a"]));
        assert_eq!(value_at(&strings, 0).unwrap(), MetricValue::from("a"));
    }
}
