//! Values produced by metric providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A resolved metric value.
///
/// Serializes untagged so that result payloads read as plain JSON
/// (`"observed_value": 2.0`). Numeric values keep the precision the backend
/// produced them with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// No value, e.g. the mean of an empty column.
    Null,
    Boolean(bool),
    /// An integer value (counts, sizes).
    Long(i64),
    /// A floating-point value (mean, deviation).
    Double(f64),
    String(String),
    /// An ordered list of values (column names, unexpected values).
    List(Vec<MetricValue>),
    /// Named values (column types).
    Map(BTreeMap<String, MetricValue>),
}

impl MetricValue {
    /// Checks if the metric value is numeric (Double or Long).
    pub fn is_numeric(&self) -> bool {
        matches!(self, MetricValue::Double(_) | MetricValue::Long(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }

    /// Attempts to get the numeric value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Double(v) => Some(*v),
            MetricValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Attempts to get the value as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Long(v) => Some(*v),
            MetricValue::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetricValue]> {
        match self {
            MetricValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, MetricValue>> {
        match self {
            MetricValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts into a JSON value for result payloads.
    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Null => Value::Null,
            MetricValue::Boolean(b) => Value::Bool(*b),
            MetricValue::Long(v) => Value::from(*v),
            // non-finite doubles have no JSON form
            MetricValue::Double(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::String(s) => Value::String(s.clone()),
            MetricValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            MetricValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Returns a human-readable string representation of the metric value.
    pub fn to_string_pretty(&self) -> String {
        match self {
            MetricValue::Null => "null".to_string(),
            MetricValue::Double(v) => {
                if v.fract() == 0.0 {
                    format!("{v:.0}")
                } else {
                    format!("{v:.4}")
                }
            }
            MetricValue::Long(v) => v.to_string(),
            MetricValue::String(s) => s.clone(),
            MetricValue::Boolean(b) => b.to_string(),
            MetricValue::List(items) => format!("List({} elements)", items.len()),
            MetricValue::Map(m) => format!("Map({} entries)", m.len()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_pretty())
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Long(value)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Boolean(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::String(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::String(value.to_string())
    }
}

impl<T: Into<MetricValue>> From<Option<T>> for MetricValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(MetricValue::Null)
    }
}

impl From<Vec<MetricValue>> for MetricValue {
    fn from(value: Vec<MetricValue>) -> Self {
        MetricValue::List(value)
    }
}

impl From<Value> for MetricValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => MetricValue::Null,
            Value::Bool(b) => MetricValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => MetricValue::Long(i),
                None => n.as_f64().map(MetricValue::Double).unwrap_or(MetricValue::Null),
            },
            Value::String(s) => MetricValue::String(s),
            Value::Array(items) => MetricValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                MetricValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(MetricValue::Long(3).as_f64(), Some(3.0));
        assert_eq!(MetricValue::Double(4.0).as_i64(), Some(4));
        assert_eq!(MetricValue::Double(4.5).as_i64(), None);
        assert_eq!(MetricValue::String("x".into()).as_f64(), None);
        assert!(MetricValue::Null.is_null());
    }

    #[test]
    fn test_untagged_serialization() {
        assert_eq!(serde_json::to_value(MetricValue::Double(2.0)).unwrap(), json!(2.0));
        assert_eq!(serde_json::to_value(MetricValue::Null).unwrap(), json!(null));
        let list = MetricValue::List(vec![MetricValue::Long(1), "a".into()]);
        assert_eq!(serde_json::to_value(&list).unwrap(), json!([1, "a"]));
    }

    #[test]
    fn test_from_json_keeps_integer_and_float_apart() {
        assert_eq!(MetricValue::from(json!(3)), MetricValue::Long(3));
        assert_eq!(MetricValue::from(json!(3.5)), MetricValue::Double(3.5));
        let map = MetricValue::from(json!({"a": "Int64"}));
        assert_eq!(
            map.as_map().and_then(|m| m.get("a")).and_then(|v| v.as_str()),
            Some("Int64")
        );
    }

    #[test]
    fn test_to_json_handles_non_finite() {
        assert_eq!(MetricValue::Double(f64::NAN).to_json(), Value::Null);
        assert_eq!(MetricValue::Long(7).to_json(), json!(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(MetricValue::Double(2.0).to_string(), "2");
        assert_eq!(MetricValue::Double(0.816496).to_string(), "0.8165");
        assert_eq!(MetricValue::from(Some(5_i64)).to_string(), "5");
        assert_eq!(MetricValue::from(None::<f64>).to_string(), "null");
    }
}
