use super::configuration::ExpectationConfiguration;
use crate::error::ExceptionInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Structured result details of one expectation (`observed_value`, counts).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultPayload(BTreeMap<String, Value>);

impl ResultPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn observed_value(&self) -> Option<&Value> {
        self.0.get("observed_value")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What an expectation's validation logic returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationOutcome {
    pub success: bool,
    pub result: ResultPayload,
}

impl ExpectationOutcome {
    pub fn new(success: bool, result: ResultPayload) -> Self {
        Self { success, result }
    }
}

/// The result envelope of one evaluated expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationValidationResult {
    pub success: bool,
    #[serde(default)]
    pub result: ResultPayload,
    /// The failure that prevented evaluation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_info: Option<ExceptionInfo>,
    /// Further distinct failures attributed to the same expectation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_exceptions: Vec<ExceptionInfo>,
    pub expectation_config: ExpectationConfiguration,
}

impl ExpectationValidationResult {
    pub fn evaluated(outcome: ExpectationOutcome, expectation_config: ExpectationConfiguration) -> Self {
        Self {
            success: outcome.success,
            result: outcome.result,
            exception_info: None,
            additional_exceptions: Vec::new(),
            expectation_config,
        }
    }

    /// A failed result carrying the exceptions that prevented evaluation.
    ///
    /// The exceptions are ordered so that failures of a metric's own
    /// computation come before failures inherited from upstream metrics;
    /// the first one becomes `exception_info`.
    pub fn failed(
        exceptions: impl IntoIterator<Item = ExceptionInfo>,
        expectation_config: ExpectationConfiguration,
    ) -> Self {
        let mut exceptions: Vec<ExceptionInfo> = exceptions.into_iter().collect();
        exceptions.sort_by(|a, b| a.failure_kind.cmp(&b.failure_kind).then_with(|| a.cmp(b)));
        exceptions.dedup();
        let mut exceptions = exceptions.into_iter();
        Self {
            success: false,
            result: ResultPayload::new(),
            exception_info: exceptions.next(),
            additional_exceptions: exceptions.collect(),
            expectation_config,
        }
    }

    /// True if the expectation could not be evaluated.
    pub fn raised_exception(&self) -> bool {
        self.exception_info.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_failed_orders_own_failures_first() {
        let config = ExpectationConfiguration::new("expect_column_mean_to_be_between");
        let result = ExpectationValidationResult::failed(
            [
                ExceptionInfo::new("a upstream", FailureKind::DependencyUnresolved),
                ExceptionInfo::new("z computation", FailureKind::Computation),
                ExceptionInfo::new("b computation", FailureKind::Computation),
            ],
            config,
        );

        assert!(!result.success);
        assert!(result.raised_exception());
        assert_eq!(
            result.exception_info.as_ref().unwrap().exception_message,
            "b computation"
        );
        assert_eq!(result.additional_exceptions.len(), 2);
        assert_eq!(
            result.additional_exceptions[1].failure_kind,
            FailureKind::DependencyUnresolved
        );
        assert!(result.result.observed_value().is_none());
    }

    #[test]
    fn test_serialized_envelope_omits_empty_fields() {
        let config = ExpectationConfiguration::new("expect_table_row_count_to_be_between");
        let result = ExpectationValidationResult::evaluated(
            ExpectationOutcome::new(true, ResultPayload::new().with("observed_value", 3)),
            config,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["result"]["observed_value"], 3);
        assert!(json.get("exception_info").is_none());
        assert!(json.get("additional_exceptions").is_none());
    }
}
