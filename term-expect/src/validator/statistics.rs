use crate::expectations::ExpectationValidationResult;
use serde::{Deserialize, Serialize};

/// Aggregate counts over the results of one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatistics {
    pub evaluated_expectations: usize,
    pub successful_expectations: usize,
    pub unsuccessful_expectations: usize,
    /// `None` when nothing was evaluated
    pub success_percent: Option<f64>,
    pub success: bool,
}

impl ValidationStatistics {
    pub fn from_results(results: &[ExpectationValidationResult]) -> Self {
        let evaluated_expectations = results.len();
        let successful_expectations = results.iter().filter(|result| result.success).count();
        let unsuccessful_expectations = evaluated_expectations - successful_expectations;
        let success_percent = (evaluated_expectations > 0)
            .then(|| successful_expectations as f64 / evaluated_expectations as f64 * 100.0);

        Self {
            evaluated_expectations,
            successful_expectations,
            unsuccessful_expectations,
            success_percent,
            success: unsuccessful_expectations == 0,
        }
    }
}
