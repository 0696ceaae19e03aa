use serde::{Deserialize, Serialize};

use crate::domain::ExecutionResult;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ExecutionResult> for ExecutionResponse {
    /// Empty output is omitted on failure, but kept on success so that a
    /// response is never an empty object.
    fn from(result: ExecutionResult) -> Self {
        let error = result.error.map(|e| e.to_string());
        let output = if result.output.is_empty() && error.is_some() {
            None
        } else {
            Some(result.output)
        };

        Self { output, error }
    }
}
