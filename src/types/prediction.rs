//! Request and response bodies

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model outputs, one per input record, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: Vec<Value>,
}

impl PredictionResponse {
    pub fn new(prediction: Vec<Value>) -> Self {
        Self { prediction }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
}

impl HealthResponse {
    pub fn running() -> Self {
        Self {
            message: "Server is running".to_string(),
        }
    }
}
