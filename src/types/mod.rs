//! Wire types for the HTTP surface

pub mod prediction;

pub use prediction::{ErrorResponse, HealthResponse, PredictionResponse};
