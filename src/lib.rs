//! Loan Inference Gateway Library
//!
//! Serves a loan-approval classifier and a loan-amount regressor over HTTP.
//! Model artifacts are fetched from a remote file host on first start and
//! cached locally; each request is validated and mapped onto the model's
//! feature order before prediction.

pub mod artifacts;
pub mod config;
pub mod feature_mapper;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use artifacts::{ArtifactFetcher, ArtifactSpec, FetchError};
pub use config::AppConfig;
pub use feature_mapper::{to_feature_matrix, FeatureMatrix, FeatureSchema, ValidationError};
pub use gateway::{Gateway, GatewayError};
pub use metrics::GatewayMetrics;
pub use models::{ModelLoadError, PredictError, Predictor};
