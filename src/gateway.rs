//! Startup wiring: artifacts, models and the two prediction tasks.
//!
//! A `Gateway` is built once before serving starts and is only read
//! afterwards, so handlers share it without locking.

use crate::artifacts::{ArtifactFetcher, FetchError};
use crate::config::AppConfig;
use crate::feature_mapper::{to_feature_matrix, FeatureSchema, ValidationError};
use crate::models::{ModelLoadError, ModelLoader, OnnxPredictor, PredictError, Predictor};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Startup failures. Any of these must stop the process.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
}

/// Per-request failures of a prediction task
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Predict(#[from] PredictError),
}

/// The two prediction tasks served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Classifier,
    Regressor,
}

impl TaskKind {
    /// Short name used in logs and metrics
    pub fn endpoint(&self) -> &'static str {
        match self {
            TaskKind::Classifier => "predict_clas",
            TaskKind::Regressor => "predict_reg",
        }
    }
}

/// A feature schema paired with the model trained on it
pub struct PredictionTask {
    schema: FeatureSchema,
    model: Arc<dyn Predictor>,
}

impl PredictionTask {
    pub fn new(schema: FeatureSchema, model: Arc<dyn Predictor>) -> Self {
        Self { schema, model }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Validate the payload, then predict one output per record.
    /// Invalid payloads never reach the model.
    pub fn predict(&self, payload: &Value) -> Result<Vec<Value>, TaskError> {
        let matrix = to_feature_matrix(payload, &self.schema)?;
        Ok(self.model.predict(&matrix)?)
    }
}

/// Initialization result shared by every request handler
pub struct Gateway {
    classifier: PredictionTask,
    regressor: PredictionTask,
}

impl Gateway {
    /// Build a gateway from already-loaded models
    pub fn new(classifier: Arc<dyn Predictor>, regressor: Arc<dyn Predictor>) -> Self {
        Self {
            classifier: PredictionTask::new(FeatureSchema::classifier(), classifier),
            regressor: PredictionTask::new(FeatureSchema::regressor(), regressor),
        }
    }

    /// Fetch both artifacts if missing, then load both models.
    pub async fn bootstrap(config: &AppConfig) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(format!("{e:#}")))?;

        let fetcher = ArtifactFetcher::from_config(&config.artifacts)?;
        let classifier_spec = &config.artifacts.classifier;
        let regressor_spec = &config.artifacts.regressor;

        let outcome = fetcher.ensure_local(classifier_spec).await?;
        info!(model = "classifier", outcome = ?outcome, "Classifier artifact ready");
        let outcome = fetcher.ensure_local(regressor_spec).await?;
        info!(model = "regressor", outcome = ?outcome, "Regressor artifact ready");

        let loader = ModelLoader::with_threads(config.models.onnx_threads);
        let classifier = OnnxPredictor::from(loader.load(&classifier_spec.local_path, "classifier")?);
        let regressor = OnnxPredictor::from(loader.load(&regressor_spec.local_path, "regressor")?);

        Ok(Self::new(Arc::new(classifier), Arc::new(regressor)))
    }

    pub fn task(&self, kind: TaskKind) -> &PredictionTask {
        match kind {
            TaskKind::Classifier => &self.classifier,
            TaskKind::Regressor => &self.regressor,
        }
    }
}
