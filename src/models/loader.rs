//! ONNX model loader

use ort::session::{builder::GraphOptimizationLevel, Session};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors raised while turning an artifact file into a runnable model
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to load model from {}: {message}", path.display())]
    Runtime { path: PathBuf, message: String },
}

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the feature tensor
    pub input_name: String,
    /// Output name holding the predictions
    pub output_name: String,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with the specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a single ONNX model from file
    pub fn load<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel, ModelLoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(|e| runtime_error(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| runtime_error(path, e))?
            .with_intra_threads(self.onnx_threads)
            .map_err(|e| runtime_error(path, e))?
            .commit_from_file(path)
            .map_err(|e| runtime_error(path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| runtime_error(path, "model declares no inputs"))?;

        // sklearn exports put the label (classifier) or value (regressor) first
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| runtime_error(path, "model declares no outputs"))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_name,
        })
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::with_threads(1)
    }
}

fn runtime_error(path: &Path, err: impl Display) -> ModelLoadError {
    ModelLoadError::Runtime {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
