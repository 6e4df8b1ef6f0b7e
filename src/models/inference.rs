//! Prediction capability and its ONNX Runtime implementation

use crate::feature_mapper::FeatureMatrix;
use crate::models::loader::LoadedModel;
use ort::session::Session;
use ort::value::Tensor;
use serde_json::{Number, Value};
use std::fmt::Display;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a model while predicting
#[derive(Debug, Error)]
pub enum PredictError {
    /// A cell could not be fed to the model
    #[error("value for '{column}' in record {row} is not numeric: {value}")]
    InvalidValue {
        row: usize,
        column: String,
        value: Value,
    },

    #[error("model returned {actual} outputs for {expected} records")]
    OutputMismatch { expected: usize, actual: usize },

    #[error("model inference failed: {0}")]
    Runtime(String),
}

impl PredictError {
    /// Whether the caller's input caused the failure
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictError::InvalidValue { .. })
    }
}

/// Anything that maps a feature matrix to one output per row, in row order.
pub trait Predictor: Send + Sync {
    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<Value>, PredictError>;
}

/// ONNX Runtime backed predictor.
///
/// `Session::run` needs exclusive access, so concurrent requests against the
/// same model serialize on the session lock.
pub struct OnnxPredictor {
    name: String,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl From<LoadedModel> for OnnxPredictor {
    fn from(model: LoadedModel) -> Self {
        Self {
            name: model.name,
            input_name: model.input_name,
            output_name: model.output_name,
            session: Mutex::new(model.session),
        }
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<Value>, PredictError> {
        if matrix.is_empty() {
            return Ok(Vec::new());
        }

        let data = matrix_to_f32(matrix)?;
        let shape = vec![matrix.n_rows() as i64, matrix.n_cols() as i64];
        let input_tensor = Tensor::from_array((shape, data)).map_err(runtime)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PredictError::Runtime(format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(runtime)?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            PredictError::Runtime(format!("model output '{}' missing", self.output_name))
        })?;

        let predictions: Vec<Value> = if let Ok((_, labels)) = output.try_extract_tensor::<i64>() {
            labels.iter().map(|&v| Value::from(v)).collect()
        } else if let Ok((_, values)) = output.try_extract_tensor::<f32>() {
            values.iter().map(|&v| float_value(v as f64)).collect()
        } else if let Ok((_, values)) = output.try_extract_tensor::<f64>() {
            values.iter().map(|&v| float_value(v)).collect()
        } else {
            return Err(PredictError::Runtime(format!(
                "unsupported output type for '{}'",
                self.output_name
            )));
        };

        if predictions.len() != matrix.n_rows() {
            return Err(PredictError::OutputMismatch {
                expected: matrix.n_rows(),
                actual: predictions.len(),
            });
        }

        debug!(model = %self.name, rows = matrix.n_rows(), "Inference complete");

        Ok(predictions)
    }
}

/// Flatten the matrix row-major into f32 cells. Numbers and booleans are
/// accepted; anything else is rejected with its position.
pub fn matrix_to_f32(matrix: &FeatureMatrix) -> Result<Vec<f32>, PredictError> {
    let mut data = Vec::with_capacity(matrix.n_rows() * matrix.n_cols());

    for (row, cells) in matrix.rows().iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            let value = match cell {
                Value::Number(n) => n.as_f64(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            match value {
                Some(v) => data.push(v as f32),
                None => {
                    return Err(PredictError::InvalidValue {
                        row,
                        column: matrix.columns()[col].clone(),
                        value: cell.clone(),
                    })
                }
            }
        }
    }

    Ok(data)
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn runtime(err: impl Display) -> PredictError {
    PredictError::Runtime(err.to_string())
}
