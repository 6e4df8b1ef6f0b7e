//! Model loading and prediction

pub mod inference;
pub mod loader;

pub use inference::{OnnxPredictor, PredictError, Predictor};
pub use loader::{LoadedModel, ModelLoadError, ModelLoader};
