//! Request validation and feature-matrix mapping.
//!
//! Turns an inbound JSON payload (one record or a batch of records) into a
//! rectangular matrix whose columns follow the schema the model was trained
//! on, independent of the key order in the request.

use serde_json::{Map, Value};
use thiserror::Error;

/// Classifier input columns, in training order
pub const CLASSIFIER_FEATURES: [&str; 9] = [
    "no_of_dependents",
    "education",
    "self_employed",
    "income_annum",
    "loan_amount",
    "loan_term",
    "cibil_score",
    "residential_assets_value",
    "commercial_assets_value",
];

/// Regressor input columns, in training order
pub const REGRESSOR_FEATURES: [&str; 9] = [
    "no_of_dependents",
    "education",
    "self_employed",
    "income_annum",
    "loan_amount",
    "loan_term",
    "residential_assets_value",
    "commercial_assets_value",
    "loan_status",
];

/// Rejections raised before a payload reaches a model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Payload is neither an object nor an array of objects
    #[error("Invalid input format")]
    InvalidFormat,

    /// Required fields absent from at least one record
    #[error("Missing feature(s): {}", .0.join(", "))]
    MissingFeature(Vec<String>),
}

/// Ordered, named list of required input fields for one prediction task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    name: String,
    fields: Vec<String>,
}

impl FeatureSchema {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Loan approval classifier schema
    pub fn classifier() -> Self {
        Self::new("classifier", CLASSIFIER_FEATURES)
    }

    /// Loan amount regressor schema
    pub fn regressor() -> Self {
        Self::new("regressor", REGRESSOR_FEATURES)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Rows are records in request order, columns are schema fields in
/// declared order. Cell values are passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl FeatureMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (`row`, `col`)
    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(col))
    }
}

/// Validate `payload` against `schema` and project it into a feature matrix.
///
/// A single object is a batch of one; an array must contain only objects
/// (an empty array is a valid batch of zero). Every schema field must be
/// present in every record, extra fields are ignored. No type or range
/// checks happen here.
pub fn to_feature_matrix(
    payload: &Value,
    schema: &FeatureSchema,
) -> Result<FeatureMatrix, ValidationError> {
    let records: Vec<&Map<String, Value>> = match payload {
        Value::Object(record) => vec![record],
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_object().ok_or(ValidationError::InvalidFormat))
            .collect::<Result<_, _>>()?,
        _ => return Err(ValidationError::InvalidFormat),
    };

    let missing: Vec<String> = schema
        .fields()
        .iter()
        .filter(|field| records.iter().any(|record| !record.contains_key(field.as_str())))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFeature(missing));
    }

    let rows = records
        .iter()
        .map(|record| {
            schema
                .fields()
                .iter()
                .map(|field| record[field.as_str()].clone())
                .collect()
        })
        .collect();

    Ok(FeatureMatrix {
        columns: schema.fields().to_vec(),
        rows,
    })
}
