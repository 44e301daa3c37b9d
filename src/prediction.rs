//! Prediction assembly: model invocation, inverse target transform, and
//! record-oriented output.
//!
//! The regressor is trained on log1p-transformed sales, so raw model
//! output is mapped back through `exp(x) - 1`. Predictions are attached
//! to the pre-preparation records by row position; the row-count check
//! is the explicit guard for that positional join.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::preparation::PreparedBatch;

/// Black-box regressor contract.
pub trait Predictor {
    /// Returns one raw (log-scale) prediction per row of `features`.
    fn predict(&self, features: &PreparedBatch) -> Vec<f64>;
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("row count mismatch: {original} original records vs {prepared} prepared rows")]
    ShapeMismatch { original: usize, prepared: usize },
    #[error("record {index} did not serialize to a JSON object")]
    NonObjectRecord { index: usize },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runs the predictor over `prepared`, inverts the log1p target
/// transform, and serializes `original` with a `prediction` field per
/// record as a record-oriented JSON array (dates render as ISO-8601).
pub fn assemble_predictions<R: Serialize>(
    predictor: &dyn Predictor,
    original: &[R],
    prepared: &PreparedBatch,
) -> Result<String, PredictionError> {
    check_shape(original.len(), prepared.n_rows())?;

    let raw = predictor.predict(prepared);
    check_shape(original.len(), raw.len())?;

    let mut out = Vec::with_capacity(original.len());
    for (index, (record, prediction)) in original.iter().zip(raw).enumerate() {
        let Value::Object(mut fields) = serde_json::to_value(record)? else {
            return Err(PredictionError::NonObjectRecord { index });
        };
        fields.insert("prediction".to_string(), prediction.exp_m1().into());
        out.push(Value::Object(fields));
    }

    info!(
        component = "prediction",
        event = "prediction.assemble.finish",
        rows = out.len()
    );
    Ok(serde_json::to_string(&Value::Array(out))?)
}

fn check_shape(original: usize, prepared: usize) -> Result<(), PredictionError> {
    if original != prepared {
        return Err(PredictionError::ShapeMismatch { original, prepared });
    }
    Ok(())
}
