//! Fitted column transformers and the on-disk parameter store.
//!
//! Transformer parameters are persisted as tagged JSON files, one per
//! scaler, loaded once at pipeline construction from an explicitly
//! configured directory. Each scaler exposes both `fit_and_transform`
//! (re-fits on the given column, matching how the training pipeline runs
//! in production today) and an idempotent `transform` for serving paths
//! that must stay stable across batches.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Numeric rescaler with persisted fitted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    /// Min-max rescaling to [0, 1].
    MinMax { data_min: f64, data_max: f64 },
    /// Robust rescaling: (x - center) / scale, with center the median
    /// and scale the interquartile range when fitted.
    Robust { center: f64, scale: f64 },
}

impl FittedScaler {
    /// Re-fits the parameters on `column`. An empty column leaves the
    /// persisted parameters untouched.
    pub fn fit(&mut self, column: &[f64]) {
        if column.is_empty() {
            return;
        }
        match self {
            Self::MinMax { data_min, data_max } => {
                *data_min = column.iter().copied().fold(f64::INFINITY, f64::min);
                *data_max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            }
            Self::Robust { center, scale } => {
                *center = quantile(column, 0.5);
                *scale = quantile(column, 0.75) - quantile(column, 0.25);
            }
        }
    }

    /// Rescales `column` with the current parameters. A degenerate fit
    /// (zero range or zero scale) maps every value to 0.0.
    pub fn transform(&self, column: &[f64]) -> Vec<f64> {
        match self {
            Self::MinMax { data_min, data_max } => {
                let range = data_max - data_min;
                column
                    .iter()
                    .map(|x| if range == 0.0 { 0.0 } else { (x - data_min) / range })
                    .collect()
            }
            Self::Robust { center, scale } => column
                .iter()
                .map(|x| if *scale == 0.0 { 0.0 } else { (x - center) / scale })
                .collect(),
        }
    }

    pub fn fit_and_transform(&mut self, column: &[f64]) -> Vec<f64> {
        self.fit(column);
        self.transform(column)
    }
}

/// Label encoder over string categories. Classes are kept sorted;
/// encoding assigns each class its sorted position, 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit(&mut self, values: &[String]) {
        let mut classes: Vec<String> = values.to_vec();
        classes.sort_unstable();
        classes.dedup();
        self.classes = classes;
    }

    /// Encodes each value as its class index; values outside the fitted
    /// classes encode as NaN.
    pub fn transform(&self, values: &[String]) -> Vec<f64> {
        values
            .iter()
            .map(|value| match self.classes.binary_search(value) {
                Ok(index) => index as f64,
                Err(_) => f64::NAN,
            })
            .collect()
    }

    pub fn fit_and_transform(&mut self, values: &[String]) -> Vec<f64> {
        self.fit(values);
        self.transform(values)
    }
}

/// The five persisted transformers the preparation stage consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    pub competition_distance_scaler: FittedScaler,
    pub competition_time_month_scaler: FittedScaler,
    pub promo2_time_week_scaler: FittedScaler,
    pub year_scaler: FittedScaler,
    pub store_type_scaler: LabelEncoder,
}

#[derive(Debug, Error)]
pub enum ParameterStoreError {
    #[error("failed to read parameter file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed parameter file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ParameterStore {
    /// Loads all five parameter files from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ParameterStoreError> {
        let store = Self {
            competition_distance_scaler: load_json(dir, "competition_distance_scaler.json")?,
            competition_time_month_scaler: load_json(dir, "competition_time_month_scaler.json")?,
            promo2_time_week_scaler: load_json(dir, "promo2_time_week_scaler.json")?,
            year_scaler: load_json(dir, "year_scaler.json")?,
            store_type_scaler: load_json(dir, "store_type_scaler.json")?,
        };

        info!(
            component = "scalers",
            event = "scalers.parameters.loaded",
            dir = %dir.display()
        );
        Ok(store)
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(
    dir: &Path,
    file_name: &str,
) -> Result<T, ParameterStoreError> {
    let path = dir.join(file_name);
    let raw = fs::read_to_string(&path).map_err(|source| ParameterStoreError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ParameterStoreError::Malformed { path, source })
}

// Linear-interpolation quantile over an unsorted column.
fn quantile(column: &[f64], q: f64) -> f64 {
    let mut sorted = column.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let fraction = position - lower as f64;
        sorted[lower] * (1.0 - fraction) + sorted[upper] * fraction
    }
}
