//! End-to-end pipeline orchestration and configuration.

use std::env;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::cleaning::{clean_records, CleanedRecord, CleaningError};
use crate::features::{derive_features, FeatureError, FeatureRecord};
use crate::ingest::{RawSalesRecord, SchemaError};
use crate::prediction::{assemble_predictions, PredictionError, Predictor};
use crate::preparation::{prepare_batch, PreparedBatch};
use crate::scalers::{ParameterStore, ParameterStoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory holding the five persisted transformer parameter files.
    pub parameter_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parameter_dir: PathBuf::from("parameter"),
        }
    }
}

pub fn pipeline_config_from_env() -> PipelineConfig {
    let mut config = PipelineConfig::default();

    if let Ok(dir) = env::var("STORECAST_PARAMETER_DIR") {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            config.parameter_dir = PathBuf::from(trimmed);
        }
    }

    config
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Cleaning(#[from] CleaningError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    ParameterStore(#[from] ParameterStoreError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

/// The three-stage transformation pipeline plus prediction assembly.
///
/// Preparation re-fits the loaded transformers, so [`Self::prepare`] and
/// [`Self::predict_json`] take `&mut self`; concurrent use of one
/// instance is thereby ruled out at compile time. Use one instance per
/// concurrent invocation if parallel batches are needed.
#[derive(Debug)]
pub struct SalesPipeline {
    config: PipelineConfig,
    parameters: ParameterStore,
}

impl SalesPipeline {
    /// Loads transformer parameters once from the configured directory.
    pub fn load(config: PipelineConfig) -> Result<Self, ParameterStoreError> {
        let parameters = ParameterStore::load(&config.parameter_dir)?;
        info!(
            component = "pipeline",
            event = "pipeline.loaded",
            parameter_dir = %config.parameter_dir.display()
        );
        Ok(Self { config, parameters })
    }

    /// Builds a pipeline from already-loaded parameters.
    pub fn from_parts(config: PipelineConfig, parameters: ParameterStore) -> Self {
        Self { config, parameters }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn clean(&self, records: &[RawSalesRecord]) -> Result<Vec<CleanedRecord>, CleaningError> {
        clean_records(records)
    }

    pub fn derive_features(
        &self,
        records: &[CleanedRecord],
    ) -> Result<Vec<FeatureRecord>, FeatureError> {
        derive_features(records)
    }

    pub fn prepare(&mut self, records: &[FeatureRecord]) -> PreparedBatch {
        prepare_batch(&mut self.parameters, records)
    }

    /// Runs the full chain on a raw batch and returns the record-oriented
    /// JSON output. Predictions join the derived (pre-preparation)
    /// records by row position.
    pub fn predict_json(
        &mut self,
        predictor: &dyn Predictor,
        records: &[RawSalesRecord],
    ) -> Result<String, PipelineError> {
        let cleaned = self.clean(records)?;
        let derived = self.derive_features(&cleaned)?;
        let prepared = self.prepare(&derived);
        Ok(self.assemble(predictor, &derived, &prepared)?)
    }

    pub fn assemble<R: Serialize>(
        &self,
        predictor: &dyn Predictor,
        original: &[R],
        prepared: &PreparedBatch,
    ) -> Result<String, PredictionError> {
        assemble_predictions(predictor, original, prepared)
    }
}
