//! Storecast core crate.
//!
//! Feature-engineering pipeline for retail sales forecasting:
//! - schema normalization and typed record ingestion
//! - null imputation and type coercion
//! - calendar / competition-age feature derivation
//! - rescaling, encoding, and projection to the model feature set
//! - prediction assembly back onto the original record shape
//!
//! The regression model itself and the training of the persisted
//! transformer parameters live outside this crate.

mod cleaning;
mod features;
mod ingest;
mod observability;
mod pipeline;
mod prediction;
mod preparation;
mod scalers;

pub use cleaning::{
    clean_records, CleanedRecord, CleaningError, NO_COMPETITOR_DISTANCE, NO_PROMO_INTERVAL,
};
pub use features::{derive_features, FeatureError, FeatureRecord};
pub use ingest::{
    load_raw_csv, load_raw_csv_path, normalize_header, raw_records_from_json, RawSalesRecord,
    SchemaError, RAW_COLUMNS,
};
pub use observability::{
    init_logging, log_app_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use pipeline::{pipeline_config_from_env, PipelineConfig, PipelineError, SalesPipeline};
pub use prediction::{assemble_predictions, PredictionError, Predictor};
pub use preparation::{prepare_batch, PreparedBatch, FINAL_FEATURE_COLUMNS};
pub use scalers::{FittedScaler, LabelEncoder, ParameterStore, ParameterStoreError};
