//! Inference module
//!
//! Serves the persisted model to interactive callers:
//! - Artifact discovery with graceful degradation
//! - Batch preparation and missing-value repair
//! - Predictions with an optional decision threshold
//! - Evaluation against the training-time reference metrics
//! - Batch reports and per-class sensor summaries

mod config;
mod service;
pub mod sensors;

pub use config::{BatchImputation, InferenceConfig, DEFAULT_EXPECTED_FEATURES};
pub use service::{BatchReport, Prediction, QualityControlService, UnitResult, UnitStatus};
pub use sensors::{sensor_columns, summarize_sensor, SensorSummary};
