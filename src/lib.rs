//! SECOM quality control - yield prediction for semiconductor manufacturing
//!
//! This crate provides the offline pipeline and the interactive service
//! around a defect classifier trained on the SECOM sensor data set:
//! - Cleaning of the raw sensor export
//! - Class rebalancing with SMOTE and random forest training
//! - Batch prediction with graceful degradation when artifacts are missing
//! - HTTP and command-line front ends
//!
//! # Modules
//!
//! ## Pipeline
//! - [`preprocessing`] - Label remapping, phase encoding, pruning, imputation
//! - [`synthetic`] - SMOTE oversampling
//! - [`training`] - Decision trees, random forest, split, metrics, persistence
//! - [`inference`] - Quality-control service and sensor summaries
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface
//!
//! ## Utilities
//! - [`artifacts`] - File locations shared by the stages
//! - [`utils`] - CSV IO and thread-pool helpers

// Core error handling
pub mod error;
pub mod artifacts;

// Pipeline stages
pub mod preprocessing;
pub mod synthetic;
pub mod training;
pub mod inference;

// Front ends
pub mod server;
pub mod cli;

pub mod utils;

pub use error::{QcError, Result};

/// Prelude for convenient imports
pub mod prelude {
    // Error handling
    pub use crate::error::{QcError, Result};

    // Artifacts
    pub use crate::artifacts::ArtifactPaths;

    // Preprocessing
    pub use crate::preprocessing::{CleanDataset, Imputer, ImputeStrategy, PreprocessingConfig, Preprocessor};

    // Oversampling
    pub use crate::synthetic::{Sampler, SMOTE};

    // Training
    pub use crate::training::{
        ClassificationMetrics, MetricsComparison, QualityModel, RandomForest, Trainer, TrainingConfig,
    };

    // Inference
    pub use crate::inference::{BatchImputation, InferenceConfig, Prediction, QualityControlService};
}
