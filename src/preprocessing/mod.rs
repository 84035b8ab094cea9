//! Data preprocessing module
//!
//! Turns a raw sensor export into a model-ready table:
//! - Timestamp removal and label remapping ({-1, 1} → {0, 1})
//! - One-hot encoding of the process phase (first level dropped)
//! - Pruning of columns with more than half of their values missing
//! - Median imputation of everything that remains

mod config;
mod imputer;
mod encoder;
mod pipeline;

pub use config::PreprocessingConfig;
pub use imputer::{Imputer, ImputeStrategy, median};
pub use encoder::OneHotEncoder;
pub use pipeline::{Preprocessor, CleanDataset, PreprocessingReport};
