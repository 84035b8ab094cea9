//! Utility functions and types

pub mod data_loader;
pub mod parallel;

pub use data_loader::{load_csv, write_csv, write_atomic, read_csv_bytes, split_target};
pub use parallel::run_with_threads;
