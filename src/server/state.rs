//! Application state management

use crate::error::Result;
use crate::inference::QualityControlService;
use crate::utils::load_csv;
use polars::prelude::*;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub service: Arc<QualityControlService>,
    /// Clean table for sensor exploration, loaded on first use
    clean_data: RwLock<Option<Arc<DataFrame>>>,
}

impl AppState {
    pub fn new(config: ServerConfig, service: Arc<QualityControlService>) -> Self {
        Self {
            config,
            service,
            clean_data: RwLock::new(None),
        }
    }

    /// The clean table, read from disk once
    pub async fn clean_data(&self) -> Result<Arc<DataFrame>> {
        if let Some(df) = self.clean_data.read().await.as_ref() {
            return Ok(Arc::clone(df));
        }

        let mut slot = self.clean_data.write().await;
        if let Some(df) = slot.as_ref() {
            return Ok(Arc::clone(df));
        }

        let path = self.config.clean_data_path.clone();
        let df = tokio::task::spawn_blocking(move || load_csv(&path))
            .await
            .map_err(|e| crate::error::QcError::DataError(format!("loader task failed: {}", e)))??;
        info!(
            path = %self.config.clean_data_path.display(),
            rows = df.height(),
            cols = df.width(),
            "Clean table cached"
        );

        let df = Arc::new(df);
        *slot = Some(Arc::clone(&df));
        Ok(df)
    }
}
