//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::{Result, ServerError};
use super::state::AppState;
use crate::inference::{sensor_columns, summarize_sensor, BatchReport, SensorSummary};
use crate::training::FeatureImportance;
use crate::utils::read_csv_bytes;

/// Sensor columns listed by `/api/sensors`
const SENSOR_LIST_LIMIT: usize = 100;

// ============================================================================
// System
// ============================================================================

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let service = &state.service;
    Json(json!({
        "model_loaded": service.has_model(),
        "metrics_loaded": service.reference_metrics().is_some(),
        "expected_features": service.expected_features(),
        "model_path": service.model_path().map(|p| p.display().to_string()),
        "metrics_path": service.metrics_path().map(|p| p.display().to_string()),
        "trained_at": service.model().map(|m| m.trained_at.to_rfc3339()),
        "default_threshold": service.config().classification_threshold,
    }))
}

// ============================================================================
// Inference
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub threshold: Option<f64>,
}

/// Score an uploaded CSV batch
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyzeParams>,
    body: Bytes,
) -> Result<Json<BatchReport>> {
    if !state.service.has_model() {
        return Err(ServerError::Unavailable("No model loaded".to_string()));
    }
    if let Some(t) = params.threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(ServerError::BadRequest(format!(
                "threshold must be within [0, 1], got {}",
                t
            )));
        }
    }

    let service = Arc::clone(&state.service);
    let report = tokio::task::spawn_blocking(move || -> Result<BatchReport> {
        let df = read_csv_bytes(body.to_vec())
            .map_err(|e| ServerError::BadRequest(format!("Could not parse CSV: {}", e)))?;
        service.analyze(&df, params.threshold).ok_or_else(|| {
            ServerError::Unprocessable(format!(
                "Prediction unavailable for this batch (expected {} feature columns)",
                service.expected_features()
            ))
        })
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Prediction task failed: {}", e)))??;

    Ok(Json(report))
}

/// Confusion matrix with its axis labels
#[derive(Debug, Serialize)]
pub struct LabeledConfusion {
    pub labels: [&'static str; 2],
    pub true_ok: [u64; 2],
    pub true_defect: [u64; 2],
}

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let metrics = state
        .service
        .reference_metrics()
        .ok_or_else(|| ServerError::NotFound("No reference metrics available".to_string()))?;

    let cm = metrics.confusion_matrix;
    Ok(Json(json!({
        "metrics": metrics,
        "confusion": LabeledConfusion {
            labels: ["OK", "Defect"],
            true_ok: cm[0],
            true_defect: cm[1],
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct ImportanceParams {
    pub top: Option<usize>,
}

pub async fn get_importances(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportanceParams>,
) -> Result<Json<Vec<FeatureImportance>>> {
    if !state.service.has_model() {
        return Err(ServerError::Unavailable("No model loaded".to_string()));
    }
    Ok(Json(state.service.top_features(params.top.unwrap_or(10))))
}

// ============================================================================
// Sensor exploration
// ============================================================================

pub async fn list_sensors(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>> {
    let clean = state.clean_data().await?;
    let target = &state.service.config().target_column;
    Ok(Json(sensor_columns(&clean, target, SENSOR_LIST_LIMIT)))
}

pub async fn get_sensor(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<SensorSummary>>> {
    let clean = state.clean_data().await?;
    let target = &state.service.config().target_column;
    Ok(Json(summarize_sensor(&clean, &name, target)?))
}
