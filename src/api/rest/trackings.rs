use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;

use crate::engine::tracking_log;
use crate::error::AppError;
use crate::models::tracking::{TrackingId, TrackingLogEntry};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/trackings/:tracking_id/logs", get(tracking_logs))
}

async fn tracking_logs(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Result<Json<Vec<TrackingLogEntry>>, AppError> {
    let logs = tracking_log::history(&state, &TrackingId::new(tracking_id)).await?;
    Ok(Json(logs))
}
