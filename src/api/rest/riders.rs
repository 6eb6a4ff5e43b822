use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::auth::AdminUser;
use crate::engine::enrollment::{self, Decision};
use crate::error::AppError;
use crate::models::rider::{ApplicationStatus, RiderApplication, WorkStatus};
use crate::state::AppState;
use crate::store::{RiderFilter, RiderStore};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", get(list_riders).post(apply))
        .route("/riders/:id", patch(review).delete(delete_rider))
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    pub email: String,
    pub name: String,
    pub district: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRidersQuery {
    pub status: Option<ApplicationStatus>,
    pub district: Option<String>,
    pub work_status: Option<WorkStatus>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub status: Decision,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

async fn apply(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ApplyRequest>,
) -> Result<Json<RiderApplication>, AppError> {
    let application =
        enrollment::apply(&state, payload.email, payload.name, payload.district).await?;
    Ok(Json(application))
}

async fn list_riders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRidersQuery>,
) -> Result<Json<Vec<RiderApplication>>, AppError> {
    let filter = RiderFilter {
        status: query.status,
        district: query.district,
        work_status: query.work_status,
    };

    Ok(Json(state.store.list_riders(&filter).await?))
}

async fn review(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<RiderApplication>, AppError> {
    Ok(Json(enrollment::review(&state, id, payload.status).await?))
}

async fn delete_rider(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    enrollment::remove(&state, id).await?;
    info!(rider_id = %id, admin = %admin.email, "rider application deleted");
    Ok(Json(DeleteResponse { deleted: true }))
}
