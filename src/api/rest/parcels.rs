use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::auth::{AdminUser, Authenticated, RiderUser, scoped_email};
use crate::engine::delivery;
use crate::error::AppError;
use crate::models::parcel::{DeliveryStatus, Parcel, ParcelDetails, PaymentStatus, RiderRef};
use crate::state::AppState;
use crate::store::{ParcelFilter, ParcelStore, RemoveResult, StatusCount};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", get(list_parcels).post(create_parcel))
        .route("/parcels/rider", get(rider_parcels))
        .route("/parcels/delivery-status/stats", get(delivery_stats))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/parcels/:id/rider", patch(assign_rider))
        .route("/parcels/:id/status", patch(update_status))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParcelRequest {
    pub sender_email: String,
    pub parcel_name: String,
    pub cost: f64,
    #[serde(flatten)]
    pub details: ParcelDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParcelsQuery {
    pub email: Option<String>,
    pub delivery_status: Option<DeliveryStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderParcelsQuery {
    pub delivery_status: Option<DeliveryStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub delivery_status: DeliveryStatus,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateParcelRequest>,
) -> Result<Json<Parcel>, AppError> {
    if payload.sender_email.trim().is_empty() {
        return Err(AppError::BadRequest("senderEmail is required".to_string()));
    }
    if payload.parcel_name.trim().is_empty() {
        return Err(AppError::BadRequest("parcelName is required".to_string()));
    }
    if !payload.cost.is_finite() || payload.cost < 0.0 {
        return Err(AppError::BadRequest("cost must be >= 0".to_string()));
    }

    let parcel = state
        .store
        .insert_parcel(Parcel::new(
            payload.sender_email,
            payload.parcel_name,
            payload.cost,
            payload.details,
        ))
        .await?;

    info!(parcel_id = %parcel.id, sender = %parcel.sender_email, cost = parcel.cost, "parcel created");
    Ok(Json(parcel))
}

async fn list_parcels(
    State(state): State<Arc<AppState>>,
    caller: Authenticated,
    Query(query): Query<ListParcelsQuery>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    let sender_email = scoped_email(&state, &caller, query.email).await?;

    let filter = ParcelFilter {
        sender_email,
        delivery_status: query.delivery_status,
        payment_status: query.payment_status,
        limit: query.limit,
        ..ParcelFilter::default()
    };

    Ok(Json(state.store.list_parcels(&filter).await?))
}

async fn rider_parcels(
    State(state): State<Arc<AppState>>,
    RiderUser(rider): RiderUser,
    Query(query): Query<RiderParcelsQuery>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    let filter = ParcelFilter {
        rider_email: Some(rider.email),
        delivery_status: query.delivery_status,
        ..ParcelFilter::default()
    };

    Ok(Json(state.store.list_parcels(&filter).await?))
}

async fn delivery_stats(
    State(state): State<Arc<AppState>>,
    RiderUser(rider): RiderUser,
) -> Result<Json<Vec<StatusCount>>, AppError> {
    let filter = ParcelFilter {
        rider_email: Some(rider.email),
        ..ParcelFilter::default()
    };

    Ok(Json(state.store.count_by_delivery_status(&filter).await?))
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = state
        .store
        .find_parcel(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))?;

    Ok(Json(parcel))
}

async fn assign_rider(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(rider): Json<RiderRef>,
) -> Result<Json<Parcel>, AppError> {
    Ok(Json(delivery::assign_rider(&state, id, rider).await?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    RiderUser(rider): RiderUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = state
        .store
        .find_parcel(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))?;

    let assigned_to_caller = parcel
        .rider
        .as_ref()
        .is_some_and(|assigned| assigned.rider_email == rider.email);
    if !assigned_to_caller {
        return Err(AppError::Forbidden(format!(
            "parcel {id} is not assigned to you"
        )));
    }

    Ok(Json(
        delivery::set_delivery_status(&state, id, payload.delivery_status).await?,
    ))
}

async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    match state.store.delete_parcel(id).await? {
        RemoveResult::Removed => {}
        RemoveResult::InUse => {
            return Err(AppError::Conflict(format!(
                "parcel {id} has an active rider assignment"
            )));
        }
        RemoveResult::NotFound => {
            return Err(AppError::NotFound(format!("parcel {id} not found")));
        }
    }

    info!(parcel_id = %id, admin = %admin.email, "parcel deleted");
    Ok(Json(DeleteResponse { deleted: true }))
}
