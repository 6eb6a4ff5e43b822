use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::auth::{Authenticated, scoped_email};
use crate::engine::checkout::start_checkout;
use crate::engine::reconciliation::{ConfirmationOutcome, confirm_payment};
use crate::error::AppError;
use crate::models::payment::Payment;
use crate::models::tracking::TrackingId;
use crate::state::AppState;
use crate::store::PaymentStore;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkout-session", post(create_checkout_session))
        .route("/payment-success", patch(payment_success))
        .route("/payments", get(list_payments))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub parcel_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct PaymentSuccessQuery {
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ListPaymentsQuery {
    pub email: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_processed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<TrackingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_record: Option<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<ConfirmationOutcome> for ConfirmationResponse {
    fn from(outcome: ConfirmationOutcome) -> Self {
        match outcome {
            ConfirmationOutcome::Confirmed {
                tracking_id,
                payment,
            } => ConfirmationResponse {
                success: true,
                tracking_id: Some(tracking_id),
                transaction_id: Some(payment.transaction_id.clone()),
                payment_record: Some(payment),
                ..Default::default()
            },
            ConfirmationOutcome::AlreadyProcessed {
                tracking_id,
                payment,
            } => ConfirmationResponse {
                success: true,
                already_processed: Some(true),
                tracking_id: Some(tracking_id),
                transaction_id: Some(payment.transaction_id.clone()),
                payment_record: Some(payment),
                ..Default::default()
            },
            ConfirmationOutcome::NotPaid { payment_status, .. } => ConfirmationResponse {
                message: Some(format!("payment not completed ({payment_status:?})")),
                ..Default::default()
            },
            ConfirmationOutcome::ParcelNotFound { parcel_id } => ConfirmationResponse {
                message: Some(format!("parcel {parcel_id} not found")),
                ..Default::default()
            },
        }
    }
}

async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let session = start_checkout(&state, payload.parcel_id).await?;

    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.id,
    }))
}

async fn payment_success(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentSuccessQuery>,
) -> Result<Json<ConfirmationResponse>, AppError> {
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("session_id is required".to_string()))?;

    let outcome = confirm_payment(&state, &session_id).await?;
    Ok(Json(outcome.into()))
}

async fn list_payments(
    State(state): State<Arc<AppState>>,
    caller: Authenticated,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let email = scoped_email(&state, &caller, query.email).await?;
    Ok(Json(state.store.list_payments(email.as_deref()).await?))
}
