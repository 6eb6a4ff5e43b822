use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{CheckoutRequest, CheckoutSession};
use crate::models::parcel::PaymentStatus;
use crate::models::payment::major_to_minor;
use crate::state::AppState;
use crate::store::ParcelStore;

/// Opens a gateway checkout for an unpaid parcel, priced from the stored cost.
pub async fn start_checkout(state: &AppState, parcel_id: Uuid) -> Result<CheckoutSession, AppError> {
    let parcel = state
        .store
        .find_parcel(parcel_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

    if parcel.payment_status == PaymentStatus::Paid {
        return Err(AppError::Conflict(format!("parcel {parcel_id} is already paid")));
    }

    let unit_amount = major_to_minor(parcel.cost);
    if unit_amount <= 0 {
        return Err(AppError::BadRequest("parcel cost must be > 0".to_string()));
    }

    let session = state
        .gateway
        .create_checkout_session(CheckoutRequest {
            parcel_id,
            parcel_name: parcel.parcel_name,
            customer_email: parcel.sender_email,
            unit_amount,
            currency: state.checkout.currency.clone(),
            success_url: state.checkout.success_url(),
            cancel_url: state.checkout.cancel_url(),
        })
        .await?;

    info!(%parcel_id, session_id = %session.id, unit_amount, "checkout session opened");
    Ok(session)
}
