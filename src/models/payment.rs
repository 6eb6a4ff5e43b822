use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::parcel::PaymentStatus;
use crate::models::tracking::TrackingId;

/// A settled gateway transaction. `transaction_id` is unique across the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub customer_email: String,
    pub parcel_id: Uuid,
    pub parcel_name: String,
    pub payment_status: PaymentStatus,
    pub tracking_id: TrackingId,
    pub paid_at: DateTime<Utc>,
}

/// Converts a gateway amount in minor units (cents) into major units.
pub fn minor_to_major(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}

/// Converts a parcel cost into minor units, rounding to the nearest cent.
pub fn major_to_minor(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
