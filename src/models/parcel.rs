use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tracking::TrackingId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

/// Delivery lifecycle of a paid parcel.
///
/// Transitions are closed: see [`DeliveryStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[serde(rename = "pending-pickup")]
    PendingPickup,
    DriverAssigned,
    RiderArriving,
    ParcelPickedUp,
    ParcelDelivered,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::PendingPickup,
        DeliveryStatus::DriverAssigned,
        DeliveryStatus::RiderArriving,
        DeliveryStatus::ParcelPickedUp,
        DeliveryStatus::ParcelDelivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::PendingPickup => "pending-pickup",
            DeliveryStatus::DriverAssigned => "driver_assigned",
            DeliveryStatus::RiderArriving => "rider_arriving",
            DeliveryStatus::ParcelPickedUp => "parcel_picked_up",
            DeliveryStatus::ParcelDelivered => "parcel_delivered",
        }
    }

    /// Human readable form used in tracking log details.
    pub fn describe(&self) -> String {
        self.as_str().replace('_', " ")
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        matches!(
            (self, next),
            (PendingPickup, DriverAssigned)
                | (DriverAssigned, RiderArriving)
                | (DriverAssigned, PendingPickup)
                | (RiderArriving, ParcelPickedUp)
                | (ParcelPickedUp, ParcelDelivered)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| format!("unknown delivery status: {raw}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiderRef {
    pub rider_id: Uuid,
    pub rider_name: String,
    pub rider_email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parcel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parcel_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_district: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: Uuid,
    pub sender_email: String,
    pub parcel_name: String,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub delivery_status: Option<DeliveryStatus>,
    pub tracking_id: Option<TrackingId>,
    #[serde(flatten)]
    pub rider: Option<RiderRef>,
    #[serde(flatten)]
    pub details: ParcelDetails,
}

impl Parcel {
    pub fn new(
        sender_email: impl Into<String>,
        parcel_name: impl Into<String>,
        cost: f64,
        details: ParcelDetails,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_email: sender_email.into(),
            parcel_name: parcel_name.into(),
            cost,
            created_at: Utc::now(),
            payment_status: PaymentStatus::Unpaid,
            delivery_status: None,
            tracking_id: None,
            rider: None,
            details,
        }
    }

    /// A rider is attached and the parcel has not reached its destination.
    pub fn has_active_assignment(&self) -> bool {
        self.rider.is_some() && self.delivery_status != Some(DeliveryStatus::ParcelDelivered)
    }
}

/// Atomic change applied by the store only if the parcel is still in `from`.
#[derive(Debug, Clone)]
pub struct ParcelTransition {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
    pub rider: RiderChange,
}

#[derive(Debug, Clone)]
pub enum RiderChange {
    Keep,
    Assign(RiderRef),
    Clear,
}
