pub mod mock;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("checkout session {0} not found")]
    SessionNotFound(String),

    #[error("gateway rejected request: {0}")]
    Rejected(String),

    #[error("gateway transport error: {0}")]
    Transport(String),
}

/// A single-item checkout for one parcel.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub parcel_id: Uuid,
    pub parcel_name: String,
    pub customer_email: String,
    pub unit_amount: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "parcelId", default)]
    pub parcel_id: Option<String>,
    #[serde(rename = "parcelName", default)]
    pub parcel_name: Option<String>,
}

/// What the gateway knows about a checkout session after the customer returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: SessionPaymentStatus,
    /// Minor currency units.
    pub amount_total: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub payment_intent: Option<String>,
    pub metadata: SessionMetadata,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, GatewayError>;
}
