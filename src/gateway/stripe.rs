use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

use crate::gateway::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, SessionDetails,
    SessionMetadata, SessionPaymentStatus,
};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe Checkout over the REST API.
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: SessionPaymentStatus,
    amount_total: Option<i64>,
    currency: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<StripeCustomerDetails>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: SessionMetadata,
}

#[derive(Deserialize)]
struct StripeCustomerDetails {
    email: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| GatewayError::Transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn rejection(response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| status.to_string());
        GatewayError::Rejected(message)
    }
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
    vec![
        ("mode", "payment".to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", request.currency.clone()),
        (
            "line_items[0][price_data][unit_amount]",
            request.unit_amount.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]",
            request.parcel_name.clone(),
        ),
        ("customer_email", request.customer_email.clone()),
        ("metadata[parcelId]", request.parcel_id.to_string()),
        ("metadata[parcelName]", request.parcel_name.clone()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
    ]
}

impl From<StripeSession> for SessionDetails {
    fn from(session: StripeSession) -> Self {
        let customer_email = session
            .customer_email
            .or_else(|| session.customer_details.and_then(|details| details.email));

        SessionDetails {
            id: session.id,
            payment_status: session.payment_status,
            amount_total: session.amount_total.unwrap_or_default(),
            currency: session.currency.unwrap_or_default(),
            customer_email,
            payment_intent: session.payment_intent,
            metadata: session.metadata,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(&request))
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            warn!(parcel_id = %request.parcel_id, error = %err, "stripe refused checkout session");
            return Err(err);
        }

        let session: StripeSession = response
            .json()
            .await
            .map_err(|err| GatewayError::Transport(format!("invalid session payload: {err}")))?;
        let url = session
            .url
            .ok_or_else(|| GatewayError::Rejected("session has no redirect url".to_string()))?;

        info!(session_id = %session.id, parcel_id = %request.parcel_id, "stripe checkout session created");
        Ok(CheckoutSession { id: session.id, url })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(GatewayError::SessionNotFound(session_id.to_string())),
            status if status.is_success() => {
                let session: StripeSession = response.json().await.map_err(|err| {
                    GatewayError::Transport(format!("invalid session payload: {err}"))
                })?;
                Ok(session.into())
            }
            _ => Err(Self::rejection(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{StripeSession, checkout_form};
    use crate::gateway::{CheckoutRequest, SessionDetails, SessionPaymentStatus};

    #[test]
    fn checkout_form_carries_parcel_metadata() {
        let parcel_id = Uuid::new_v4();
        let request = CheckoutRequest {
            parcel_id,
            parcel_name: "books".to_string(),
            customer_email: "a@x.com".to_string(),
            unit_amount: 50_000,
            currency: "usd".to_string(),
            success_url: "http://site/ok".to_string(),
            cancel_url: "http://site/cancel".to_string(),
        };

        let form = checkout_form(&request);
        let value = |key: &str| {
            form.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.clone())
        };

        assert_eq!(value("mode").as_deref(), Some("payment"));
        assert_eq!(value("line_items[0][price_data][unit_amount]").as_deref(), Some("50000"));
        assert_eq!(value("metadata[parcelId]"), Some(parcel_id.to_string()));
    }

    #[test]
    fn session_payload_maps_to_details() {
        let payload = serde_json::json!({
            "id": "cs_test_1",
            "url": null,
            "payment_status": "paid",
            "amount_total": 50000,
            "currency": "usd",
            "customer_email": null,
            "customer_details": { "email": "a@x.com" },
            "payment_intent": "pi_123",
            "metadata": { "parcelId": "abc", "parcelName": "books" }
        });

        let session: StripeSession = serde_json::from_value(payload).unwrap();
        let details = SessionDetails::from(session);

        assert_eq!(details.payment_status, SessionPaymentStatus::Paid);
        assert_eq!(details.amount_total, 50_000);
        assert_eq!(details.customer_email.as_deref(), Some("a@x.com"));
        assert_eq!(details.payment_intent.as_deref(), Some("pi_123"));
        assert_eq!(details.metadata.parcel_id.as_deref(), Some("abc"));
    }
}
