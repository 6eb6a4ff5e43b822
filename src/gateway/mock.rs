use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::gateway::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, SessionDetails,
    SessionMetadata, SessionPaymentStatus,
};

/// In-process gateway used for local runs and tests.
///
/// With `auto_pay` every created session is immediately reported as paid,
/// which lets the checkout redirect be followed without a real provider.
pub struct MockGateway {
    sessions: DashMap<String, SessionDetails>,
    checkout_base_url: String,
    auto_pay: bool,
}

impl MockGateway {
    pub fn new(checkout_base_url: impl Into<String>, auto_pay: bool) -> Self {
        Self {
            sessions: DashMap::new(),
            checkout_base_url: checkout_base_url.into(),
            auto_pay,
        }
    }

    pub fn insert_session(&self, details: SessionDetails) {
        self.sessions.insert(details.id.clone(), details);
    }

    /// Simulates the customer finishing checkout. Returns false for unknown sessions.
    pub fn complete_session(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.payment_status = SessionPaymentStatus::Paid;
                session
                    .payment_intent
                    .get_or_insert_with(|| format!("mock_pi_{}", Uuid::new_v4().simple()));
                true
            }
            None => false,
        }
    }

    pub fn session(&self, session_id: &str) -> Option<SessionDetails> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if request.unit_amount <= 0 {
            return Err(GatewayError::Rejected(
                "amount must be greater than zero".to_string(),
            ));
        }

        let id = format!("cs_mock_{}", Uuid::new_v4().simple());
        let details = SessionDetails {
            id: id.clone(),
            payment_status: SessionPaymentStatus::Unpaid,
            amount_total: request.unit_amount,
            currency: request.currency,
            customer_email: Some(request.customer_email),
            payment_intent: None,
            metadata: SessionMetadata {
                parcel_id: Some(request.parcel_id.to_string()),
                parcel_name: Some(request.parcel_name),
            },
        };
        self.sessions.insert(id.clone(), details);

        if self.auto_pay {
            self.complete_session(&id);
            debug!(session_id = %id, "mock session auto-paid");
        }

        info!(session_id = %id, parcel_id = %request.parcel_id, "mock checkout session created");
        Ok(CheckoutSession {
            url: format!("{}/{}", self.checkout_base_url.trim_end_matches('/'), id),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, GatewayError> {
        self.session(session_id)
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::MockGateway;
    use crate::gateway::{CheckoutRequest, GatewayError, PaymentGateway, SessionPaymentStatus};

    fn request(amount: i64) -> CheckoutRequest {
        CheckoutRequest {
            parcel_id: Uuid::new_v4(),
            parcel_name: "books".to_string(),
            customer_email: "a@x.com".to_string(),
            unit_amount: amount,
            currency: "usd".to_string(),
            success_url: "http://site/ok".to_string(),
            cancel_url: "http://site/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn session_starts_unpaid_until_completed() {
        let gateway = MockGateway::new("http://pay.local/checkout", false);
        let session = gateway.create_checkout_session(request(1_000)).await.unwrap();
        assert!(session.url.ends_with(&session.id));

        let details = gateway.retrieve_session(&session.id).await.unwrap();
        assert_eq!(details.payment_status, SessionPaymentStatus::Unpaid);
        assert!(details.payment_intent.is_none());

        assert!(gateway.complete_session(&session.id));
        let details = gateway.retrieve_session(&session.id).await.unwrap();
        assert_eq!(details.payment_status, SessionPaymentStatus::Paid);
        assert!(details.payment_intent.is_some());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let gateway = MockGateway::new("http://pay.local/checkout", true);
        let err = gateway.retrieve_session("cs_missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let gateway = MockGateway::new("http://pay.local/checkout", true);
        assert!(gateway.create_checkout_session(request(0)).await.is_err());
    }
}
