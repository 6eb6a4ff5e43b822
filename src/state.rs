use std::sync::Arc;

use tokio::sync::broadcast;

use crate::gateway::PaymentGateway;
use crate::identity::IdentityProvider;
use crate::models::tracking::TrackingLogEntry;
use crate::observability::metrics::Metrics;
use crate::store::Store;

/// Where the gateway sends the customer after checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub site_domain: String,
    pub currency: String,
}

impl CheckoutSettings {
    pub fn success_url(&self) -> String {
        format!(
            "{}/dashboard/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
            self.site_domain.trim_end_matches('/')
        )
    }

    pub fn cancel_url(&self) -> String {
        format!(
            "{}/dashboard/payment-cancelled",
            self.site_domain.trim_end_matches('/')
        )
    }
}

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub identity: Arc<dyn IdentityProvider>,
    pub checkout: CheckoutSettings,
    pub tracking_events_tx: broadcast::Sender<TrackingLogEntry>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        identity: Arc<dyn IdentityProvider>,
        checkout: CheckoutSettings,
        event_buffer_size: usize,
    ) -> Self {
        let (tracking_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store,
            gateway,
            identity,
            checkout,
            tracking_events_tx,
            metrics: Metrics::new(),
        }
    }
}
