use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub payment_confirmations_total: IntCounterVec,
    pub payment_confirmation_latency_seconds: HistogramVec,
    pub delivery_transitions_total: IntCounterVec,
    pub access_denied_total: IntCounterVec,
    pub tracking_subscribers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let payment_confirmations_total = IntCounterVec::new(
            Opts::new(
                "payment_confirmations_total",
                "Payment confirmations by outcome",
            ),
            &["outcome"],
        )
        .expect("valid payment_confirmations_total metric");

        let payment_confirmation_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "payment_confirmation_latency_seconds",
                "Latency of payment confirmation in seconds",
            ),
            &["outcome"],
        )
        .expect("valid payment_confirmation_latency_seconds metric");

        let delivery_transitions_total = IntCounterVec::new(
            Opts::new(
                "delivery_transitions_total",
                "Delivery status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid delivery_transitions_total metric");

        let access_denied_total = IntCounterVec::new(
            Opts::new("access_denied_total", "Requests rejected by the access guard"),
            &["reason"],
        )
        .expect("valid access_denied_total metric");

        let tracking_subscribers = IntGauge::new(
            "tracking_subscribers",
            "Connected live tracking websocket clients",
        )
        .expect("valid tracking_subscribers metric");

        registry
            .register(Box::new(payment_confirmations_total.clone()))
            .expect("register payment_confirmations_total");
        registry
            .register(Box::new(payment_confirmation_latency_seconds.clone()))
            .expect("register payment_confirmation_latency_seconds");
        registry
            .register(Box::new(delivery_transitions_total.clone()))
            .expect("register delivery_transitions_total");
        registry
            .register(Box::new(access_denied_total.clone()))
            .expect("register access_denied_total");
        registry
            .register(Box::new(tracking_subscribers.clone()))
            .expect("register tracking_subscribers");

        Self {
            registry,
            payment_confirmations_total,
            payment_confirmation_latency_seconds,
            delivery_transitions_total,
            access_denied_total,
            tracking_subscribers,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
