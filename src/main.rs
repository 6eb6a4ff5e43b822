use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_hub::api;
use delivery_hub::config::{Config, LogFormat};
use delivery_hub::engine::enrollment;
use delivery_hub::error::AppError;
use delivery_hub::gateway::PaymentGateway;
use delivery_hub::gateway::mock::MockGateway;
use delivery_hub::gateway::stripe::StripeGateway;
use delivery_hub::identity::IdentityProvider;
use delivery_hub::identity::firebase::FirebaseIdentityProvider;
use delivery_hub::identity::static_tokens::StaticIdentityProvider;
use delivery_hub::state::{AppState, CheckoutSettings};
use delivery_hub::store::memory::InMemoryStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let gateway = build_gateway(&config)?;
    let identity = build_identity(&config)?;

    let state = AppState::new(
        Arc::new(InMemoryStore::new()),
        gateway,
        identity,
        CheckoutSettings {
            site_domain: config.site_domain.clone(),
            currency: config.checkout_currency.clone(),
        },
        config.event_buffer_size,
    );
    enrollment::bootstrap_admins(&state, &config.admin_emails).await?;

    let app = api::rest::router(Arc::new(state));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn build_gateway(config: &Config) -> Result<Arc<dyn PaymentGateway>, AppError> {
    match &config.stripe_secret_key {
        Some(secret_key) => {
            tracing::info!(api_base = %config.stripe_api_base, "using stripe gateway");
            let gateway = StripeGateway::new(secret_key.clone(), config.stripe_api_base.clone())?;
            Ok(Arc::new(gateway))
        }
        None => {
            tracing::warn!(
                auto_pay = config.mock_gateway_auto_pay,
                "STRIPE_SECRET_KEY not set, using mock gateway"
            );
            let checkout_base = format!(
                "{}/mock-checkout",
                config.site_domain.trim_end_matches('/')
            );
            Ok(Arc::new(MockGateway::new(
                checkout_base,
                config.mock_gateway_auto_pay,
            )))
        }
    }
}

fn build_identity(config: &Config) -> Result<Arc<dyn IdentityProvider>, AppError> {
    match &config.firebase_api_key {
        Some(api_key) => {
            let provider =
                FirebaseIdentityProvider::new(api_key.clone(), config.firebase_lookup_url.clone())
                    .map_err(|err| AppError::Internal(format!("identity provider: {err}")))?;
            Ok(Arc::new(provider))
        }
        None => {
            tracing::warn!(
                tokens = config.dev_identity_tokens.len(),
                "FIREBASE_API_KEY not set, using static identity tokens"
            );
            Ok(Arc::new(StaticIdentityProvider::with_tokens(
                config.dev_identity_tokens.clone(),
            )))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
