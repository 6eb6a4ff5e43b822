//! Turns a returning checkout session into durable parcel and payment state.
//!
//! The sequence is: look the session up at the gateway, short-circuit if the
//! transaction was already recorded, refuse unpaid sessions, then mark the
//! parcel paid, record the payment and log the first delivery status. The
//! store enforces transaction-id uniqueness and the unpaid -> paid
//! compare-and-set, so concurrent confirmations of one session converge on a
//! single payment and a single tracking id.

use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::{tracking_id, tracking_log};
use crate::error::AppError;
use crate::gateway::{GatewayError, SessionDetails, SessionPaymentStatus};
use crate::models::parcel::{Parcel, PaymentStatus};
use crate::models::payment::{Payment, minor_to_major};
use crate::models::tracking::TrackingId;
use crate::state::AppState;
use crate::store::{MarkPaid, ParcelStore, PaymentStore, StoreError};

#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    Confirmed {
        tracking_id: TrackingId,
        payment: Payment,
    },
    AlreadyProcessed {
        tracking_id: TrackingId,
        payment: Payment,
    },
    NotPaid {
        session_id: String,
        payment_status: SessionPaymentStatus,
    },
    ParcelNotFound {
        parcel_id: String,
    },
}

impl ConfirmationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Confirmed { .. } => "confirmed",
            ConfirmationOutcome::AlreadyProcessed { .. } => "already_processed",
            ConfirmationOutcome::NotPaid { .. } => "not_paid",
            ConfirmationOutcome::ParcelNotFound { .. } => "parcel_not_found",
        }
    }

    fn already_processed(payment: Payment) -> Self {
        ConfirmationOutcome::AlreadyProcessed {
            tracking_id: payment.tracking_id.clone(),
            payment,
        }
    }
}

pub async fn confirm_payment(
    state: &AppState,
    session_id: &str,
) -> Result<ConfirmationOutcome, AppError> {
    let start = Instant::now();
    let result = reconcile(state, session_id).await;

    let outcome = match &result {
        Ok(outcome) => outcome.label(),
        Err(_) => "error",
    };
    state
        .metrics
        .payment_confirmation_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .payment_confirmations_total
        .with_label_values(&[outcome])
        .inc();

    result
}

async fn reconcile(state: &AppState, session_id: &str) -> Result<ConfirmationOutcome, AppError> {
    let session = state.gateway.retrieve_session(session_id).await?;

    if let Some(transaction_id) = session.payment_intent.as_deref() {
        if let Some(existing) = state.store.find_payment_by_transaction(transaction_id).await? {
            info!(
                session_id,
                transaction_id,
                tracking_id = %existing.tracking_id,
                "payment already recorded"
            );
            // Heals a confirmation that recorded the payment but died before logging.
            tracking_log::record_first(state, &existing.tracking_id).await?;
            return Ok(ConfirmationOutcome::already_processed(existing));
        }
    }

    if session.payment_status != SessionPaymentStatus::Paid {
        info!(session_id, payment_status = ?session.payment_status, "session not paid");
        return Ok(ConfirmationOutcome::NotPaid {
            session_id: session.id,
            payment_status: session.payment_status,
        });
    }

    let transaction_id = session.payment_intent.clone().ok_or_else(|| {
        AppError::Gateway(GatewayError::Rejected(format!(
            "paid session {} has no payment intent",
            session.id
        )))
    })?;

    let raw_parcel_id = session.metadata.parcel_id.clone().unwrap_or_default();
    let Ok(parcel_id) = Uuid::parse_str(&raw_parcel_id) else {
        warn!(session_id, parcel_id = %raw_parcel_id, "session metadata has no usable parcel id");
        return Ok(ConfirmationOutcome::ParcelNotFound {
            parcel_id: raw_parcel_id,
        });
    };

    let candidate = tracking_id::allocate(state.store.as_ref()).await?;
    let (parcel, marked) = match state.store.mark_parcel_paid(parcel_id, &candidate).await? {
        MarkPaid::Marked(parcel) => (parcel, true),
        MarkPaid::AlreadyPaid(parcel) => (parcel, false),
        MarkPaid::NotFound => {
            warn!(session_id, %parcel_id, "paid session references missing parcel");
            return Ok(ConfirmationOutcome::ParcelNotFound {
                parcel_id: raw_parcel_id,
            });
        }
    };

    let tracking_id = parcel
        .tracking_id
        .clone()
        .ok_or_else(|| AppError::Internal(format!("paid parcel {parcel_id} has no tracking id")))?;
    let payment = payment_record(&session, &parcel, transaction_id.clone(), tracking_id.clone());

    let outcome = match state.store.insert_payment(payment).await {
        Ok(payment) => ConfirmationOutcome::Confirmed {
            tracking_id: tracking_id.clone(),
            payment,
        },
        Err(StoreError::DuplicateKey(_)) => {
            let existing = state
                .store
                .find_payment_by_transaction(&transaction_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "payment {transaction_id} reported duplicate but is missing"
                    ))
                })?;
            info!(session_id, %transaction_id, "concurrent confirmation recorded payment first");
            tracking_log::record_first(state, &existing.tracking_id).await?;
            ConfirmationOutcome::already_processed(existing)
        }
        Err(err) => {
            if marked {
                if let Err(revert_err) = state.store.revert_parcel_payment(parcel_id, &tracking_id).await {
                    error!(
                        %parcel_id,
                        tracking_id = %tracking_id,
                        error = %revert_err,
                        "failed to roll back parcel after payment insert failure"
                    );
                }
            }
            return Err(err.into());
        }
    };

    if marked {
        tracking_log::record_first(state, &tracking_id).await?;
    }

    info!(
        session_id,
        %parcel_id,
        %transaction_id,
        tracking_id = %tracking_id,
        outcome = outcome.label(),
        "payment confirmed"
    );
    Ok(outcome)
}

fn payment_record(
    session: &SessionDetails,
    parcel: &Parcel,
    transaction_id: String,
    tracking_id: TrackingId,
) -> Payment {
    Payment {
        transaction_id,
        amount: minor_to_major(session.amount_total),
        currency: session.currency.clone(),
        customer_email: session
            .customer_email
            .clone()
            .unwrap_or_else(|| parcel.sender_email.clone()),
        parcel_id: parcel.id,
        parcel_name: session
            .metadata
            .parcel_name
            .clone()
            .unwrap_or_else(|| parcel.parcel_name.clone()),
        payment_status: PaymentStatus::Paid,
        tracking_id,
        paid_at: Utc::now(),
    }
}
