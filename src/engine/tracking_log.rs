use chrono::Utc;
use tracing::info;

use crate::error::AppError;
use crate::models::parcel::DeliveryStatus;
use crate::models::tracking::{TrackingId, TrackingLogEntry};
use crate::state::AppState;
use crate::store::TrackingLogStore;

/// Records one status change and fans it out to live subscribers.
pub async fn append(
    state: &AppState,
    tracking_id: &TrackingId,
    status: DeliveryStatus,
) -> Result<TrackingLogEntry, AppError> {
    let entry = new_entry(tracking_id, status);
    state.store.append_log(entry.clone()).await?;
    publish(state, &entry);
    Ok(entry)
}

/// Writes the opening `pending-pickup` entry unless the tracking id already
/// has history. Safe to call from every confirmation of the same payment.
pub async fn record_first(
    state: &AppState,
    tracking_id: &TrackingId,
) -> Result<Option<TrackingLogEntry>, AppError> {
    let entry = new_entry(tracking_id, DeliveryStatus::PendingPickup);
    if !state.store.append_first_log(entry.clone()).await? {
        return Ok(None);
    }
    publish(state, &entry);
    Ok(Some(entry))
}

fn new_entry(tracking_id: &TrackingId, status: DeliveryStatus) -> TrackingLogEntry {
    TrackingLogEntry {
        tracking_id: tracking_id.clone(),
        status,
        details: status.describe(),
        created_at: Utc::now(),
    }
}

fn publish(state: &AppState, entry: &TrackingLogEntry) {
    state
        .metrics
        .delivery_transitions_total
        .with_label_values(&[entry.status.as_str()])
        .inc();
    // No receivers is fine; nobody is watching.
    let _ = state.tracking_events_tx.send(entry.clone());

    info!(tracking_id = %entry.tracking_id, status = %entry.status, "tracking log appended");
}

pub async fn history(
    state: &AppState,
    tracking_id: &TrackingId,
) -> Result<Vec<TrackingLogEntry>, AppError> {
    Ok(state.store.logs_for(tracking_id).await?)
}

#[cfg(test)]
mod tests {
    use super::{append, history, record_first};
    use crate::models::parcel::DeliveryStatus;
    use crate::models::tracking::TrackingId;
    use crate::state::testing::harness;

    #[tokio::test]
    async fn appended_entries_are_readable_in_order_and_broadcast() {
        let h = harness();
        let mut events = h.state.tracking_events_tx.subscribe();
        let tracking_id = TrackingId::new("TRK-20240101-0000ABCD");

        append(&h.state, &tracking_id, DeliveryStatus::PendingPickup)
            .await
            .unwrap();
        append(&h.state, &tracking_id, DeliveryStatus::DriverAssigned)
            .await
            .unwrap();

        let logs = history(&h.state, &tracking_id).await.unwrap();
        let statuses: Vec<_> = logs.iter().map(|entry| entry.status).collect();
        assert_eq!(
            statuses,
            vec![DeliveryStatus::PendingPickup, DeliveryStatus::DriverAssigned]
        );
        assert_eq!(logs[1].details, "driver assigned");

        let first = events.recv().await.unwrap();
        assert_eq!(first.status, DeliveryStatus::PendingPickup);
    }

    #[tokio::test]
    async fn unknown_tracking_id_has_empty_history() {
        let h = harness();
        let logs = history(&h.state, &TrackingId::new("TRK-20240101-FFFFFFFF"))
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn first_entry_is_recorded_once() {
        let h = harness();
        let tracking_id = TrackingId::new("TRK-20240101-0000ABCE");

        assert!(record_first(&h.state, &tracking_id).await.unwrap().is_some());
        assert!(record_first(&h.state, &tracking_id).await.unwrap().is_none());

        let logs = history(&h.state, &tracking_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::PendingPickup);
    }
}
