use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::tracking_log;
use crate::error::AppError;
use crate::models::parcel::{DeliveryStatus, Parcel, ParcelTransition, RiderChange, RiderRef};
use crate::models::rider::{ApplicationStatus, WorkStatus};
use crate::models::tracking::TrackingId;
use crate::state::AppState;
use crate::store::{ParcelStore, RiderStore, TransitionResult};

/// Hands a pending-pickup parcel to an approved, available rider.
pub async fn assign_rider(
    state: &AppState,
    parcel_id: Uuid,
    rider: RiderRef,
) -> Result<Parcel, AppError> {
    let parcel = load_parcel(state, parcel_id).await?;
    let (from, tracking_id) = validate(&parcel, DeliveryStatus::DriverAssigned)?;

    let application = state
        .store
        .find_rider(rider.rider_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {} not found", rider.rider_id)))?;
    if application.status != ApplicationStatus::Approved {
        return Err(AppError::BadRequest(format!(
            "rider {} is not approved",
            rider.rider_id
        )));
    }
    if application.email != rider.rider_email {
        return Err(AppError::BadRequest(format!(
            "rider email does not match application {}",
            rider.rider_id
        )));
    }

    commit_assignment(state, parcel_id, from, &tracking_id, rider).await
}

/// Claims the rider, then moves the parcel. Each later failure undoes the
/// earlier steps so neither side is left half assigned.
async fn commit_assignment(
    state: &AppState,
    parcel_id: Uuid,
    from: DeliveryStatus,
    tracking_id: &TrackingId,
    rider: RiderRef,
) -> Result<Parcel, AppError> {
    let rider_id = rider.rider_id;
    if !state.store.claim_rider(rider_id).await? {
        return Err(AppError::Conflict(format!(
            "rider {rider_id} is not available for a delivery"
        )));
    }

    let transition = ParcelTransition {
        from,
        to: DeliveryStatus::DriverAssigned,
        rider: RiderChange::Assign(rider),
    };
    let updated = match apply(state, parcel_id, transition).await {
        Ok(updated) => updated,
        Err(err) => {
            release_after_failure(state, parcel_id, rider_id).await;
            return Err(err);
        }
    };

    if let Err(err) = tracking_log::append(state, tracking_id, DeliveryStatus::DriverAssigned).await {
        let undo = ParcelTransition {
            from: DeliveryStatus::DriverAssigned,
            to: from,
            rider: RiderChange::Clear,
        };
        undo_transition(state, parcel_id, undo).await;
        release_after_failure(state, parcel_id, rider_id).await;
        return Err(err);
    }

    info!(%parcel_id, %rider_id, tracking_id = %tracking_id, "rider assigned");
    Ok(updated)
}

/// Moves a parcel along the delivery lifecycle. Reaching `driver_assigned`
/// goes through [`assign_rider`] instead.
pub async fn set_delivery_status(
    state: &AppState,
    parcel_id: Uuid,
    next: DeliveryStatus,
) -> Result<Parcel, AppError> {
    if next == DeliveryStatus::DriverAssigned {
        return Err(AppError::BadRequest(
            "driver_assigned is set by rider assignment".to_string(),
        ));
    }

    let parcel = load_parcel(state, parcel_id).await?;
    let (from, tracking_id) = validate(&parcel, next)?;

    // A declined pickup returns the parcel to the pool.
    let rider_change = if next == DeliveryStatus::PendingPickup {
        RiderChange::Clear
    } else {
        RiderChange::Keep
    };

    let updated = apply(
        state,
        parcel_id,
        ParcelTransition {
            from,
            to: next,
            rider: rider_change,
        },
    )
    .await?;

    if let Err(err) = tracking_log::append(state, &tracking_id, next).await {
        let rider = match (&parcel.rider, next) {
            (Some(rider), DeliveryStatus::PendingPickup) => RiderChange::Assign(rider.clone()),
            _ => RiderChange::Keep,
        };
        undo_transition(state, parcel_id, ParcelTransition { from: next, to: from, rider }).await;
        return Err(err);
    }

    if matches!(
        next,
        DeliveryStatus::PendingPickup | DeliveryStatus::ParcelDelivered
    ) {
        if let Some(rider) = &parcel.rider {
            let released = state
                .store
                .set_work_status(rider.rider_id, WorkStatus::Available)
                .await?;
            if released.is_none() {
                warn!(%parcel_id, rider_id = %rider.rider_id, "assigned rider no longer exists");
            }
        }
    }

    info!(%parcel_id, from = %from, to = %next, tracking_id = %tracking_id, "delivery status updated");
    Ok(updated)
}

async fn release_after_failure(state: &AppState, parcel_id: Uuid, rider_id: Uuid) {
    if let Err(err) = state
        .store
        .set_work_status(rider_id, WorkStatus::Available)
        .await
    {
        error!(%parcel_id, %rider_id, error = %err, "failed to release rider after aborted assignment");
    }
}

async fn undo_transition(state: &AppState, parcel_id: Uuid, transition: ParcelTransition) {
    let (from, to) = (transition.from, transition.to);
    if let Err(err) = apply(state, parcel_id, transition).await {
        error!(%parcel_id, from = %from, to = %to, error = %err, "failed to undo parcel transition");
    }
}

async fn load_parcel(state: &AppState, parcel_id: Uuid) -> Result<Parcel, AppError> {
    state
        .store
        .find_parcel(parcel_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))
}

fn validate(
    parcel: &Parcel,
    next: DeliveryStatus,
) -> Result<(DeliveryStatus, TrackingId), AppError> {
    let (Some(from), Some(tracking_id)) = (parcel.delivery_status, parcel.tracking_id.clone())
    else {
        return Err(AppError::InvalidTransition {
            from: "unpaid".to_string(),
            to: next,
        });
    };

    if !from.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: next,
        });
    }

    Ok((from, tracking_id))
}

async fn apply(
    state: &AppState,
    parcel_id: Uuid,
    transition: ParcelTransition,
) -> Result<Parcel, AppError> {
    match state.store.transition_parcel(parcel_id, transition).await? {
        TransitionResult::Applied(parcel) => Ok(parcel),
        TransitionResult::NotFound => Err(AppError::NotFound(format!("parcel {parcel_id} not found"))),
        TransitionResult::Stale { current } => Err(AppError::Conflict(format!(
            "parcel {parcel_id} changed concurrently (now {})",
            current.map_or("unpaid", |status| status.as_str())
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{assign_rider, commit_assignment, set_delivery_status};
    use crate::error::AppError;
    use crate::models::parcel::{DeliveryStatus, Parcel, ParcelDetails, RiderRef};
    use crate::models::rider::{ApplicationStatus, RiderApplication, WorkStatus};
    use crate::models::tracking::TrackingId;
    use crate::state::testing::{Harness, harness};
    use crate::store::{ParcelStore, RiderStore, TrackingLogStore};

    async fn paid_parcel(h: &Harness) -> (Parcel, TrackingId) {
        let parcel = h
            .store
            .insert_parcel(Parcel::new("a@x.com", "books", 500.0, ParcelDetails::default()))
            .await
            .unwrap();
        let tracking_id = TrackingId::new("TRK-20240101-0000BEEF");
        h.store.mark_parcel_paid(parcel.id, &tracking_id).await.unwrap();
        (parcel, tracking_id)
    }

    async fn approved_rider(h: &Harness, email: &str) -> RiderRef {
        let rider = h
            .store
            .insert_rider(RiderApplication {
                id: Uuid::new_v4(),
                email: email.to_string(),
                name: "Rita".to_string(),
                district: "Dhaka".to_string(),
                status: ApplicationStatus::Approved,
                work_status: WorkStatus::Available,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        RiderRef {
            rider_id: rider.id,
            rider_name: rider.name,
            rider_email: rider.email,
        }
    }

    #[tokio::test]
    async fn assignment_marks_rider_busy_and_logs_once() {
        let h = harness();
        let (parcel, tracking_id) = paid_parcel(&h).await;
        let rider = approved_rider(&h, "r@x.com").await;

        let updated = assign_rider(&h.state, parcel.id, rider.clone()).await.unwrap();

        assert_eq!(updated.delivery_status, Some(DeliveryStatus::DriverAssigned));
        assert_eq!(updated.rider, Some(rider.clone()));
        let application = h.store.find_rider(rider.rider_id).await.unwrap().unwrap();
        assert_eq!(application.work_status, WorkStatus::InDelivery);

        let logs = h.store.logs_for(&tracking_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::DriverAssigned);
        assert_eq!(logs[0].details, "driver assigned");
    }

    #[tokio::test]
    async fn busy_rider_cannot_take_a_second_parcel() {
        let h = harness();
        let (first, _) = paid_parcel(&h).await;
        let (second, _) = paid_parcel(&h).await;
        let rider = approved_rider(&h, "r@x.com").await;

        assign_rider(&h.state, first.id, rider.clone()).await.unwrap();
        let err = assign_rider(&h.state, second.id, rider).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn full_lifecycle_logs_every_step_and_frees_rider() {
        let h = harness();
        let (parcel, tracking_id) = paid_parcel(&h).await;
        let rider = approved_rider(&h, "r@x.com").await;
        assign_rider(&h.state, parcel.id, rider.clone()).await.unwrap();

        for next in [
            DeliveryStatus::RiderArriving,
            DeliveryStatus::ParcelPickedUp,
            DeliveryStatus::ParcelDelivered,
        ] {
            let before = h.store.logs_for(&tracking_id).await.unwrap().len();
            let updated = set_delivery_status(&h.state, parcel.id, next).await.unwrap();
            let logs = h.store.logs_for(&tracking_id).await.unwrap();

            assert_eq!(updated.delivery_status, Some(next));
            assert_eq!(logs.len(), before + 1);
            assert_eq!(logs.last().unwrap().status, next);
        }

        let application = h.store.find_rider(rider.rider_id).await.unwrap().unwrap();
        assert_eq!(application.work_status, WorkStatus::Available);
    }

    #[tokio::test]
    async fn declined_pickup_clears_rider() {
        let h = harness();
        let (parcel, _) = paid_parcel(&h).await;
        let rider = approved_rider(&h, "r@x.com").await;
        assign_rider(&h.state, parcel.id, rider.clone()).await.unwrap();

        let updated = set_delivery_status(&h.state, parcel.id, DeliveryStatus::PendingPickup)
            .await
            .unwrap();

        assert!(updated.rider.is_none());
        let application = h.store.find_rider(rider.rider_id).await.unwrap().unwrap();
        assert_eq!(application.work_status, WorkStatus::Available);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_without_log() {
        let h = harness();
        let (parcel, tracking_id) = paid_parcel(&h).await;

        let err = set_delivery_status(&h.state, parcel.id, DeliveryStatus::ParcelDelivered)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert!(h.store.logs_for(&tracking_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unpaid_parcel_cannot_move() {
        let h = harness();
        let parcel = h
            .store
            .insert_parcel(Parcel::new("a@x.com", "books", 500.0, ParcelDetails::default()))
            .await
            .unwrap();
        let rider = approved_rider(&h, "r@x.com").await;

        let err = assign_rider(&h.state, parcel.id, rider).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn driver_assigned_only_through_assignment() {
        let h = harness();
        let (parcel, _) = paid_parcel(&h).await;

        let err = set_delivery_status(&h.state, parcel.id, DeliveryStatus::DriverAssigned)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn stale_parcel_releases_the_claimed_rider() {
        let h = harness();
        let (parcel, tracking_id) = paid_parcel(&h).await;
        let winner = approved_rider(&h, "r@x.com").await;
        let loser = approved_rider(&h, "s@x.com").await;
        assign_rider(&h.state, parcel.id, winner.clone()).await.unwrap();

        // Loaded the parcel while it was still pending pickup.
        let err = commit_assignment(
            &h.state,
            parcel.id,
            DeliveryStatus::PendingPickup,
            &tracking_id,
            loser.clone(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let stored = h.store.find_parcel(parcel.id).await.unwrap().unwrap();
        assert_eq!(stored.rider, Some(winner));
        let application = h.store.find_rider(loser.rider_id).await.unwrap().unwrap();
        assert_eq!(application.work_status, WorkStatus::Available);
        assert_eq!(h.store.logs_for(&tracking_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_assignment_log_undoes_the_assignment() {
        let h = harness();
        let (parcel, tracking_id) = paid_parcel(&h).await;
        let rider = approved_rider(&h, "r@x.com").await;

        h.store.fail_log_appends.store(true, Ordering::SeqCst);
        let err = assign_rider(&h.state, parcel.id, rider.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));

        let stored = h.store.find_parcel(parcel.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, Some(DeliveryStatus::PendingPickup));
        assert!(stored.rider.is_none());
        let application = h.store.find_rider(rider.rider_id).await.unwrap().unwrap();
        assert_eq!(application.work_status, WorkStatus::Available);

        h.store.fail_log_appends.store(false, Ordering::SeqCst);
        assign_rider(&h.state, parcel.id, rider).await.unwrap();
        assert_eq!(h.store.logs_for(&tracking_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_status_log_keeps_parcel_and_rider_in_place() {
        let h = harness();
        let (parcel, _) = paid_parcel(&h).await;
        let rider = approved_rider(&h, "r@x.com").await;
        assign_rider(&h.state, parcel.id, rider.clone()).await.unwrap();

        h.store.fail_log_appends.store(true, Ordering::SeqCst);
        for next in [DeliveryStatus::RiderArriving, DeliveryStatus::PendingPickup] {
            let err = set_delivery_status(&h.state, parcel.id, next).await.unwrap_err();
            assert!(matches!(err, AppError::Store(_)));
        }

        let stored = h.store.find_parcel(parcel.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, Some(DeliveryStatus::DriverAssigned));
        assert_eq!(stored.rider, Some(rider.clone()));
        let application = h.store.find_rider(rider.rider_id).await.unwrap().unwrap();
        assert_eq!(application.work_status, WorkStatus::InDelivery);
    }
}
