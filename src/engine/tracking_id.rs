use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::warn;

use crate::error::AppError;
use crate::models::tracking::TrackingId;
use crate::store::ParcelStore;

const MAX_ALLOCATION_ATTEMPTS: usize = 5;

/// `TRK-YYYYMMDD-XXXXXXXX` using the UTC date and 32 bits of OS randomness.
pub fn generate() -> TrackingId {
    generate_at(Utc::now(), &mut OsRng)
}

pub fn generate_at<R: RngCore + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> TrackingId {
    let mut bytes = [0u8; 4];
    rng.fill_bytes(&mut bytes);

    TrackingId::new(format!(
        "TRK-{}-{:08X}",
        now.format("%Y%m%d"),
        u32::from_be_bytes(bytes)
    ))
}

/// Generates ids until one is not already stamped on a parcel.
pub async fn allocate<S>(parcels: &S) -> Result<TrackingId, AppError>
where
    S: ParcelStore + ?Sized,
{
    allocate_with(parcels, generate).await
}

async fn allocate_with<S, F>(parcels: &S, mut next: F) -> Result<TrackingId, AppError>
where
    S: ParcelStore + ?Sized,
    F: FnMut() -> TrackingId,
{
    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let candidate = next();
        if !parcels.tracking_id_in_use(&candidate).await? {
            return Ok(candidate);
        }
        warn!(tracking_id = %candidate, attempt, "tracking id collision");
    }

    Err(AppError::Internal(format!(
        "no free tracking id after {MAX_ALLOCATION_ATTEMPTS} attempts"
    )))
}
