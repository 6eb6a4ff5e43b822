//! Persistence ports.
//!
//! Each collection gets its own trait; [`Store`] bundles them so the
//! application state can hold a single injected handle. Uniqueness and
//! compare-and-set guarantees are part of the contract: adapters must enforce
//! them atomically rather than relying on a preceding read.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::parcel::{DeliveryStatus, Parcel, ParcelTransition, PaymentStatus};
use crate::models::payment::Payment;
use crate::models::rider::{ApplicationStatus, RiderApplication, WorkStatus};
use crate::models::tracking::{TrackingId, TrackingLogEntry};
use crate::models::user::{Role, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct ParcelFilter {
    pub sender_email: Option<String>,
    pub rider_email: Option<String>,
    pub delivery_status: Option<DeliveryStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub limit: Option<usize>,
}

impl ParcelFilter {
    pub fn matches(&self, parcel: &Parcel) -> bool {
        let sender_ok = self
            .sender_email
            .as_deref()
            .is_none_or(|email| parcel.sender_email == email);
        let rider_ok = self.rider_email.as_deref().is_none_or(|email| {
            parcel
                .rider
                .as_ref()
                .is_some_and(|rider| rider.rider_email == email)
        });
        let delivery_ok = self
            .delivery_status
            .is_none_or(|status| parcel.delivery_status == Some(status));
        let payment_ok = self
            .payment_status
            .is_none_or(|status| parcel.payment_status == status);

        sender_ok && rider_ok && delivery_ok && payment_ok
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiderFilter {
    pub status: Option<ApplicationStatus>,
    pub district: Option<String>,
    pub work_status: Option<WorkStatus>,
}

impl RiderFilter {
    pub fn matches(&self, rider: &RiderApplication) -> bool {
        self.status.is_none_or(|status| rider.status == status)
            && self
                .district
                .as_deref()
                .is_none_or(|district| rider.district == district)
            && self
                .work_status
                .is_none_or(|work_status| rider.work_status == work_status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: DeliveryStatus,
    pub count: usize,
}

/// Result of the unpaid -> paid compare-and-set.
#[derive(Debug, Clone)]
pub enum MarkPaid {
    Marked(Parcel),
    AlreadyPaid(Parcel),
    NotFound,
}

/// Result of a delete that refuses records still tied to a live delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveResult {
    Removed,
    InUse,
    NotFound,
}

/// Result of an application status change.
#[derive(Debug, Clone)]
pub enum RiderUpdate {
    Applied(RiderApplication),
    /// Rejection refused while the rider is out on a delivery.
    InDelivery,
    NotFound,
}

/// Result of a guarded delivery-status change.
#[derive(Debug, Clone)]
pub enum TransitionResult {
    Applied(Parcel),
    Stale { current: Option<DeliveryStatus> },
    NotFound,
}

#[async_trait]
pub trait ParcelStore: Send + Sync {
    async fn insert_parcel(&self, parcel: Parcel) -> StoreResult<Parcel>;
    async fn find_parcel(&self, id: Uuid) -> StoreResult<Option<Parcel>>;
    /// Newest first.
    async fn list_parcels(&self, filter: &ParcelFilter) -> StoreResult<Vec<Parcel>>;
    /// Refuses parcels with an active rider assignment.
    async fn delete_parcel(&self, id: Uuid) -> StoreResult<RemoveResult>;
    async fn mark_parcel_paid(&self, id: Uuid, tracking_id: &TrackingId) -> StoreResult<MarkPaid>;
    /// Undoes [`ParcelStore::mark_parcel_paid`] if the parcel still carries `tracking_id`.
    async fn revert_parcel_payment(&self, id: Uuid, tracking_id: &TrackingId) -> StoreResult<()>;
    async fn transition_parcel(
        &self,
        id: Uuid,
        transition: ParcelTransition,
    ) -> StoreResult<TransitionResult>;
    async fn count_by_delivery_status(&self, filter: &ParcelFilter) -> StoreResult<Vec<StatusCount>>;
    async fn tracking_id_in_use(&self, tracking_id: &TrackingId) -> StoreResult<bool>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] if the transaction id is already recorded.
    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment>;
    async fn find_payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>>;
    /// Newest first.
    async fn list_payments(&self, customer_email: Option<&str>) -> StoreResult<Vec<Payment>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] if the email is taken.
    async fn insert_user(&self, user: User) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self, search: Option<&str>, limit: Option<usize>) -> StoreResult<Vec<User>>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>>;
    async fn set_user_role_by_email(&self, email: &str, role: Role) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait RiderStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] if the email has an active application.
    async fn insert_rider(&self, rider: RiderApplication) -> StoreResult<RiderApplication>;
    async fn find_rider(&self, id: Uuid) -> StoreResult<Option<RiderApplication>>;
    async fn list_riders(&self, filter: &RiderFilter) -> StoreResult<Vec<RiderApplication>>;
    /// Entering `approved` from another status resets the rider to available;
    /// otherwise the work status is left alone.
    async fn set_rider_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
    ) -> StoreResult<RiderUpdate>;
    /// Moves an approved, available rider to in-delivery. False if the rider
    /// is missing, not approved or already busy.
    async fn claim_rider(&self, id: Uuid) -> StoreResult<bool>;
    async fn set_work_status(
        &self,
        id: Uuid,
        work_status: WorkStatus,
    ) -> StoreResult<Option<RiderApplication>>;
    /// Refuses riders that are out on a delivery.
    async fn delete_rider(&self, id: Uuid) -> StoreResult<RemoveResult>;
}

#[async_trait]
pub trait TrackingLogStore: Send + Sync {
    async fn append_log(&self, entry: TrackingLogEntry) -> StoreResult<()>;
    /// Appends only if the tracking id has no entries yet. Returns whether it did.
    async fn append_first_log(&self, entry: TrackingLogEntry) -> StoreResult<bool>;
    /// Oldest first.
    async fn logs_for(&self, tracking_id: &TrackingId) -> StoreResult<Vec<TrackingLogEntry>>;
}

pub trait Store: ParcelStore + PaymentStore + UserStore + RiderStore + TrackingLogStore {}

impl<T> Store for T where T: ParcelStore + PaymentStore + UserStore + RiderStore + TrackingLogStore {}
