use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::models::parcel::{
    DeliveryStatus, Parcel, ParcelTransition, PaymentStatus, RiderChange,
};
use crate::models::payment::Payment;
use crate::models::rider::{ApplicationStatus, RiderApplication, WorkStatus};
use crate::models::tracking::{TrackingId, TrackingLogEntry};
use crate::models::user::{Role, User};
use crate::store::{
    MarkPaid, ParcelFilter, ParcelStore, PaymentStore, RemoveResult, RiderFilter, RiderStore,
    RiderUpdate, StatusCount, StoreError, StoreResult, TrackingLogStore, TransitionResult,
    UserStore,
};

/// Document store backed by concurrent hash maps.
///
/// Unique keys are claimed through `DashMap::entry`, which holds the shard
/// lock for the duration of the check-and-insert.
#[derive(Default)]
pub struct InMemoryStore {
    parcels: DashMap<Uuid, Parcel>,
    payments: DashMap<String, Payment>,
    users: DashMap<Uuid, User>,
    user_emails: DashMap<String, Uuid>,
    riders: DashMap<Uuid, RiderApplication>,
    active_rider_emails: DashMap<String, Uuid>,
    tracking_logs: DashMap<TrackingId, Vec<TrackingLogEntry>>,
    #[cfg(test)]
    pub(crate) fail_payment_inserts: std::sync::atomic::AtomicBool,
    #[cfg(test)]
    pub(crate) fail_log_appends: std::sync::atomic::AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parcel_count(&self) -> usize {
        self.parcels.len()
    }

    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    pub fn tracking_log_count(&self) -> usize {
        self.tracking_logs.iter().map(|entry| entry.value().len()).sum()
    }

    #[cfg(test)]
    fn payment_writes_disabled(&self) -> bool {
        self.fail_payment_inserts
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn payment_writes_disabled(&self) -> bool {
        false
    }

    #[cfg(test)]
    fn log_writes_disabled(&self) -> bool {
        self.fail_log_appends.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn log_writes_disabled(&self) -> bool {
        false
    }
}

#[async_trait]
impl ParcelStore for InMemoryStore {
    async fn insert_parcel(&self, parcel: Parcel) -> StoreResult<Parcel> {
        match self.parcels.entry(parcel.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(format!("parcel {}", parcel.id))),
            Entry::Vacant(slot) => {
                slot.insert(parcel.clone());
                Ok(parcel)
            }
        }
    }

    async fn find_parcel(&self, id: Uuid) -> StoreResult<Option<Parcel>> {
        Ok(self.parcels.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_parcels(&self, filter: &ParcelFilter) -> StoreResult<Vec<Parcel>> {
        let mut parcels: Vec<Parcel> = self
            .parcels
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        parcels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            parcels.truncate(limit);
        }
        Ok(parcels)
    }

    async fn delete_parcel(&self, id: Uuid) -> StoreResult<RemoveResult> {
        if self
            .parcels
            .remove_if(&id, |_, parcel| !parcel.has_active_assignment())
            .is_some()
        {
            return Ok(RemoveResult::Removed);
        }

        Ok(if self.parcels.contains_key(&id) {
            RemoveResult::InUse
        } else {
            RemoveResult::NotFound
        })
    }

    async fn mark_parcel_paid(&self, id: Uuid, tracking_id: &TrackingId) -> StoreResult<MarkPaid> {
        let Some(mut parcel) = self.parcels.get_mut(&id) else {
            return Ok(MarkPaid::NotFound);
        };

        if parcel.payment_status == PaymentStatus::Paid {
            return Ok(MarkPaid::AlreadyPaid(parcel.clone()));
        }

        parcel.payment_status = PaymentStatus::Paid;
        parcel.delivery_status = Some(DeliveryStatus::PendingPickup);
        parcel.tracking_id = Some(tracking_id.clone());

        Ok(MarkPaid::Marked(parcel.clone()))
    }

    async fn revert_parcel_payment(&self, id: Uuid, tracking_id: &TrackingId) -> StoreResult<()> {
        if let Some(mut parcel) = self.parcels.get_mut(&id) {
            if parcel.tracking_id.as_ref() == Some(tracking_id) {
                parcel.payment_status = PaymentStatus::Unpaid;
                parcel.delivery_status = None;
                parcel.tracking_id = None;
            }
        }
        Ok(())
    }

    async fn transition_parcel(
        &self,
        id: Uuid,
        transition: ParcelTransition,
    ) -> StoreResult<TransitionResult> {
        let Some(mut parcel) = self.parcels.get_mut(&id) else {
            return Ok(TransitionResult::NotFound);
        };

        if parcel.delivery_status != Some(transition.from) {
            return Ok(TransitionResult::Stale {
                current: parcel.delivery_status,
            });
        }

        parcel.delivery_status = Some(transition.to);
        match transition.rider {
            RiderChange::Keep => {}
            RiderChange::Assign(rider) => parcel.rider = Some(rider),
            RiderChange::Clear => parcel.rider = None,
        }

        Ok(TransitionResult::Applied(parcel.clone()))
    }

    async fn count_by_delivery_status(&self, filter: &ParcelFilter) -> StoreResult<Vec<StatusCount>> {
        let mut counts: HashMap<DeliveryStatus, usize> = HashMap::new();
        for entry in self.parcels.iter() {
            let parcel = entry.value();
            if !filter.matches(parcel) {
                continue;
            }
            if let Some(status) = parcel.delivery_status {
                *counts.entry(status).or_default() += 1;
            }
        }

        Ok(DeliveryStatus::ALL
            .into_iter()
            .filter_map(|status| {
                counts
                    .get(&status)
                    .map(|&count| StatusCount { status, count })
            })
            .collect())
    }

    async fn tracking_id_in_use(&self, tracking_id: &TrackingId) -> StoreResult<bool> {
        Ok(self
            .parcels
            .iter()
            .any(|entry| entry.value().tracking_id.as_ref() == Some(tracking_id)))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment> {
        if self.payment_writes_disabled() {
            return Err(StoreError::Unavailable("payment writes disabled".to_string()));
        }

        match self.payments.entry(payment.transaction_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(format!(
                "payment transaction {}",
                payment.transaction_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(payment.clone());
                Ok(payment)
            }
        }
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .payments
            .get(transaction_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_payments(&self, customer_email: Option<&str>) -> StoreResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| customer_email.is_none_or(|email| entry.value().customer_email == email))
            .map(|entry| entry.value().clone())
            .collect();

        payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(payments)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        match self.user_emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(format!("user email {}", user.email))),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let id = match self.user_emails.get(email) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.find_user(id).await
    }

    async fn list_users(&self, search: Option<&str>, limit: Option<usize>) -> StoreResult<Vec<User>> {
        let needle = search.map(str::to_lowercase);
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|entry| {
                needle.as_deref().is_none_or(|needle| {
                    let user = entry.value();
                    user.email.to_lowercase().contains(needle)
                        || user.display_name.to_lowercase().contains(needle)
                })
            })
            .map(|entry| entry.value().clone())
            .collect();

        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            users.truncate(limit);
        }
        Ok(users)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
        Ok(self.users.get_mut(&id).map(|mut user| {
            user.role = role;
            user.clone()
        }))
    }

    async fn set_user_role_by_email(&self, email: &str, role: Role) -> StoreResult<Option<User>> {
        let id = match self.user_emails.get(email) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.set_user_role(id, role).await
    }
}

#[async_trait]
impl RiderStore for InMemoryStore {
    async fn insert_rider(&self, rider: RiderApplication) -> StoreResult<RiderApplication> {
        if rider.status.is_active() {
            match self.active_rider_emails.entry(rider.email.clone()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::DuplicateKey(format!(
                        "rider application {}",
                        rider.email
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(rider.id);
                }
            }
        }

        self.riders.insert(rider.id, rider.clone());
        Ok(rider)
    }

    async fn find_rider(&self, id: Uuid) -> StoreResult<Option<RiderApplication>> {
        Ok(self.riders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_riders(&self, filter: &RiderFilter) -> StoreResult<Vec<RiderApplication>> {
        let mut riders: Vec<RiderApplication> = self
            .riders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        riders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(riders)
    }

    async fn set_rider_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
    ) -> StoreResult<RiderUpdate> {
        let Some(mut rider) = self.riders.get_mut(&id) else {
            return Ok(RiderUpdate::NotFound);
        };

        if status == ApplicationStatus::Rejected && rider.work_status == WorkStatus::InDelivery {
            return Ok(RiderUpdate::InDelivery);
        }

        let was_active = rider.status.is_active();
        if status.is_active() && !was_active {
            match self.active_rider_emails.entry(rider.email.clone()) {
                Entry::Occupied(owner) if *owner.get() != id => {
                    return Err(StoreError::DuplicateKey(format!(
                        "rider application {}",
                        rider.email
                    )));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        } else if !status.is_active() && was_active {
            self.active_rider_emails
                .remove_if(&rider.email, |_, owner| *owner == id);
        }

        if status == ApplicationStatus::Approved && rider.status != ApplicationStatus::Approved {
            rider.work_status = WorkStatus::Available;
        }
        rider.status = status;
        Ok(RiderUpdate::Applied(rider.clone()))
    }

    async fn claim_rider(&self, id: Uuid) -> StoreResult<bool> {
        let Some(mut rider) = self.riders.get_mut(&id) else {
            return Ok(false);
        };

        if rider.status != ApplicationStatus::Approved || rider.work_status != WorkStatus::Available
        {
            return Ok(false);
        }

        rider.work_status = WorkStatus::InDelivery;
        Ok(true)
    }

    async fn set_work_status(
        &self,
        id: Uuid,
        work_status: WorkStatus,
    ) -> StoreResult<Option<RiderApplication>> {
        Ok(self.riders.get_mut(&id).map(|mut rider| {
            rider.work_status = work_status;
            rider.clone()
        }))
    }

    async fn delete_rider(&self, id: Uuid) -> StoreResult<RemoveResult> {
        let Some((_, rider)) = self
            .riders
            .remove_if(&id, |_, rider| rider.work_status != WorkStatus::InDelivery)
        else {
            return Ok(if self.riders.contains_key(&id) {
                RemoveResult::InUse
            } else {
                RemoveResult::NotFound
            });
        };
        self.active_rider_emails
            .remove_if(&rider.email, |_, owner| *owner == id);
        Ok(RemoveResult::Removed)
    }
}

#[async_trait]
impl TrackingLogStore for InMemoryStore {
    async fn append_log(&self, entry: TrackingLogEntry) -> StoreResult<()> {
        if self.log_writes_disabled() {
            return Err(StoreError::Unavailable("log writes disabled".to_string()));
        }

        self.tracking_logs
            .entry(entry.tracking_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn append_first_log(&self, entry: TrackingLogEntry) -> StoreResult<bool> {
        if self.log_writes_disabled() {
            return Err(StoreError::Unavailable("log writes disabled".to_string()));
        }

        let mut logs = self
            .tracking_logs
            .entry(entry.tracking_id.clone())
            .or_default();
        if !logs.is_empty() {
            return Ok(false);
        }
        logs.push(entry);
        Ok(true)
    }

    async fn logs_for(&self, tracking_id: &TrackingId) -> StoreResult<Vec<TrackingLogEntry>> {
        Ok(self
            .tracking_logs
            .get(tracking_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::InMemoryStore;
    use crate::models::parcel::{
        DeliveryStatus, Parcel, ParcelDetails, ParcelTransition, PaymentStatus, RiderChange,
        RiderRef,
    };
    use crate::models::payment::Payment;
    use crate::models::rider::{ApplicationStatus, RiderApplication, WorkStatus};
    use crate::models::tracking::{TrackingId, TrackingLogEntry};
    use crate::store::{
        MarkPaid, ParcelFilter, ParcelStore, PaymentStore, RemoveResult, RiderStore, RiderUpdate,
        StoreError, TrackingLogStore, TransitionResult,
    };

    fn parcel(sender: &str) -> Parcel {
        Parcel::new(sender, "books", 120.0, ParcelDetails::default())
    }

    fn payment(transaction_id: &str) -> Payment {
        Payment {
            transaction_id: transaction_id.to_string(),
            amount: 120.0,
            currency: "usd".to_string(),
            customer_email: "a@x.com".to_string(),
            parcel_id: Uuid::new_v4(),
            parcel_name: "books".to_string(),
            payment_status: PaymentStatus::Paid,
            tracking_id: TrackingId::new("TRK-20240101-00000000"),
            paid_at: Utc::now(),
        }
    }

    fn application(email: &str) -> RiderApplication {
        RiderApplication {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Rita".to_string(),
            district: "Dhaka".to_string(),
            status: ApplicationStatus::Pending,
            work_status: WorkStatus::Available,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_transaction_id_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_payment(payment("pi_1")).await.unwrap();

        let err = store.insert_payment(payment("pi_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(store.payment_count(), 1);
    }

    #[tokio::test]
    async fn mark_paid_only_once() {
        let store = InMemoryStore::new();
        let stored = store.insert_parcel(parcel("a@x.com")).await.unwrap();
        let first = TrackingId::new("TRK-20240101-AAAAAAAA");
        let second = TrackingId::new("TRK-20240101-BBBBBBBB");

        let marked = store.mark_parcel_paid(stored.id, &first).await.unwrap();
        assert!(matches!(marked, MarkPaid::Marked(_)));

        match store.mark_parcel_paid(stored.id, &second).await.unwrap() {
            MarkPaid::AlreadyPaid(existing) => assert_eq!(existing.tracking_id, Some(first)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn revert_requires_matching_tracking_id() {
        let store = InMemoryStore::new();
        let stored = store.insert_parcel(parcel("a@x.com")).await.unwrap();
        let tracking_id = TrackingId::new("TRK-20240101-AAAAAAAA");
        store.mark_parcel_paid(stored.id, &tracking_id).await.unwrap();

        store
            .revert_parcel_payment(stored.id, &TrackingId::new("TRK-20240101-FFFFFFFF"))
            .await
            .unwrap();
        let still_paid = store.find_parcel(stored.id).await.unwrap().unwrap();
        assert_eq!(still_paid.payment_status, PaymentStatus::Paid);

        store.revert_parcel_payment(stored.id, &tracking_id).await.unwrap();
        let reverted = store.find_parcel(stored.id).await.unwrap().unwrap();
        assert_eq!(reverted.payment_status, PaymentStatus::Unpaid);
        assert!(reverted.tracking_id.is_none());
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryStore::new();
        let stored = store.insert_parcel(parcel("a@x.com")).await.unwrap();
        store
            .mark_parcel_paid(stored.id, &TrackingId::new("TRK-20240101-AAAAAAAA"))
            .await
            .unwrap();

        let stale = store
            .transition_parcel(
                stored.id,
                ParcelTransition {
                    from: DeliveryStatus::RiderArriving,
                    to: DeliveryStatus::ParcelPickedUp,
                    rider: RiderChange::Keep,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            stale,
            TransitionResult::Stale {
                current: Some(DeliveryStatus::PendingPickup)
            }
        ));
    }

    #[tokio::test]
    async fn list_filters_and_sorts_newest_first() {
        let store = InMemoryStore::new();
        let mut older = parcel("a@x.com");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = parcel("a@x.com");
        store.insert_parcel(older.clone()).await.unwrap();
        store.insert_parcel(newer.clone()).await.unwrap();
        store.insert_parcel(parcel("b@x.com")).await.unwrap();

        let filter = ParcelFilter {
            sender_email: Some("a@x.com".to_string()),
            ..ParcelFilter::default()
        };
        let listed = store.list_parcels(&filter).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
    }

    #[tokio::test]
    async fn rejected_application_frees_the_email() {
        let store = InMemoryStore::new();
        let first = store.insert_rider(application("r@x.com")).await.unwrap();
        assert!(store.insert_rider(application("r@x.com")).await.is_err());

        store
            .set_rider_status(first.id, ApplicationStatus::Rejected)
            .await
            .unwrap();
        assert!(store.insert_rider(application("r@x.com")).await.is_ok());

        let err = store
            .set_rider_status(first.id, ApplicationStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn re_approval_keeps_busy_rider_busy() {
        let store = InMemoryStore::new();
        let rider = store.insert_rider(application("r@x.com")).await.unwrap();
        store
            .set_rider_status(rider.id, ApplicationStatus::Approved)
            .await
            .unwrap();
        assert!(store.claim_rider(rider.id).await.unwrap());

        let RiderUpdate::Applied(again) = store
            .set_rider_status(rider.id, ApplicationStatus::Approved)
            .await
            .unwrap()
        else {
            panic!("re-approval was not applied");
        };
        assert_eq!(again.work_status, WorkStatus::InDelivery);

        let refused = store
            .set_rider_status(rider.id, ApplicationStatus::Rejected)
            .await
            .unwrap();
        assert!(matches!(refused, RiderUpdate::InDelivery));
    }

    #[tokio::test]
    async fn rider_can_be_claimed_once() {
        let store = InMemoryStore::new();
        let pending = store.insert_rider(application("p@x.com")).await.unwrap();
        assert!(!store.claim_rider(pending.id).await.unwrap());

        let rider = store.insert_rider(application("r@x.com")).await.unwrap();
        store
            .set_rider_status(rider.id, ApplicationStatus::Approved)
            .await
            .unwrap();

        assert!(store.claim_rider(rider.id).await.unwrap());
        assert!(!store.claim_rider(rider.id).await.unwrap());
        assert!(!store.claim_rider(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn deletes_refuse_live_deliveries() {
        let store = InMemoryStore::new();
        let rider = store.insert_rider(application("r@x.com")).await.unwrap();
        store
            .set_rider_status(rider.id, ApplicationStatus::Approved)
            .await
            .unwrap();
        store.claim_rider(rider.id).await.unwrap();

        let mut assigned = parcel("a@x.com");
        assigned.delivery_status = Some(DeliveryStatus::DriverAssigned);
        assigned.rider = Some(RiderRef {
            rider_id: rider.id,
            rider_name: rider.name.clone(),
            rider_email: rider.email.clone(),
        });
        let assigned = store.insert_parcel(assigned).await.unwrap();

        assert_eq!(store.delete_parcel(assigned.id).await.unwrap(), RemoveResult::InUse);
        assert_eq!(store.delete_rider(rider.id).await.unwrap(), RemoveResult::InUse);

        let mut delivered = assigned.clone();
        delivered.id = Uuid::new_v4();
        delivered.delivery_status = Some(DeliveryStatus::ParcelDelivered);
        let delivered = store.insert_parcel(delivered).await.unwrap();
        assert_eq!(store.delete_parcel(delivered.id).await.unwrap(), RemoveResult::Removed);
        assert_eq!(store.delete_parcel(delivered.id).await.unwrap(), RemoveResult::NotFound);

        store.set_work_status(rider.id, WorkStatus::Available).await.unwrap();
        assert_eq!(store.delete_rider(rider.id).await.unwrap(), RemoveResult::Removed);
    }

    #[tokio::test]
    async fn first_log_is_written_once() {
        let store = InMemoryStore::new();
        let entry = TrackingLogEntry {
            tracking_id: TrackingId::new("TRK-20240101-0000AAAA"),
            status: DeliveryStatus::PendingPickup,
            details: "pending-pickup".to_string(),
            created_at: Utc::now(),
        };

        assert!(store.append_first_log(entry.clone()).await.unwrap());
        assert!(!store.append_first_log(entry.clone()).await.unwrap());
        assert_eq!(store.logs_for(&entry.tracking_id).await.unwrap().len(), 1);
    }
}
