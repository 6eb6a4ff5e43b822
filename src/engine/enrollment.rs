use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::rider::{ApplicationStatus, RiderApplication, WorkStatus};
use crate::models::user::{Role, User};
use crate::state::AppState;
use crate::store::{RemoveResult, RiderStore, RiderUpdate, StoreError, UserStore};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

pub async fn apply(
    state: &AppState,
    email: String,
    name: String,
    district: String,
) -> Result<RiderApplication, AppError> {
    if email.trim().is_empty() {
        return Err(AppError::BadRequest("email is required".to_string()));
    }
    if district.trim().is_empty() {
        return Err(AppError::BadRequest("district is required".to_string()));
    }

    let application = RiderApplication {
        id: Uuid::new_v4(),
        email,
        name,
        district,
        status: ApplicationStatus::Pending,
        work_status: WorkStatus::Available,
        created_at: Utc::now(),
    };

    let application = match state.store.insert_rider(application).await {
        Ok(application) => application,
        Err(StoreError::DuplicateKey(_)) => {
            return Err(AppError::Conflict(
                "an active rider application already exists for this email".to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    info!(rider_id = %application.id, email = %application.email, "rider application received");
    Ok(application)
}

/// Approves or rejects an application and keeps the applicant's user role in step.
pub async fn review(
    state: &AppState,
    rider_id: Uuid,
    decision: Decision,
) -> Result<RiderApplication, AppError> {
    let current = state
        .store
        .find_rider(rider_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

    let status = match decision {
        Decision::Approved => ApplicationStatus::Approved,
        Decision::Rejected => ApplicationStatus::Rejected,
    };

    let updated = match state.store.set_rider_status(rider_id, status).await {
        Ok(RiderUpdate::Applied(updated)) => updated,
        Ok(RiderUpdate::NotFound) => {
            return Err(AppError::NotFound(format!("rider {rider_id} not found")));
        }
        Ok(RiderUpdate::InDelivery) => {
            return Err(AppError::Conflict(format!(
                "rider {rider_id} is out on a delivery"
            )));
        }
        Err(StoreError::DuplicateKey(_)) => {
            return Err(AppError::Conflict(format!(
                "{} already has another active application",
                current.email
            )));
        }
        Err(err) => return Err(err.into()),
    };

    match decision {
        Decision::Approved => sync_role(state, &updated.email, Role::Rider).await?,
        Decision::Rejected if current.status == ApplicationStatus::Approved => {
            sync_role(state, &updated.email, Role::User).await?
        }
        Decision::Rejected => {}
    }

    info!(%rider_id, status = ?updated.status, "rider application reviewed");
    Ok(updated)
}

/// Deletes an application. An approved rider loses the rider role with it.
pub async fn remove(state: &AppState, rider_id: Uuid) -> Result<(), AppError> {
    let current = state
        .store
        .find_rider(rider_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

    match state.store.delete_rider(rider_id).await? {
        RemoveResult::Removed => {}
        RemoveResult::InUse => {
            return Err(AppError::Conflict(format!(
                "rider {rider_id} is out on a delivery"
            )));
        }
        RemoveResult::NotFound => {
            return Err(AppError::NotFound(format!("rider {rider_id} not found")));
        }
    }

    if current.status == ApplicationStatus::Approved {
        sync_role(state, &current.email, Role::User).await?;
    }

    info!(%rider_id, email = %current.email, "rider removed");
    Ok(())
}

/// Ensures every configured admin email has an admin user.
pub async fn bootstrap_admins(state: &AppState, emails: &[String]) -> Result<(), AppError> {
    for email in emails {
        match state.store.find_user_by_email(email).await? {
            Some(user) if user.role == Role::Admin => {}
            Some(user) => {
                state.store.set_user_role(user.id, Role::Admin).await?;
                info!(%email, "user elevated to admin");
            }
            None => {
                let user = User {
                    id: Uuid::new_v4(),
                    email: email.clone(),
                    display_name: email.clone(),
                    photo_url: None,
                    role: Role::Admin,
                    created_at: Utc::now(),
                };
                match state.store.insert_user(user).await {
                    Ok(_) => info!(%email, "admin user created"),
                    Err(StoreError::DuplicateKey(_)) => {
                        state.store.set_user_role_by_email(email, Role::Admin).await?;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    Ok(())
}

// Admins keep their role whatever happens to their rider application.
async fn sync_role(state: &AppState, email: &str, role: Role) -> Result<(), AppError> {
    let Some(user) = state.store.find_user_by_email(email).await? else {
        warn!(%email, "no user for rider application; role unchanged");
        return Ok(());
    };
    if user.role == Role::Admin || user.role == role {
        return Ok(());
    }

    state.store.set_user_role(user.id, role).await?;
    info!(%email, role = %role, "user role updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{Decision, apply, bootstrap_admins, remove, review};
    use crate::error::AppError;
    use crate::models::rider::{ApplicationStatus, WorkStatus};
    use crate::models::user::{Role, User};
    use crate::state::testing::{Harness, harness};
    use crate::store::{RiderStore, UserStore};

    async fn user(h: &Harness, email: &str, role: Role) -> User {
        h.store
            .insert_user(User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                display_name: "Rita".to_string(),
                photo_url: None,
                role,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn role_of(h: &Harness, email: &str) -> Role {
        h.store.find_user_by_email(email).await.unwrap().unwrap().role
    }

    #[tokio::test]
    async fn approval_elevates_user_to_rider() {
        let h = harness();
        user(&h, "r@x.com", Role::User).await;
        let application = apply(&h.state, "r@x.com".into(), "Rita".into(), "Dhaka".into())
            .await
            .unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);

        let reviewed = review(&h.state, application.id, Decision::Approved)
            .await
            .unwrap();

        assert_eq!(reviewed.status, ApplicationStatus::Approved);
        assert_eq!(reviewed.work_status, WorkStatus::Available);
        assert_eq!(role_of(&h, "r@x.com").await, Role::Rider);
    }

    #[tokio::test]
    async fn duplicate_active_application_conflicts() {
        let h = harness();
        apply(&h.state, "r@x.com".into(), "Rita".into(), "Dhaka".into())
            .await
            .unwrap();

        let err = apply(&h.state, "r@x.com".into(), "Rita".into(), "Dhaka".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn rejecting_approved_rider_demotes_but_spares_admins() {
        let h = harness();
        user(&h, "r@x.com", Role::User).await;
        user(&h, "boss@x.com", Role::Admin).await;

        for email in ["r@x.com", "boss@x.com"] {
            let application = apply(&h.state, email.into(), "N".into(), "Dhaka".into())
                .await
                .unwrap();
            review(&h.state, application.id, Decision::Approved)
                .await
                .unwrap();
            review(&h.state, application.id, Decision::Rejected)
                .await
                .unwrap();
        }

        assert_eq!(role_of(&h, "r@x.com").await, Role::User);
        assert_eq!(role_of(&h, "boss@x.com").await, Role::Admin);
    }

    #[tokio::test]
    async fn rejected_applicant_may_reapply() {
        let h = harness();
        let first = apply(&h.state, "r@x.com".into(), "Rita".into(), "Dhaka".into())
            .await
            .unwrap();
        review(&h.state, first.id, Decision::Rejected).await.unwrap();

        let second = apply(&h.state, "r@x.com".into(), "Rita".into(), "Khulna".into())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn bootstrap_creates_or_elevates_admins() {
        let h = harness();
        user(&h, "existing@x.com", Role::User).await;

        let emails = vec!["existing@x.com".to_string(), "new@x.com".to_string()];
        bootstrap_admins(&h.state, &emails).await.unwrap();
        bootstrap_admins(&h.state, &emails).await.unwrap();

        assert_eq!(role_of(&h, "existing@x.com").await, Role::Admin);
        assert_eq!(role_of(&h, "new@x.com").await, Role::Admin);
    }

    #[tokio::test]
    async fn re_approving_a_busy_rider_keeps_them_busy() {
        let h = harness();
        user(&h, "r@x.com", Role::User).await;
        let application = apply(&h.state, "r@x.com".into(), "Rita".into(), "Dhaka".into())
            .await
            .unwrap();
        review(&h.state, application.id, Decision::Approved)
            .await
            .unwrap();
        assert!(h.store.claim_rider(application.id).await.unwrap());

        let reviewed = review(&h.state, application.id, Decision::Approved)
            .await
            .unwrap();
        assert_eq!(reviewed.work_status, WorkStatus::InDelivery);
        assert!(!h.store.claim_rider(application.id).await.unwrap());

        let err = review(&h.state, application.id, Decision::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(role_of(&h, "r@x.com").await, Role::Rider);
    }

    #[tokio::test]
    async fn removing_an_approved_rider_demotes_the_user() {
        let h = harness();
        user(&h, "r@x.com", Role::User).await;
        let application = apply(&h.state, "r@x.com".into(), "Rita".into(), "Dhaka".into())
            .await
            .unwrap();
        review(&h.state, application.id, Decision::Approved)
            .await
            .unwrap();

        h.store.claim_rider(application.id).await.unwrap();
        let err = remove(&h.state, application.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        h.store
            .set_work_status(application.id, WorkStatus::Available)
            .await
            .unwrap();
        remove(&h.state, application.id).await.unwrap();

        assert!(h.store.find_rider(application.id).await.unwrap().is_none());
        assert_eq!(role_of(&h, "r@x.com").await, Role::User);
        let err = remove(&h.state, application.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
