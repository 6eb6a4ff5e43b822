//! Request guards for role-gated endpoints.
//!
//! `Authenticated` only proves who the caller is. `AdminUser` and `RiderUser`
//! additionally look the caller up in the user store and require the role.
//! Each is an extractor, so a handler opts in by naming it as an argument and
//! the first failing guard short-circuits the request.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::identity::IdentityError;
use crate::models::user::{Role, User};
use crate::state::AppState;
use crate::store::UserStore;

/// A caller whose bearer token was verified by the identity provider.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[derive(Debug, Clone)]
pub struct RiderUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Err(deny(state, "missing_token", || {
                AppError::Unauthorized("missing bearer token".to_string())
            }));
        };

        match state.identity.verify_token(token).await {
            Ok(identity) => Ok(Authenticated {
                email: identity.email,
            }),
            Err(IdentityError::InvalidToken(reason)) => {
                debug!(%reason, "token rejected");
                Err(deny(state, "invalid_token", || {
                    AppError::Unauthorized("invalid token".to_string())
                }))
            }
            Err(err @ IdentityError::Unavailable(_)) => {
                Err(AppError::Internal(format!("token verification failed: {err}")))
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let caller = Authenticated::from_request_parts(parts, state).await?;
        require_role(state, &caller, Role::Admin).await.map(AdminUser)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RiderUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let caller = Authenticated::from_request_parts(parts, state).await?;
        require_role(state, &caller, Role::Rider).await.map(RiderUser)
    }
}

/// Resolves the email a self-scoped listing may read.
///
/// Admins may read any email, or everything when none is given. Everyone else
/// is pinned to their own email.
pub async fn scoped_email(
    state: &AppState,
    caller: &Authenticated,
    requested: Option<String>,
) -> Result<Option<String>, AppError> {
    if requested.as_deref() == Some(caller.email.as_str()) {
        return Ok(requested);
    }

    if is_admin(state, &caller.email).await? {
        return Ok(requested);
    }

    match requested {
        None => Ok(Some(caller.email.clone())),
        Some(other) => {
            warn!(caller = %caller.email, requested = %other, "cross-account read refused");
            Err(deny(state, "foreign_email", || {
                AppError::Forbidden("cannot read another account's records".to_string())
            }))
        }
    }
}

async fn is_admin(state: &AppState, email: &str) -> Result<bool, AppError> {
    Ok(state
        .store
        .find_user_by_email(email)
        .await?
        .is_some_and(|user| user.role == Role::Admin))
}

async fn require_role(
    state: &AppState,
    caller: &Authenticated,
    role: Role,
) -> Result<User, AppError> {
    match state.store.find_user_by_email(&caller.email).await? {
        Some(user) if user.role == role => Ok(user),
        Some(user) => {
            debug!(email = %caller.email, has = %user.role, needs = %role, "role mismatch");
            Err(deny(state, "role", || {
                AppError::Forbidden(format!("{role} role required"))
            }))
        }
        None => Err(deny(state, "unknown_user", || {
            AppError::Forbidden(format!("{role} role required"))
        })),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn deny(state: &AppState, reason: &str, err: impl FnOnce() -> AppError) -> AppError {
    state
        .metrics
        .access_denied_total
        .with_label_values(&[reason])
        .inc();
    err()
}
