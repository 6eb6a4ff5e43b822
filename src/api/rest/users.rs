use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::auth::{AdminUser, Authenticated};
use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;
use crate::store::{StoreError, UserStore};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(register_user))
        // GET takes an email, PATCH a user id.
        .route("/users/:key/role", get(get_role).patch(set_role))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Serialize)]
pub struct RoleResponse {
    pub role: Role,
}

/// Registers a user on first sign-in; later calls return the stored record.
async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<Json<User>, AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::BadRequest("email is required".to_string()));
    }

    if let Some(existing) = state.store.find_user_by_email(&payload.email).await? {
        return Ok(Json(existing));
    }

    let user = User {
        id: Uuid::new_v4(),
        email: payload.email,
        display_name: payload.display_name,
        photo_url: payload.photo_url,
        role: Role::User,
        created_at: Utc::now(),
    };

    let email = user.email.clone();
    match state.store.insert_user(user).await {
        Ok(user) => {
            info!(user_id = %user.id, email = %user.email, "user registered");
            Ok(Json(user))
        }
        // Lost a race with a concurrent registration of the same email.
        Err(StoreError::DuplicateKey(_)) => state
            .store
            .find_user_by_email(&email)
            .await?
            .map(Json)
            .ok_or_else(|| AppError::Internal(format!("user {email} vanished after conflict"))),
        Err(err) => Err(err.into()),
    }
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    _caller: Authenticated,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    let search = query.search.as_deref().filter(|term| !term.is_empty());
    Ok(Json(state.store.list_users(search, query.limit).await?))
}

/// Unknown emails report the default role.
async fn get_role(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<RoleResponse>, AppError> {
    let role = state
        .store
        .find_user_by_email(&email)
        .await?
        .map(|user| user.role)
        .unwrap_or_default();

    Ok(Json(RoleResponse { role }))
}

async fn set_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<User>, AppError> {
    let current = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    if payload.role == Role::Rider || current.role == Role::Rider {
        return Err(AppError::BadRequest(
            "the rider role is managed through rider applications".to_string(),
        ));
    }

    let user = state
        .store
        .set_user_role(id, payload.role)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    info!(user_id = %id, role = %user.role, admin = %admin.email, "user role changed");
    Ok(Json(user))
}
