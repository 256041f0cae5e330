use axum::{extract::State, Extension};
use chrono::Utc;
use serde::Deserialize;

use super::id_params;
use crate::auth::{Principal, Role};
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::validation::{Field, ObjectSchema, RequestSchema, ValidatedRequest};

pub fn update_me_schema() -> RequestSchema {
    RequestSchema::new().body(ObjectSchema::new().field("name", Field::string().min_length(1).max_length(100)))
}

pub fn set_role_schema() -> RequestSchema {
    let roles: Vec<&str> = Role::ALL.iter().map(Role::as_str).collect();
    RequestSchema::new()
        .params(id_params())
        .body(ObjectSchema::new().field("role", Field::enumeration(&roles)))
}

#[derive(Debug, Deserialize)]
struct UpdateProfile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SetRole {
    role: Role,
}

async fn current_user(state: &AppState, principal: &Principal) -> Result<User, ApiError> {
    state
        .storage
        .user(principal.id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found in database"))
}

/// GET /api/users/me
pub async fn me(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResult<User> {
    Ok(ApiResponse::success(current_user(&state, &principal).await?))
}

/// PATCH /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<User> {
    let input: UpdateProfile = req.body_as()?;
    let mut user = current_user(&state, &principal).await?;

    user.name = Some(input.name);
    user.updated_at = Utc::now();
    state.storage.update_user(&user).await?;

    Ok(ApiResponse::success(user))
}

/// GET /api/users - ADMIN
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    Ok(ApiResponse::success(state.storage.users().await?))
}

/// PATCH /api/users/:id/role - ADMIN
pub async fn set_role(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<User> {
    let input: SetRole = req.body_as()?;
    let mut user = state
        .storage
        .user(req.param_uuid("id")?)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    user.role = input.role.as_str().to_string();
    user.updated_at = Utc::now();
    state.storage.update_user(&user).await?;

    tracing::info!(admin_id = %principal.id, user_id = %user.id, role = %user.role, "Role changed");
    Ok(ApiResponse::success(user))
}
