use axum::{extract::State, Extension};
use serde::Deserialize;
use uuid::Uuid;

use super::id_params;
use crate::auth::Principal;
use crate::database::models::{Document, Group};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::validation::{Field, ObjectSchema, RequestSchema, ValidatedRequest};

pub fn create_schema() -> RequestSchema {
    RequestSchema::new().body(ObjectSchema::new().field("name", Field::string().min_length(1).max_length(100)))
}

pub fn add_member_schema() -> RequestSchema {
    RequestSchema::new()
        .params(id_params())
        .body(ObjectSchema::new().field("userId", Field::uuid()))
}

pub fn remove_member_schema() -> RequestSchema {
    RequestSchema::new().params(ObjectSchema::new().field("id", Field::uuid()).field("userId", Field::uuid()))
}

#[derive(Debug, Deserialize)]
struct CreateGroup {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMember {
    user_id: Uuid,
}

async fn load_group(state: &AppState, id: Uuid) -> Result<Group, ApiError> {
    state
        .storage
        .group(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group not found"))
}

async fn visible_group(state: &AppState, principal: &Principal, id: Uuid) -> Result<Group, ApiError> {
    let group = load_group(state, id).await?;
    if !state.access.check_group_membership(principal.id, group.id).await? {
        return Err(ApiError::forbidden("You are not a member of this group"));
    }
    Ok(group)
}

/// POST /api/groups - TEACHER or ADMIN; the creator administers the group
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Group> {
    let input: CreateGroup = req.body_as()?;
    let group = Group::new(input.name, principal.id);

    state.storage.insert_group(&group).await?;
    tracing::info!(user_id = %principal.id, group_id = %group.id, "Group created");
    Ok(ApiResponse::created(group))
}

/// GET /api/groups - groups the caller administers or belongs to
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Vec<Group>> {
    let groups = state.storage.groups_for_member(principal.id).await?;
    Ok(ApiResponse::success(groups))
}

/// GET /api/groups/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Group> {
    let group = visible_group(&state, &principal, req.param_uuid("id")?).await?;
    Ok(ApiResponse::success(group))
}

/// POST /api/groups/:id/members - group admin only; adding twice is a no-op
pub async fn add_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Group> {
    let group = load_group(&state, req.param_uuid("id")?).await?;
    if !state.access.is_group_admin(principal.id, group.id).await? {
        return Err(ApiError::forbidden("Only the group admin can add members"));
    }

    let input: AddMember = req.body_as()?;
    if state.storage.user(input.user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    if state.storage.add_group_member(group.id, input.user_id).await? {
        tracing::info!(group_id = %group.id, member_id = %input.user_id, "Member added");
    }

    let group = load_group(&state, group.id).await?;
    Ok(ApiResponse::success(group))
}

/// DELETE /api/groups/:id/members/:userId - the admin, or the member leaving
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<()> {
    let group = load_group(&state, req.param_uuid("id")?).await?;
    let member_id = req.param_uuid("userId")?;

    if member_id == group.admin_id {
        return Err(ApiError::bad_request("The group admin cannot be removed"));
    }
    if principal.id != member_id && !state.access.is_group_admin(principal.id, group.id).await? {
        return Err(ApiError::forbidden("Only the group admin can remove other members"));
    }
    if !state.storage.remove_group_member(group.id, member_id).await? {
        return Err(ApiError::not_found("User is not a member of this group"));
    }

    tracing::info!(group_id = %group.id, member_id = %member_id, "Member removed");
    Ok(ApiResponse::no_content())
}

/// GET /api/groups/:id/documents
pub async fn documents(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Vec<Document>> {
    let group = visible_group(&state, &principal, req.param_uuid("id")?).await?;
    let documents = state.storage.documents_by_group(group.id).await?;
    Ok(ApiResponse::success(documents))
}
