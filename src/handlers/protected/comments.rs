use axum::{extract::State, Extension};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{id_params, readable_document};
use crate::auth::Principal;
use crate::database::models::{Comment, CommentParent, Feedback};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::validation::{Field, ObjectSchema, RequestSchema, ValidatedRequest};

pub fn content_schema() -> RequestSchema {
    RequestSchema::new()
        .params(id_params())
        .body(ObjectSchema::new().field("content", Field::string().min_length(1).max_length(5000)))
}

#[derive(Debug, Deserialize)]
struct CommentBody {
    content: String,
}

/// Feedback whose document the principal can read
async fn readable_feedback(state: &AppState, principal: &Principal, id: Uuid) -> Result<Feedback, ApiError> {
    let feedback = state
        .storage
        .feedback(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Feedback not found"))?;
    readable_document(state, principal, feedback.document_id).await?;
    Ok(feedback)
}

async fn modifiable_comment(state: &AppState, principal: &Principal, id: Uuid) -> Result<Comment, ApiError> {
    let comment = state
        .storage
        .comment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    if !state.access.can_modify_comment(principal, comment.id).await? {
        tracing::warn!(user_id = %principal.id, comment_id = %id, "Comment modification denied");
        return Err(ApiError::forbidden("You can only modify your own comments"));
    }
    Ok(comment)
}

async fn insert(state: &AppState, principal: &Principal, parent: CommentParent, req: &ValidatedRequest) -> ApiResult<Comment> {
    let input: CommentBody = req.body_as()?;
    let comment = Comment::new(principal.id, parent, input.content);

    state.storage.insert_comment(&comment).await?;
    tracing::info!(user_id = %principal.id, comment_id = %comment.id, "Comment created");
    Ok(ApiResponse::created(comment))
}

/// POST /api/feedback/:id/comments
pub async fn create_on_feedback(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Comment> {
    let feedback = readable_feedback(&state, &principal, req.param_uuid("id")?).await?;
    insert(&state, &principal, CommentParent::Feedback(feedback.id), &req).await
}

/// POST /api/documents/:id/comments
pub async fn create_on_document(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Comment> {
    let document = readable_document(&state, &principal, req.param_uuid("id")?).await?;
    insert(&state, &principal, CommentParent::Document(document.id), &req).await
}

/// GET /api/feedback/:id/comments
pub async fn list_for_feedback(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Vec<Comment>> {
    let feedback = readable_feedback(&state, &principal, req.param_uuid("id")?).await?;
    let comments = state.storage.comments_for(CommentParent::Feedback(feedback.id)).await?;
    Ok(ApiResponse::success(comments))
}

/// GET /api/documents/:id/comments
pub async fn list_for_document(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Vec<Comment>> {
    let document = readable_document(&state, &principal, req.param_uuid("id")?).await?;
    let comments = state.storage.comments_for(CommentParent::Document(document.id)).await?;
    Ok(ApiResponse::success(comments))
}

/// PATCH /api/comments/:id - author or ADMIN
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Comment> {
    let mut comment = modifiable_comment(&state, &principal, req.param_uuid("id")?).await?;
    let input: CommentBody = req.body_as()?;

    comment.content = input.content;
    comment.updated_at = Utc::now();
    state.storage.update_comment(&comment).await?;

    Ok(ApiResponse::success(comment))
}

/// DELETE /api/comments/:id - author or ADMIN
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<()> {
    let comment = modifiable_comment(&state, &principal, req.param_uuid("id")?).await?;
    state.storage.delete_comment(comment.id).await?;
    Ok(ApiResponse::no_content())
}
