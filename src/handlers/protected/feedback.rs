use axum::{extract::State, Extension};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{id_params, readable_document};
use crate::auth::Principal;
use crate::database::models::Feedback;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::validation::{Field, ObjectSchema, RequestSchema, ValidatedRequest};

const MAX_FEEDBACK_LENGTH: usize = 10_000;

/// Body for create and update: `{content}` plus the `:id` param
pub fn content_schema() -> RequestSchema {
    RequestSchema::new().params(id_params()).body(
        ObjectSchema::new().field("content", Field::string().min_length(1).max_length(MAX_FEEDBACK_LENGTH)),
    )
}

#[derive(Debug, Deserialize)]
struct FeedbackBody {
    content: String,
}

/// Feedback the principal may change: author or ADMIN
async fn modifiable_feedback(state: &AppState, principal: &Principal, id: Uuid) -> Result<Feedback, ApiError> {
    let feedback = state
        .storage
        .feedback(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Feedback not found"))?;

    if !state.access.can_modify_feedback(principal, feedback.id).await? {
        tracing::warn!(user_id = %principal.id, feedback_id = %id, "Feedback modification denied");
        return Err(ApiError::forbidden("You can only modify your own feedback"));
    }
    Ok(feedback)
}

/// POST /api/documents/:id/feedback
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Feedback> {
    let document = readable_document(&state, &principal, req.param_uuid("id")?).await?;
    let input: FeedbackBody = req.body_as()?;

    let feedback = Feedback::new(principal.id, document.id, input.content);
    state.storage.insert_feedback(&feedback).await?;

    tracing::info!(user_id = %principal.id, document_id = %document.id, feedback_id = %feedback.id, "Feedback created");
    Ok(ApiResponse::created(feedback))
}

/// GET /api/documents/:id/feedback
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Vec<Feedback>> {
    let document = readable_document(&state, &principal, req.param_uuid("id")?).await?;
    let feedback = state.storage.feedback_for_document(document.id).await?;
    Ok(ApiResponse::success(feedback))
}

/// PATCH /api/feedback/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Feedback> {
    let mut feedback = modifiable_feedback(&state, &principal, req.param_uuid("id")?).await?;
    let input: FeedbackBody = req.body_as()?;

    feedback.content = input.content;
    feedback.updated_at = Utc::now();
    state.storage.update_feedback(&feedback).await?;

    Ok(ApiResponse::success(feedback))
}

/// DELETE /api/feedback/:id - comments go with it, atomically
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<()> {
    let feedback = modifiable_feedback(&state, &principal, req.param_uuid("id")?).await?;

    let removed = state.storage.delete_feedback(feedback.id).await?;
    tracing::info!(feedback_id = %feedback.id, comments = removed.comments, "Feedback deleted");
    Ok(ApiResponse::no_content())
}
