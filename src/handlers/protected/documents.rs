use axum::{extract::State, Extension};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{id_params, readable_document};
use crate::auth::Principal;
use crate::database::models::Document;
use crate::database::Page;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::validation::{Field, ObjectSchema, RequestSchema, ValidatedRequest};

pub fn create_schema() -> RequestSchema {
    RequestSchema::new().body(
        ObjectSchema::new()
            .field("title", Field::string().min_length(1).max_length(200))
            .field("content", Field::string().default(""))
            .field("groupId", Field::uuid().optional()),
    )
}

pub fn list_schema() -> RequestSchema {
    RequestSchema::new().query(
        ObjectSchema::new()
            .field("limit", Field::integer().range(1.0, 100.0).default(20))
            .field("offset", Field::integer().min(0.0).default(0)),
    )
}

pub fn update_schema() -> RequestSchema {
    RequestSchema::new().params(id_params()).body(
        ObjectSchema::new()
            .field("title", Field::string().min_length(1).max_length(200).optional())
            .field("content", Field::string().optional()),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDocument {
    title: String,
    content: String,
    group_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct UpdateDocument {
    title: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: i64,
    offset: i64,
}

/// POST /api/documents
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Document> {
    let input: CreateDocument = req.body_as()?;

    let mut document = Document::new(principal.id, input.title, input.content);
    if let Some(group_id) = input.group_id {
        if state.storage.group(group_id).await?.is_none() {
            return Err(ApiError::not_found("Group not found"));
        }
        if !state.access.check_group_membership(principal.id, group_id).await? {
            return Err(ApiError::forbidden("You are not a member of this group"));
        }
        document = document.in_group(group_id);
    }

    state.storage.insert_document(&document).await?;
    tracing::info!(user_id = %principal.id, document_id = %document.id, "Document created");
    Ok(ApiResponse::created(document))
}

/// GET /api/documents - the caller's own documents, newest first
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Vec<Document>> {
    let query: ListQuery = req.query_as()?;
    let page = Page {
        limit: query.limit,
        offset: query.offset,
    };

    let documents = state.storage.documents_by_owner(principal.id, page).await?;
    Ok(ApiResponse::success(documents))
}

/// GET /api/documents/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Document> {
    let document = readable_document(&state, &principal, req.param_uuid("id")?).await?;
    Ok(ApiResponse::success(document))
}

async fn owned_document(state: &AppState, principal: &Principal, id: Uuid) -> Result<Document, ApiError> {
    let document = state
        .storage
        .document(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))?;

    if !state.access.is_document_owner(principal.id, document.id).await? {
        tracing::warn!(user_id = %principal.id, document_id = %id, "Non-owner tried to modify document");
        return Err(ApiError::forbidden("Only the owner can modify this document"));
    }
    Ok(document)
}

/// PATCH /api/documents/:id - owner only
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Document> {
    let mut document = owned_document(&state, &principal, req.param_uuid("id")?).await?;
    let changes: UpdateDocument = req.body_as()?;

    if let Some(title) = changes.title {
        document.title = title;
    }
    if let Some(content) = changes.content {
        document.content = content;
    }
    document.updated_at = Utc::now();

    state.storage.update_document(&document).await?;
    Ok(ApiResponse::success(document))
}

/// DELETE /api/documents/:id - owner only; removes feedback and comments with it
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<()> {
    let document = owned_document(&state, &principal, req.param_uuid("id")?).await?;

    let removed = state.storage.delete_document(document.id).await?;
    tracing::info!(
        document_id = %document.id,
        feedback = removed.feedback,
        comments = removed.comments,
        "Document deleted"
    );
    Ok(ApiResponse::no_content())
}
