// handlers/protected - everything under /api
//
// Handlers receive the resolved `Principal` and the `ValidatedRequest` as
// extensions inserted by the pipeline dispatcher.
pub mod comments;
pub mod documents;
pub mod feedback;
pub mod groups;
pub mod subscriptions;
pub mod users;

use uuid::Uuid;

use crate::auth::Principal;
use crate::database::models::Document;
use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{Field, ObjectSchema, RequestSchema};

/// `:id` path parameter as a UUID
pub(crate) fn id_params() -> ObjectSchema {
    ObjectSchema::new().field("id", Field::uuid())
}

pub(crate) fn id_schema() -> RequestSchema {
    RequestSchema::new().params(id_params())
}

/// Load a document the principal may read: 404 when missing, 403 without access
pub(crate) async fn readable_document(
    state: &AppState,
    principal: &Principal,
    document_id: Uuid,
) -> Result<Document, ApiError> {
    let document = state
        .storage
        .document(document_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))?;

    if !state.access.check_document_access(principal.id, Some(document.id)).await? {
        tracing::warn!(user_id = %principal.id, document_id = %document.id, "Document access denied");
        return Err(ApiError::forbidden("You do not have access to this document"));
    }
    Ok(document)
}
