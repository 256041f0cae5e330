use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "docfeed-api",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Document feedback backend: documents, study groups, feedback and comments",
            "endpoints": {
                "health": "/health (public)",
                "documents": "/api/documents[/:id] (protected)",
                "feedback": "/api/documents/:id/feedback, /api/feedback/:id (protected)",
                "comments": "/api/feedback/:id/comments, /api/documents/:id/comments, /api/comments/:id (protected)",
                "groups": "/api/groups[/:id[/members|/documents]] (protected, create: TEACHER/ADMIN)",
                "users": "/api/users/me (protected), /api/users[/:id/role] (ADMIN)",
                "subscription": "/api/subscription (protected), /api/users/:id/subscription (ADMIN)",
            }
        }
    }))
}

/// GET /health - storage reachability
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.storage.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
