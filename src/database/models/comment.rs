use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A comment hangs off exactly one parent: a feedback entry or a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feedback_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentParent {
    Feedback(Uuid),
    Document(Uuid),
}

impl Comment {
    pub fn new(user_id: Uuid, parent: CommentParent, content: impl Into<String>) -> Self {
        let now = Utc::now();
        let (feedback_id, document_id) = match parent {
            CommentParent::Feedback(id) => (Some(id), None),
            CommentParent::Document(id) => (None, Some(id)),
        };
        Self {
            id: Uuid::new_v4(),
            user_id,
            feedback_id,
            document_id,
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn parent(&self) -> Option<CommentParent> {
        match (self.feedback_id, self.document_id) {
            (Some(id), _) => Some(CommentParent::Feedback(id)),
            (None, Some(id)) => Some(CommentParent::Document(id)),
            (None, None) => None,
        }
    }
}
