use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::{Comment, CommentParent, Document, Feedback, Group, Subscription, User};

/// Errors from a storage backend. "Not found" is never an error here;
/// lookups return `Ok(None)` and callers decide what absence means.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Limit/offset window for ordered list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: 20, offset: 0 }
    }
}

/// What a cascade removed, returned by the atomic delete operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub documents: u64,
    pub feedback: u64,
    pub comments: u64,
}

/// Storage handle passed explicitly into every component that reads or
/// writes entities. Implemented by `PgStorage` and `MemoryStorage`.
#[async_trait]
pub trait Storage: Send + Sync {
    // Users
    async fn user(&self, id: Uuid) -> StorageResult<Option<User>>;
    async fn users(&self) -> StorageResult<Vec<User>>;
    async fn insert_user(&self, user: &User) -> StorageResult<()>;
    async fn update_user(&self, user: &User) -> StorageResult<()>;

    // Documents
    async fn document(&self, id: Uuid) -> StorageResult<Option<Document>>;
    /// Owned documents, most recently updated first
    async fn documents_by_owner(&self, owner_id: Uuid, page: Page) -> StorageResult<Vec<Document>>;
    async fn documents_by_group(&self, group_id: Uuid) -> StorageResult<Vec<Document>>;
    async fn count_documents_by_owner(&self, owner_id: Uuid) -> StorageResult<i64>;
    async fn insert_document(&self, document: &Document) -> StorageResult<()>;
    async fn update_document(&self, document: &Document) -> StorageResult<()>;
    /// Removes the document, its feedback, their comments and the document's
    /// own comments in one transaction.
    async fn delete_document(&self, id: Uuid) -> StorageResult<CascadeSummary>;

    // Groups
    async fn group(&self, id: Uuid) -> StorageResult<Option<Group>>;
    /// Single lookup scoped by group id AND (admin or member) at once.
    async fn group_for_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<Option<Group>>;
    async fn groups_for_member(&self, user_id: Uuid) -> StorageResult<Vec<Group>>;
    async fn count_groups_administered(&self, user_id: Uuid) -> StorageResult<i64>;
    async fn insert_group(&self, group: &Group) -> StorageResult<()>;
    /// Returns false when the user was already a member.
    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<bool>;
    /// Returns false when the user was not a member.
    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<bool>;

    // Feedback
    async fn feedback(&self, id: Uuid) -> StorageResult<Option<Feedback>>;
    async fn feedback_for_document(&self, document_id: Uuid) -> StorageResult<Vec<Feedback>>;
    async fn insert_feedback(&self, feedback: &Feedback) -> StorageResult<()>;
    async fn update_feedback(&self, feedback: &Feedback) -> StorageResult<()>;
    /// Removes the feedback and all of its comments in one transaction.
    async fn delete_feedback(&self, id: Uuid) -> StorageResult<CascadeSummary>;

    // Comments
    async fn comment(&self, id: Uuid) -> StorageResult<Option<Comment>>;
    async fn comments_for(&self, parent: CommentParent) -> StorageResult<Vec<Comment>>;
    async fn insert_comment(&self, comment: &Comment) -> StorageResult<()>;
    async fn update_comment(&self, comment: &Comment) -> StorageResult<()>;
    async fn delete_comment(&self, id: Uuid) -> StorageResult<bool>;

    // Subscriptions
    async fn subscription(&self, user_id: Uuid) -> StorageResult<Option<Subscription>>;
    async fn upsert_subscription(&self, subscription: &Subscription) -> StorageResult<()>;

    async fn health_check(&self) -> StorageResult<()>;
}
