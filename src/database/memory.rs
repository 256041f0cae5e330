use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{Comment, CommentParent, Document, Feedback, Group, Subscription, User};
use super::storage::{CascadeSummary, Page, Storage, StorageError, StorageResult};

#[derive(Debug, Default, Clone)]
struct Tables {
    users: HashMap<Uuid, User>,
    documents: HashMap<Uuid, Document>,
    groups: HashMap<Uuid, Group>,
    feedback: HashMap<Uuid, Feedback>,
    comments: HashMap<Uuid, Comment>,
    subscriptions: HashMap<Uuid, Subscription>,
}

/// In-process storage used by tests and `--memory` runs.
///
/// Multi-step deletes are staged on a copy of the tables and only published
/// once every step has succeeded, so a failed cascade leaves nothing behind.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    fail_next_transaction: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next cascade abort after its deletes are staged.
    pub fn fail_next_transaction(&self) {
        self.fail_next_transaction.store(true, Ordering::SeqCst);
    }

    /// Simulate the backend going away; every call fails until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionError("memory storage unavailable".to_string()));
        }
        Ok(())
    }

    fn commit_or_abort(&self) -> StorageResult<()> {
        if self.fail_next_transaction.swap(false, Ordering::SeqCst) {
            return Err(StorageError::TransactionAborted("injected failure".to_string()));
        }
        Ok(())
    }

    pub async fn comment_count(&self) -> usize {
        self.tables.read().await.comments.len()
    }

    pub async fn feedback_count(&self) -> usize {
        self.tables.read().await.feedback.len()
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    rows
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn user(&self, id: Uuid) -> StorageResult<Option<User>> {
        self.ensure_available()?;
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn users(&self) -> StorageResult<Vec<User>> {
        self.ensure_available()?;
        let users = self.tables.read().await.users.values().cloned().collect();
        Ok(sorted_by(users, |u: &User| u.created_at))
    }

    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(StorageError::Integrity(format!("email {} already registered", user.email)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn document(&self, id: Uuid) -> StorageResult<Option<Document>> {
        self.ensure_available()?;
        Ok(self.tables.read().await.documents.get(&id).cloned())
    }

    async fn documents_by_owner(&self, owner_id: Uuid, page: Page) -> StorageResult<Vec<Document>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| d.user_id == owner_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(documents
            .into_iter()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect())
    }

    async fn documents_by_group(&self, group_id: Uuid) -> StorageResult<Vec<Document>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| d.group_id == Some(group_id))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(documents)
    }

    async fn count_documents_by_owner(&self, owner_id: Uuid) -> StorageResult<i64> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        Ok(tables.documents.values().filter(|d| d.user_id == owner_id).count() as i64)
    }

    async fn insert_document(&self, document: &Document) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn update_document(&self, document: &Document) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> StorageResult<CascadeSummary> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();

        let feedback_ids: Vec<Uuid> = staged
            .feedback
            .values()
            .filter(|f| f.document_id == id)
            .map(|f| f.id)
            .collect();

        let before = staged.comments.len();
        staged.comments.retain(|_, c| {
            c.document_id != Some(id)
                && !c.feedback_id.map(|f| feedback_ids.contains(&f)).unwrap_or(false)
        });
        let comments = (before - staged.comments.len()) as u64;

        for feedback_id in &feedback_ids {
            staged.feedback.remove(feedback_id);
        }
        let documents = u64::from(staged.documents.remove(&id).is_some());

        self.commit_or_abort()?;
        *tables = staged;

        Ok(CascadeSummary {
            documents,
            feedback: feedback_ids.len() as u64,
            comments,
        })
    }

    async fn group(&self, id: Uuid) -> StorageResult<Option<Group>> {
        self.ensure_available()?;
        Ok(self.tables.read().await.groups.get(&id).cloned())
    }

    async fn group_for_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<Option<Group>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .get(&group_id)
            .filter(|g| g.has_access(user_id))
            .cloned())
    }

    async fn groups_for_member(&self, user_id: Uuid) -> StorageResult<Vec<Group>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        let mut groups: Vec<Group> = tables
            .groups
            .values()
            .filter(|g| g.has_access(user_id))
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    async fn count_groups_administered(&self, user_id: Uuid) -> StorageResult<i64> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        Ok(tables.groups.values().filter(|g| g.admin_id == user_id).count() as i64)
    }

    async fn insert_group(&self, group: &Group) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| StorageError::Integrity(format!("group {} does not exist", group_id)))?;
        if group.members.contains(&user_id) {
            return Ok(false);
        }
        group.members.push(user_id);
        Ok(true)
    }

    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        match tables.groups.get_mut(&group_id) {
            Some(group) => {
                let before = group.members.len();
                group.members.retain(|m| *m != user_id);
                Ok(group.members.len() != before)
            }
            None => Ok(false),
        }
    }

    async fn feedback(&self, id: Uuid) -> StorageResult<Option<Feedback>> {
        self.ensure_available()?;
        Ok(self.tables.read().await.feedback.get(&id).cloned())
    }

    async fn feedback_for_document(&self, document_id: Uuid) -> StorageResult<Vec<Feedback>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        let feedback = tables
            .feedback
            .values()
            .filter(|f| f.document_id == document_id)
            .cloned()
            .collect();
        Ok(sorted_by(feedback, |f: &Feedback| f.created_at))
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.feedback.insert(feedback.id, feedback.clone());
        Ok(())
    }

    async fn update_feedback(&self, feedback: &Feedback) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.feedback.insert(feedback.id, feedback.clone());
        Ok(())
    }

    async fn delete_feedback(&self, id: Uuid) -> StorageResult<CascadeSummary> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();

        let before = staged.comments.len();
        staged.comments.retain(|_, c| c.feedback_id != Some(id));
        let comments = (before - staged.comments.len()) as u64;
        let feedback = u64::from(staged.feedback.remove(&id).is_some());

        self.commit_or_abort()?;
        *tables = staged;

        Ok(CascadeSummary { documents: 0, feedback, comments })
    }

    async fn comment(&self, id: Uuid) -> StorageResult<Option<Comment>> {
        self.ensure_available()?;
        Ok(self.tables.read().await.comments.get(&id).cloned())
    }

    async fn comments_for(&self, parent: CommentParent) -> StorageResult<Vec<Comment>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        let comments = tables
            .comments
            .values()
            .filter(|c| c.parent() == Some(parent))
            .cloned()
            .collect();
        Ok(sorted_by(comments, |c: &Comment| c.created_at))
    }

    async fn insert_comment(&self, comment: &Comment) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn update_comment(&self, comment: &Comment) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables.write().await.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn delete_comment(&self, id: Uuid) -> StorageResult<bool> {
        self.ensure_available()?;
        Ok(self.tables.write().await.comments.remove(&id).is_some())
    }

    async fn subscription(&self, user_id: Uuid) -> StorageResult<Option<Subscription>> {
        self.ensure_available()?;
        Ok(self.tables.read().await.subscriptions.get(&user_id).cloned())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> StorageResult<()> {
        self.ensure_available()?;
        self.tables
            .write()
            .await
            .subscriptions
            .insert(subscription.user_id, subscription.clone());
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStorage, Document, Feedback) {
        let storage = MemoryStorage::new();
        let owner = Uuid::new_v4();
        let reviewer = Uuid::new_v4();

        let document = Document::new(owner, "Essay", "text");
        storage.insert_document(&document).await.unwrap();

        let feedback = Feedback::new(reviewer, document.id, "Good start");
        storage.insert_feedback(&feedback).await.unwrap();

        for i in 0..3 {
            let comment = Comment::new(owner, CommentParent::Feedback(feedback.id), format!("reply {}", i));
            storage.insert_comment(&comment).await.unwrap();
        }
        let direct = Comment::new(owner, CommentParent::Document(document.id), "note to self");
        storage.insert_comment(&direct).await.unwrap();

        (storage, document, feedback)
    }

    #[tokio::test]
    async fn delete_feedback_removes_its_comments() {
        let (storage, document, feedback) = seeded().await;

        let summary = storage.delete_feedback(feedback.id).await.unwrap();
        assert_eq!(summary.feedback, 1);
        assert_eq!(summary.comments, 3);

        assert!(storage.feedback(feedback.id).await.unwrap().is_none());
        assert!(storage
            .comments_for(CommentParent::Feedback(feedback.id))
            .await
            .unwrap()
            .is_empty());
        // Document-level comments are untouched
        assert_eq!(
            storage.comments_for(CommentParent::Document(document.id)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn failed_feedback_cascade_changes_nothing() {
        let (storage, _document, feedback) = seeded().await;

        storage.fail_next_transaction();
        let result = storage.delete_feedback(feedback.id).await;
        assert!(matches!(result, Err(StorageError::TransactionAborted(_))));

        assert_eq!(storage.feedback_count().await, 1);
        assert_eq!(storage.comment_count().await, 4);

        // Injection is one-shot
        storage.delete_feedback(feedback.id).await.unwrap();
        assert_eq!(storage.feedback_count().await, 0);
        assert_eq!(storage.comment_count().await, 1);
    }

    #[tokio::test]
    async fn delete_document_cascades_everything() {
        let (storage, document, _feedback) = seeded().await;

        storage.fail_next_transaction();
        assert!(storage.delete_document(document.id).await.is_err());
        assert!(storage.document(document.id).await.unwrap().is_some());
        assert_eq!(storage.comment_count().await, 4);

        let summary = storage.delete_document(document.id).await.unwrap();
        assert_eq!(
            summary,
            CascadeSummary { documents: 1, feedback: 1, comments: 4 }
        );
        assert_eq!(storage.comment_count().await, 0);
        assert_eq!(storage.feedback_count().await, 0);
    }

    #[tokio::test]
    async fn group_for_member_matches_admin_or_member_only() {
        let storage = MemoryStorage::new();
        let admin = Uuid::new_v4();
        let member = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let group = Group::new("Period 3", admin).with_member(member);
        storage.insert_group(&group).await.unwrap();

        assert!(storage.group_for_member(group.id, admin).await.unwrap().is_some());
        assert!(storage.group_for_member(group.id, member).await.unwrap().is_some());
        assert!(storage.group_for_member(group.id, outsider).await.unwrap().is_none());
        assert!(storage.group_for_member(Uuid::new_v4(), admin).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn owner_listing_is_paged_newest_first() {
        let storage = MemoryStorage::new();
        let owner = Uuid::new_v4();
        for i in 0..5 {
            let mut doc = Document::new(owner, format!("doc {}", i), "");
            doc.updated_at = doc.updated_at + chrono::Duration::seconds(i);
            storage.insert_document(&doc).await.unwrap();
        }
        storage
            .insert_document(&Document::new(Uuid::new_v4(), "someone else", ""))
            .await
            .unwrap();

        let page = storage
            .documents_by_owner(owner, Page { limit: 2, offset: 1 })
            .await
            .unwrap();
        let titles: Vec<&str> = page.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["doc 3", "doc 2"]);
        assert_eq!(storage.count_documents_by_owner(owner).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unavailable_storage_errors() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true);
        assert!(storage.user(Uuid::new_v4()).await.is_err());
        assert!(storage.health_check().await.is_err());
        storage.set_unavailable(false);
        assert!(storage.user(Uuid::new_v4()).await.unwrap().is_none());
    }
}
