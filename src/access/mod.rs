use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::database::{Storage, StorageError};

/// Ownership and membership checks over storage.
///
/// Every check answers `Ok(false)` for "no" (including a missing record);
/// only storage failures are errors. Callers pick the status code.
///
/// ADMIN overrides ownership for feedback and comment mutation
/// (`can_modify_*`) but gets nothing special from `check_document_access`.
/// That asymmetry is deliberate until product decides otherwise.
#[derive(Clone)]
pub struct AccessControl {
    storage: Arc<dyn Storage>,
}

impl AccessControl {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Owner, or admin/member of the document's group.
    pub async fn check_document_access(
        &self,
        principal_id: Uuid,
        document_id: Option<Uuid>,
    ) -> Result<bool, StorageError> {
        let Some(document_id) = document_id else {
            return Ok(false);
        };
        let Some(document) = self.storage.document(document_id).await? else {
            return Ok(false);
        };

        if document.user_id == principal_id {
            return Ok(true);
        }

        match document.group_id {
            Some(group_id) => self.check_group_membership(principal_id, group_id).await,
            None => Ok(false),
        }
    }

    pub async fn is_document_owner(&self, principal_id: Uuid, document_id: Uuid) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .document(document_id)
            .await?
            .is_some_and(|document| document.user_id == principal_id))
    }

    /// Administering a group is narrower than membership
    pub async fn is_group_admin(&self, principal_id: Uuid, group_id: Uuid) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .group(group_id)
            .await?
            .is_some_and(|group| group.admin_id == principal_id))
    }

    pub async fn check_feedback_ownership(
        &self,
        principal_id: Uuid,
        feedback_id: Uuid,
    ) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .feedback(feedback_id)
            .await?
            .is_some_and(|feedback| feedback.user_id == principal_id))
    }

    pub async fn check_comment_ownership(
        &self,
        principal_id: Uuid,
        comment_id: Uuid,
    ) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .comment(comment_id)
            .await?
            .is_some_and(|comment| comment.user_id == principal_id))
    }

    /// Single lookup scoped by group id and (admin or member) together
    pub async fn check_group_membership(&self, principal_id: Uuid, group_id: Uuid) -> Result<bool, StorageError> {
        Ok(self.storage.group_for_member(group_id, principal_id).await?.is_some())
    }

    pub async fn can_modify_feedback(&self, principal: &Principal, feedback_id: Uuid) -> Result<bool, StorageError> {
        if principal.is_admin() {
            return Ok(true);
        }
        self.check_feedback_ownership(principal.id, feedback_id).await
    }

    pub async fn can_modify_comment(&self, principal: &Principal, comment_id: Uuid) -> Result<bool, StorageError> {
        if principal.is_admin() {
            return Ok(true);
        }
        self.check_comment_ownership(principal.id, comment_id).await
    }
}

/// Flat membership test; roles do not imply one another.
pub fn role_allowed(principal: &Principal, allowed: &[Role]) -> bool {
    principal.role.is_some_and(|role| allowed.contains(&role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Comment, CommentParent, Document, Feedback, Group, User};
    use crate::database::MemoryStorage;

    struct Fixture {
        access: AccessControl,
        storage: Arc<MemoryStorage>,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = Arc::new(MemoryStorage::new());
            Self {
                access: AccessControl::new(storage.clone()),
                storage,
            }
        }
    }

    fn principal(role: Option<Role>) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            email: "p@school.edu".into(),
            role,
        }
    }

    #[tokio::test]
    async fn owner_has_access_and_strangers_do_not() {
        let fx = Fixture::new();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let d1 = Document::new(u1, "Essay", "");
        fx.storage.insert_document(&d1).await.unwrap();

        assert!(fx.access.check_document_access(u1, Some(d1.id)).await.unwrap());
        assert!(!fx.access.check_document_access(u2, Some(d1.id)).await.unwrap());
    }

    #[tokio::test]
    async fn missing_or_absent_documents_deny() {
        let fx = Fixture::new();
        let u1 = Uuid::new_v4();
        assert!(!fx.access.check_document_access(u1, None).await.unwrap());
        assert!(!fx.access.check_document_access(u1, Some(Uuid::new_v4())).await.unwrap());
    }

    #[tokio::test]
    async fn group_admin_and_members_reach_group_documents() {
        let fx = Fixture::new();
        let (owner, u3, member, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let g1 = Group::new("Seminar", u3).with_member(member);
        fx.storage.insert_group(&g1).await.unwrap();
        let d2 = Document::new(owner, "Draft", "").in_group(g1.id);
        fx.storage.insert_document(&d2).await.unwrap();

        assert!(fx.access.check_document_access(u3, Some(d2.id)).await.unwrap());
        assert!(fx.access.check_document_access(member, Some(d2.id)).await.unwrap());
        assert!(!fx.access.check_document_access(outsider, Some(d2.id)).await.unwrap());
    }

    #[tokio::test]
    async fn only_the_owner_owns_a_document() {
        let fx = Fixture::new();
        let (owner, teacher) = (Uuid::new_v4(), Uuid::new_v4());
        let g1 = Group::new("Seminar", teacher).with_member(owner);
        fx.storage.insert_group(&g1).await.unwrap();
        let d = Document::new(owner, "Draft", "").in_group(g1.id);
        fx.storage.insert_document(&d).await.unwrap();

        assert!(fx.access.is_document_owner(owner, d.id).await.unwrap());
        // Group admins can read but do not own
        assert!(!fx.access.is_document_owner(teacher, d.id).await.unwrap());
        assert!(!fx.access.is_document_owner(owner, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn members_are_not_group_admins() {
        let fx = Fixture::new();
        let (teacher, member) = (Uuid::new_v4(), Uuid::new_v4());
        let g1 = Group::new("Seminar", teacher).with_member(member);
        fx.storage.insert_group(&g1).await.unwrap();

        assert!(fx.access.is_group_admin(teacher, g1.id).await.unwrap());
        assert!(!fx.access.is_group_admin(member, g1.id).await.unwrap());
        assert!(fx.access.check_group_membership(member, g1.id).await.unwrap());
        assert!(!fx.access.is_group_admin(teacher, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn admins_get_no_document_bypass() {
        let fx = Fixture::new();
        let d = Document::new(Uuid::new_v4(), "Private", "");
        fx.storage.insert_document(&d).await.unwrap();

        let admin = principal(Some(Role::Admin));
        assert!(!fx.access.check_document_access(admin.id, Some(d.id)).await.unwrap());
    }

    #[tokio::test]
    async fn feedback_ownership_and_admin_override() {
        let fx = Fixture::new();
        let u1 = Uuid::new_v4();
        let f1 = Feedback::new(u1, Uuid::new_v4(), "Nice intro");
        fx.storage.insert_feedback(&f1).await.unwrap();

        let student = principal(Some(Role::Student));
        let admin = principal(Some(Role::Admin));

        assert!(fx.access.check_feedback_ownership(u1, f1.id).await.unwrap());
        assert!(!fx.access.check_feedback_ownership(student.id, f1.id).await.unwrap());
        assert!(!fx.access.check_feedback_ownership(u1, Uuid::new_v4()).await.unwrap());
        assert!(!fx.access.can_modify_feedback(&student, f1.id).await.unwrap());
        assert!(fx.access.can_modify_feedback(&admin, f1.id).await.unwrap());
    }

    #[tokio::test]
    async fn comment_ownership_and_admin_override() {
        let fx = Fixture::new();
        let author = User::new(Uuid::new_v4(), "a@school.edu", "STUDENT");
        let comment = Comment::new(author.id, CommentParent::Document(Uuid::new_v4()), "Agreed");
        fx.storage.insert_comment(&comment).await.unwrap();

        assert!(fx.access.check_comment_ownership(author.id, comment.id).await.unwrap());
        assert!(!fx.access.can_modify_comment(&principal(Some(Role::Teacher)), comment.id).await.unwrap());
        assert!(fx.access.can_modify_comment(&principal(Some(Role::Admin)), comment.id).await.unwrap());
    }

    #[tokio::test]
    async fn storage_failures_propagate() {
        let fx = Fixture::new();
        fx.storage.set_unavailable(true);
        assert!(fx.access.check_document_access(Uuid::new_v4(), Some(Uuid::new_v4())).await.is_err());
        assert!(fx.access.check_feedback_ownership(Uuid::new_v4(), Uuid::new_v4()).await.is_err());
    }

    #[test]
    fn role_gate_is_a_flat_set() {
        let allowed = [Role::Teacher, Role::Admin];
        assert!(!role_allowed(&principal(Some(Role::Student)), &allowed));
        assert!(role_allowed(&principal(Some(Role::Teacher)), &allowed));
        assert!(role_allowed(&principal(Some(Role::Admin)), &allowed));
        assert!(!role_allowed(&principal(None), &allowed));
        assert!(!role_allowed(&principal(Some(Role::Teacher)), &[Role::Student]));
    }
}
