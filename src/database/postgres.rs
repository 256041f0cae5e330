use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::models::{Comment, CommentParent, Document, Feedback, Group, Subscription, User};
use super::storage::{CascadeSummary, Page, Storage, StorageError, StorageResult};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const USER_COLUMNS: &str = "id, email, name, role, created_at, updated_at";
const DOCUMENT_COLUMNS: &str = "id, user_id, group_id, title, content, created_at, updated_at";
const FEEDBACK_COLUMNS: &str = "id, user_id, document_id, content, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, user_id, feedback_id, document_id, content, created_at, updated_at";

/// Groups are read with their member list folded into an array column.
const GROUP_SELECT: &str = r#"
    SELECT g.id, g.name, g.admin_id, g.created_at,
           COALESCE(array_agg(m.user_id) FILTER (WHERE m.user_id IS NOT NULL), '{}'::uuid[]) AS members
    FROM study_groups g
    LEFT JOIN group_members m ON m.group_id = g.id
"#;

/// Postgres-backed storage over a single sqlx pool
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `database.url`, falling back to `DATABASE_URL`
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let connection_string = Self::connection_string(config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&connection_string)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        info!(
            "Created database pool (max_connections={})",
            config.max_connections
        );
        Ok(Self { pool })
    }

    fn connection_string(config: &DatabaseConfig) -> StorageResult<String> {
        let base = match &config.url {
            Some(url) => url.clone(),
            None => std::env::var("DATABASE_URL")
                .map_err(|_| StorageError::ConfigMissing("DATABASE_URL"))?,
        };

        let url = url::Url::parse(&base).map_err(|_| StorageError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(StorageError::InvalidDatabaseUrl);
        }
        Ok(url.into())
    }

    /// Create missing tables and indexes
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        // No bind parameters, so this goes out as one multi-statement simple query
        self.pool.execute(SCHEMA).await?;
        info!("Database schema verified");
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn user(&self, id: Uuid) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn users(&self) -> StorageResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at ASC", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, role, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        sqlx::query("UPDATE users SET email = $2, name = $3, role = $4, updated_at = $5 WHERE id = $1")
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.role)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn document(&self, id: Uuid) -> StorageResult<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn documents_by_owner(&self, owner_id: Uuid, page: Page) -> StorageResult<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE user_id = $1 ORDER BY updated_at DESC LIMIT $2 OFFSET $3",
            DOCUMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(owner_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn documents_by_group(&self, group_id: Uuid) -> StorageResult<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE group_id = $1 ORDER BY updated_at DESC",
            DOCUMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_documents_by_owner(&self, owner_id: Uuid) -> StorageResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE user_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn insert_document(&self, document: &Document) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO documents (id, user_id, group_id, title, content, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(document.id)
        .bind(document.user_id)
        .bind(document.group_id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_document(&self, document: &Document) -> StorageResult<()> {
        sqlx::query(
            "UPDATE documents SET group_id = $2, title = $3, content = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(document.id)
        .bind(document.group_id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> StorageResult<CascadeSummary> {
        // Dropping `tx` on any early return rolls everything back
        let mut tx = self.pool.begin().await?;

        let comments = sqlx::query(
            "DELETE FROM comments
             WHERE document_id = $1
                OR feedback_id IN (SELECT id FROM feedback WHERE document_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let feedback = sqlx::query("DELETE FROM feedback WHERE document_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let documents = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(CascadeSummary { documents, feedback, comments })
    }

    async fn group(&self, id: Uuid) -> StorageResult<Option<Group>> {
        let sql = format!("{} WHERE g.id = $1 GROUP BY g.id", GROUP_SELECT);
        Ok(sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn group_for_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<Option<Group>> {
        let sql = format!(
            "{} WHERE g.id = $1
                AND (g.admin_id = $2
                     OR EXISTS (SELECT 1 FROM group_members gm WHERE gm.group_id = g.id AND gm.user_id = $2))
             GROUP BY g.id",
            GROUP_SELECT
        );
        Ok(sqlx::query_as::<_, Group>(&sql)
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn groups_for_member(&self, user_id: Uuid) -> StorageResult<Vec<Group>> {
        let sql = format!(
            "{} WHERE g.admin_id = $1
                OR EXISTS (SELECT 1 FROM group_members gm WHERE gm.group_id = g.id AND gm.user_id = $1)
             GROUP BY g.id
             ORDER BY g.created_at DESC",
            GROUP_SELECT
        );
        Ok(sqlx::query_as::<_, Group>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_groups_administered(&self, user_id: Uuid) -> StorageResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM study_groups WHERE admin_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn insert_group(&self, group: &Group) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO study_groups (id, name, admin_id, created_at) VALUES ($1, $2, $3, $4)")
            .bind(group.id)
            .bind(&group.name)
            .bind(group.admin_id)
            .bind(group.created_at)
            .execute(&mut *tx)
            .await?;

        for member in &group.members {
            sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(group.id)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO group_members (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }

    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let removed = sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed == 1)
    }

    async fn feedback(&self, id: Uuid) -> StorageResult<Option<Feedback>> {
        let sql = format!("SELECT {} FROM feedback WHERE id = $1", FEEDBACK_COLUMNS);
        Ok(sqlx::query_as::<_, Feedback>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn feedback_for_document(&self, document_id: Uuid) -> StorageResult<Vec<Feedback>> {
        let sql = format!(
            "SELECT {} FROM feedback WHERE document_id = $1 ORDER BY created_at ASC",
            FEEDBACK_COLUMNS
        );
        Ok(sqlx::query_as::<_, Feedback>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO feedback (id, user_id, document_id, content, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(feedback.id)
        .bind(feedback.user_id)
        .bind(feedback.document_id)
        .bind(&feedback.content)
        .bind(feedback.created_at)
        .bind(feedback.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_feedback(&self, feedback: &Feedback) -> StorageResult<()> {
        sqlx::query("UPDATE feedback SET content = $2, updated_at = $3 WHERE id = $1")
            .bind(feedback.id)
            .bind(&feedback.content)
            .bind(feedback.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_feedback(&self, id: Uuid) -> StorageResult<CascadeSummary> {
        let mut tx = self.pool.begin().await?;

        let comments = sqlx::query("DELETE FROM comments WHERE feedback_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let feedback = sqlx::query("DELETE FROM feedback WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(CascadeSummary { documents: 0, feedback, comments })
    }

    async fn comment(&self, id: Uuid) -> StorageResult<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn comments_for(&self, parent: CommentParent) -> StorageResult<Vec<Comment>> {
        let (column, id) = match parent {
            CommentParent::Feedback(id) => ("feedback_id", id),
            CommentParent::Document(id) => ("document_id", id),
        };
        let sql = format!(
            "SELECT {} FROM comments WHERE {} = $1 ORDER BY created_at ASC",
            COMMENT_COLUMNS, column
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_comment(&self, comment: &Comment) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, user_id, feedback_id, document_id, content, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(comment.id)
        .bind(comment.user_id)
        .bind(comment.feedback_id)
        .bind(comment.document_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_comment(&self, comment: &Comment) -> StorageResult<()> {
        sqlx::query("UPDATE comments SET content = $2, updated_at = $3 WHERE id = $1")
            .bind(comment.id)
            .bind(&comment.content)
            .bind(comment.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_comment(&self, id: Uuid) -> StorageResult<bool> {
        let removed = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed == 1)
    }

    async fn subscription(&self, user_id: Uuid) -> StorageResult<Option<Subscription>> {
        Ok(sqlx::query_as::<_, Subscription>(
            "SELECT user_id, plan, status, current_period_end, updated_at FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO subscriptions (user_id, plan, status, current_period_end, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id) DO UPDATE
             SET plan = EXCLUDED.plan,
                 status = EXCLUDED.status,
                 current_period_end = EXCLUDED.current_period_end,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(subscription.user_id)
        .bind(&subscription.plan)
        .bind(&subscription.status)
        .bind(subscription.current_period_end)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
