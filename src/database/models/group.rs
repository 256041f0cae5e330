use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub admin_id: Uuid,
    /// Member user ids, not including the admin unless added explicitly
    pub members: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, admin_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            admin_id,
            members: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_member(mut self, user_id: Uuid) -> Self {
        if !self.members.contains(&user_id) {
            self.members.push(user_id);
        }
        self
    }

    /// Admin or listed member
    pub fn has_access(&self, user_id: Uuid) -> bool {
        self.admin_id == user_id || self.members.contains(&user_id)
    }
}
