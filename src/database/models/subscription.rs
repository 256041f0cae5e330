use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub const ALL: [&'static str; 3] = ["FREE", "PRO", "ENTERPRISE"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FREE" => Some(Plan::Free),
            "PRO" => Some(Plan::Pro),
            "ENTERPRISE" => Some(Plan::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Pro => "PRO",
            Plan::Enterprise => "ENTERPRISE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
}

impl SubscriptionStatus {
    pub const ALL: [&'static str; 3] = ["ACTIVE", "CANCELED", "PAST_DUE"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(SubscriptionStatus::Active),
            "CANCELED" => Some(SubscriptionStatus::Canceled),
            "PAST_DUE" => Some(SubscriptionStatus::PastDue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Canceled => "CANCELED",
            SubscriptionStatus::PastDue => "PAST_DUE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(user_id: Uuid, plan: Plan, status: SubscriptionStatus) -> Self {
        Self {
            user_id,
            plan: plan.as_str().to_string(),
            status: status.as_str().to_string(),
            current_period_end: None,
            updated_at: Utc::now(),
        }
    }

    /// Plan currently in force. Anything not active, or unrecognized, is FREE.
    pub fn effective_plan(&self) -> Plan {
        match SubscriptionStatus::parse(&self.status) {
            Some(SubscriptionStatus::Active) => Plan::parse(&self.plan).unwrap_or(Plan::Free),
            _ => Plan::Free,
        }
    }
}
