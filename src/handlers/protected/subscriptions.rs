use axum::{extract::State, Extension};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id_params;
use crate::auth::Principal;
use crate::config::PlanLimits;
use crate::database::models::{Plan, Subscription, SubscriptionStatus};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::validation::{Field, ObjectSchema, RequestSchema, ValidatedRequest};

pub fn set_schema() -> RequestSchema {
    RequestSchema::new().params(id_params()).body(
        ObjectSchema::new()
            .field("plan", Field::enumeration(&Plan::ALL))
            .field("status", Field::enumeration(&SubscriptionStatus::ALL).default("ACTIVE"))
            .field("currentPeriodEnd", Field::datetime().optional()),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetSubscription {
    plan: Plan,
    status: SubscriptionStatus,
    current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub documents: i64,
    pub groups: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    /// Plan in force; FREE when the stored one is inactive
    pub plan: Plan,
    pub subscription: Option<Subscription>,
    pub limits: PlanLimits,
    pub usage: Usage,
}

/// GET /api/subscription - effective plan, limits and usage for the caller
pub async fn current(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<SubscriptionSummary> {
    let subscription = state.storage.subscription(principal.id).await?;
    let plan = subscription.as_ref().map(Subscription::effective_plan).unwrap_or(Plan::Free);

    let usage = Usage {
        documents: state.storage.count_documents_by_owner(principal.id).await?,
        groups: state.storage.count_groups_administered(principal.id).await?,
    };

    Ok(ApiResponse::success(SubscriptionSummary {
        plan,
        limits: state.plans.limits_for(plan),
        subscription,
        usage,
    }))
}

/// PUT /api/users/:id/subscription - ADMIN
pub async fn set(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(req): Extension<ValidatedRequest>,
) -> ApiResult<Subscription> {
    let user_id = req.param_uuid("id")?;
    if state.storage.user(user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let input: SetSubscription = req.body_as()?;
    let mut subscription = Subscription::new(user_id, input.plan, input.status);
    subscription.current_period_end = input.current_period_end;

    state.storage.upsert_subscription(&subscription).await?;
    tracing::info!(
        admin_id = %principal.id,
        user_id = %user_id,
        plan = subscription.plan.as_str(),
        status = subscription.status.as_str(),
        "Subscription updated"
    );
    Ok(ApiResponse::success(subscription))
}
