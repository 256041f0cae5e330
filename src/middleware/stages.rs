use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use std::sync::Arc;

use super::{Flow, RequestContext, Stage};
use crate::access::role_allowed;
use crate::auth::{AuthError, AuthResolver, Role};
use crate::config::PlanConfig;
use crate::database::models::Plan;
use crate::database::Storage;
use crate::error::ApiError;
use crate::validation::RequestSchema;

/// Resolve the `Authorization` header into a `Principal`.
pub struct Authenticate {
    resolver: Arc<AuthResolver>,
}

impl Authenticate {
    pub fn new(resolver: Arc<AuthResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Flow, ApiError> {
        let header = match ctx.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AuthError::InvalidFormat)?),
            None => None,
        };

        let principal = self.resolver.resolve(header).await.map_err(|err| {
            tracing::warn!("Authentication failed for {} {}: {}", ctx.method, ctx.path, err);
            ApiError::from(err)
        })?;

        tracing::debug!(user_id = %principal.id, "Authenticated");
        ctx.principal = Some(principal);
        Ok(Flow::Continue)
    }
}

/// Check every request part against the endpoint's schema.
pub struct Validate {
    schema: RequestSchema,
}

impl Validate {
    pub fn new(schema: RequestSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Stage for Validate {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Flow, ApiError> {
        let validated = self.schema.validate(ctx.raw_request())?;
        ctx.validated = Some(validated);
        Ok(Flow::Continue)
    }
}

/// Route-level role gate.
pub struct RequireRole {
    allowed: Vec<Role>,
}

impl RequireRole {
    pub fn new(allowed: &[Role]) -> Self {
        Self {
            allowed: allowed.to_vec(),
        }
    }
}

#[async_trait]
impl Stage for RequireRole {
    fn name(&self) -> &'static str {
        "require_role"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Flow, ApiError> {
        let principal = ctx.principal()?;
        if role_allowed(principal, &self.allowed) {
            return Ok(Flow::Continue);
        }

        tracing::warn!(
            user_id = %principal.id,
            role = ?principal.role,
            "Role gate denied {} {}",
            ctx.method,
            ctx.path
        );
        Err(ApiError::forbidden("Insufficient role for this operation"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedResource {
    Documents,
    Groups,
}

impl LimitedResource {
    fn as_str(&self) -> &'static str {
        match self {
            LimitedResource::Documents => "documents",
            LimitedResource::Groups => "groups",
        }
    }
}

/// Refuse a create once the caller's plan allowance is used up.
pub struct EnforcePlanLimit {
    resource: LimitedResource,
    storage: Arc<dyn Storage>,
    plans: PlanConfig,
}

impl EnforcePlanLimit {
    pub fn new(resource: LimitedResource, storage: Arc<dyn Storage>, plans: PlanConfig) -> Self {
        Self { resource, storage, plans }
    }
}

#[async_trait]
impl Stage for EnforcePlanLimit {
    fn name(&self) -> &'static str {
        "enforce_plan_limit"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Flow, ApiError> {
        let principal = ctx.principal()?;
        let plan = self
            .storage
            .subscription(principal.id)
            .await?
            .map(|s| s.effective_plan())
            .unwrap_or(Plan::Free);

        let limits = self.plans.limits_for(plan);
        let (limit, used) = match self.resource {
            LimitedResource::Documents => (
                limits.max_documents,
                self.storage.count_documents_by_owner(principal.id).await?,
            ),
            LimitedResource::Groups => (
                limits.max_groups,
                self.storage.count_groups_administered(principal.id).await?,
            ),
        };

        match limit {
            Some(limit) if used >= limit => {
                tracing::warn!(user_id = %principal.id, plan = plan.as_str(), used, limit, "Plan limit reached");
                Err(ApiError::limit_exceeded(format!(
                    "{} plan allows at most {} {}",
                    plan.as_str(),
                    limit,
                    self.resource.as_str()
                )))
            }
            _ => Ok(Flow::Continue),
        }
    }
}
