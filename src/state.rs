use std::sync::Arc;

use crate::access::AccessControl;
use crate::auth::{AuthResolver, IdentityProvider};
use crate::config::{AppConfig, PlanConfig};
use crate::database::Storage;
use crate::middleware::{Authenticate, EnforcePlanLimit, LimitedResource, Pipeline};

/// Shared handles for handlers and pipeline stages. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub access: AccessControl,
    pub auth: Arc<AuthResolver>,
    pub plans: PlanConfig,
    pub max_body_bytes: usize,
    pub expose_internal_errors: bool,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn IdentityProvider>, config: &AppConfig) -> Self {
        let auth = AuthResolver::new(
            provider,
            storage.clone(),
            config.security.allow_unverified_fallback,
        );

        Self {
            access: AccessControl::new(storage.clone()),
            auth: Arc::new(auth),
            plans: config.plans.clone(),
            max_body_bytes: config.api.max_request_size_bytes,
            expose_internal_errors: config.api.expose_internal_errors,
            storage,
        }
    }

    /// Pipeline for `/api` routes; authentication always runs first
    pub fn protected(&self) -> Pipeline {
        Pipeline::new(self.max_body_bytes).stage(Authenticate::new(self.auth.clone()))
    }

    pub fn plan_limit(&self, resource: LimitedResource) -> EnforcePlanLimit {
        EnforcePlanLimit::new(resource, self.storage.clone(), self.plans.clone())
    }
}
