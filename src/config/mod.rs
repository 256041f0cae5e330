use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

use crate::database::models::Plan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub identity: IdentityConfig,
    pub plans: PlanConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Falls back to DATABASE_URL when unset
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
    /// Return the underlying message on 500s instead of a generic one
    pub expose_internal_errors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    /// HS256 secret for locally verified tokens
    pub jwt_secret: String,
    /// Accept a token's unverified `sub` claim when the identity provider
    /// rejects or cannot be reached. Weak; logged on every use.
    pub allow_unverified_fallback: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

/// `None` means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_documents: Option<i64>,
    pub max_groups: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub free: PlanLimits,
    pub pro: PlanLimits,
    pub enterprise: PlanLimits,
}

impl PlanConfig {
    pub fn limits_for(&self, plan: Plan) -> PlanLimits {
        match plan {
            Plan::Free => self.free,
            Plan::Pro => self.pro,
            Plan::Enterprise => self.enterprise,
        }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            free: PlanLimits { max_documents: Some(5), max_groups: Some(1) },
            pro: PlanLimits { max_documents: Some(100), max_groups: Some(10) },
            enterprise: PlanLimits { max_documents: None, max_groups: None },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    /// Reject settings that must never reach a production deployment
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Production && self.security.allow_unverified_fallback {
            return Err(ConfigError::Unsafe(
                "unverified token fallback must be disabled in production",
            ));
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_EXPOSE_INTERNAL_ERRORS") {
            self.api.expose_internal_errors = v.parse().unwrap_or(self.api.expose_internal_errors);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SUPABASE_JWT_SECRET").or_else(|_| env::var("JWT_SECRET")) {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ALLOW_UNVERIFIED_FALLBACK") {
            self.security.allow_unverified_fallback =
                v.parse().unwrap_or(self.security.allow_unverified_fallback);
        }

        // Identity provider
        if let Ok(v) = env::var("SUPABASE_URL") {
            self.identity.supabase_url = Some(v);
        }
        if let Ok(v) = env::var("SUPABASE_ANON_KEY") {
            self.identity.supabase_anon_key = Some(v);
        }

        // Plan limits
        if let Ok(v) = env::var("PLAN_FREE_MAX_DOCUMENTS") {
            self.plans.free.max_documents = limit_override(&v, self.plans.free.max_documents);
        }
        if let Ok(v) = env::var("PLAN_FREE_MAX_GROUPS") {
            self.plans.free.max_groups = limit_override(&v, self.plans.free.max_groups);
        }
        if let Ok(v) = env::var("PLAN_PRO_MAX_DOCUMENTS") {
            self.plans.pro.max_documents = limit_override(&v, self.plans.pro.max_documents);
        }
        if let Ok(v) = env::var("PLAN_PRO_MAX_GROUPS") {
            self.plans.pro.max_groups = limit_override(&v, self.plans.pro.max_groups);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                expose_internal_errors: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: String::new(),
                allow_unverified_fallback: true,
            },
            identity: IdentityConfig::default(),
            plans: PlanConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                expose_internal_errors: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                allow_unverified_fallback: true,
            },
            identity: IdentityConfig::default(),
            plans: PlanConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                expose_internal_errors: false,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                allow_unverified_fallback: false,
            },
            identity: IdentityConfig::default(),
            plans: PlanConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Unsafe(&'static str),
}

/// `unlimited` or an empty value lifts the limit; anything unparsable keeps
/// the current one.
fn limit_override(raw: &str, current: Option<i64>) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("unlimited") {
        return None;
    }
    match raw.parse() {
        Ok(limit) => Some(limit),
        Err(_) => {
            tracing::warn!("Ignoring invalid plan limit {:?}; keeping {:?}", raw, current);
            current
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.api.expose_internal_errors);
        assert!(config.security.allow_unverified_fallback);
        assert_eq!(config.plans.free.max_documents, Some(5));
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.api.expose_internal_errors);
        assert!(!config.security.allow_unverified_fallback);
        assert_eq!(config.api.max_request_size_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn fallback_is_refused_in_production() {
        let mut config = AppConfig::production();
        assert!(config.validate().is_ok());

        config.security.allow_unverified_fallback = true;
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "unverified token fallback must be disabled in production");

        let mut staging = AppConfig::staging();
        staging.security.allow_unverified_fallback = true;
        assert!(staging.validate().is_ok());
    }

    #[test]
    fn plan_limit_override_keeps_limit_on_typo() {
        assert_eq!(limit_override("five", Some(5)), Some(5));
        assert_eq!(limit_override("-", None), None);
        assert_eq!(limit_override(" 12 ", Some(5)), Some(12));
        assert_eq!(limit_override("unlimited", Some(5)), None);
        assert_eq!(limit_override("UNLIMITED", Some(1)), None);
        assert_eq!(limit_override("", Some(5)), None);
    }

    #[test]
    fn enterprise_plan_is_unlimited() {
        let plans = PlanConfig::default();
        let limits = plans.limits_for(Plan::Enterprise);
        assert_eq!(limits.max_documents, None);
        assert_eq!(limits.max_groups, None);
        assert_eq!(plans.limits_for(Plan::Pro).max_groups, Some(10));
    }
}
