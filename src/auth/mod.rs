pub mod provider;

pub use provider::{IdentityProvider, JwtIdentityProvider, ProviderError, SupabaseIdentityProvider};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::User;
use crate::database::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing header")]
    MissingHeader,

    #[error("invalid format")]
    InvalidFormat,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("user not found in database")]
    UserNotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STUDENT" => Some(Role::Student),
            "TEACHER" => Some(Role::Teacher),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
            Role::Admin => "ADMIN",
        }
    }
}

/// The authenticated caller for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    /// `None` when the stored role is not one we recognise
    pub role: Option<Role>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: Role::parse(&user.role),
        }
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthError::InvalidFormat)?;

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::InvalidFormat);
    }
    Ok(token)
}

/// Turns an `Authorization` header into a stored user.
pub struct AuthResolver {
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn Storage>,
    allow_unverified_fallback: bool,
}

impl AuthResolver {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn Storage>,
        allow_unverified_fallback: bool,
    ) -> Self {
        Self {
            provider,
            storage,
            allow_unverified_fallback,
        }
    }

    pub async fn resolve(&self, header: Option<&str>) -> Result<Principal, AuthError> {
        let token = extract_bearer(header)?;
        let subject = self.subject(token).await?;
        let user_id = Uuid::parse_str(&subject)
            .map_err(|_| AuthError::InvalidToken(format!("subject '{}' is not a uuid", subject)))?;

        let user = self.storage.user(user_id).await?.ok_or(AuthError::UserNotFound)?;
        Ok(Principal::from(&user))
    }

    async fn subject(&self, token: &str) -> Result<String, AuthError> {
        let err = match self.provider.verify(token).await {
            Ok(subject) => return Ok(subject),
            Err(err) => err,
        };

        if !self.allow_unverified_fallback {
            return Err(AuthError::InvalidToken(err.to_string()));
        }

        // Weak path: the caller's claimed subject is trusted as-is
        match provider::unverified_subject(token) {
            Some(subject) => {
                tracing::warn!(
                    subject = %subject,
                    provider_error = %err,
                    "Identity provider failed; trusting unverified token subject"
                );
                Ok(subject)
            }
            None => Err(AuthError::InvalidToken(err.to_string())),
        }
    }
}
