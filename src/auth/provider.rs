use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("identity provider not configured: {0}")]
    NotConfigured(&'static str),

    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("unexpected identity provider response: {0}")]
    BadResponse(String),
}

/// Verifies a bearer token and returns the subject it was issued to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Hosted auth: asks the provider's `/auth/v1/user` endpoint who owns the token.
pub struct SupabaseIdentityProvider {
    client: reqwest::Client,
    user_endpoint: Url,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
}

impl SupabaseIdentityProvider {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self, ProviderError> {
        let base = Url::parse(base_url)
            .map_err(|e| ProviderError::BadResponse(format!("invalid provider url: {}", e)))?;
        let user_endpoint = base
            .join("/auth/v1/user")
            .map_err(|e| ProviderError::BadResponse(format!("invalid provider url: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            user_endpoint,
            anon_key: anon_key.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn verify(&self, token: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(self.user_endpoint.clone())
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ProviderError::Rejected(format!("provider answered {}", status)));
        }
        if !status.is_success() {
            return Err(ProviderError::Unreachable(format!("provider answered {}", status)));
        }

        let user: SupabaseUser = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
        Ok(user.id)
    }
}

/// Local HS256 verification against the project JWT secret.
pub struct JwtIdentityProvider {
    secret: String,
}

impl JwtIdentityProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> Result<String, ProviderError> {
        if self.secret.is_empty() {
            return Err(ProviderError::NotConfigured("jwt secret"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Hosted tokens carry audience "authenticated"; not checked here
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;
        Ok(data.claims.sub)
    }
}

/// Reads `sub` from the token payload WITHOUT checking the signature or
/// expiry. Anyone can mint a token that passes this. Only reachable when
/// `security.allow_unverified_fallback` is on.
pub fn unverified_subject(token: &str) -> Option<String> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let claims = json!({ "sub": sub, "exp": Utc::now().timestamp() + exp_offset });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn jwt_provider_accepts_tokens_signed_with_its_secret() {
        let provider = JwtIdentityProvider::new("s3cret");
        let subject = provider.verify(&token("s3cret", "abc", 3600)).await.unwrap();
        assert_eq!(subject, "abc");
    }

    #[tokio::test]
    async fn jwt_provider_rejects_foreign_and_expired_tokens() {
        let provider = JwtIdentityProvider::new("s3cret");
        assert!(matches!(
            provider.verify(&token("other", "abc", 3600)).await,
            Err(ProviderError::Rejected(_))
        ));
        assert!(provider.verify(&token("s3cret", "abc", -3600)).await.is_err());
    }

    #[tokio::test]
    async fn jwt_provider_without_secret_is_not_configured() {
        let provider = JwtIdentityProvider::new("");
        assert!(matches!(
            provider.verify(&token("x", "abc", 3600)).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn unverified_subject_ignores_signature_and_expiry() {
        assert_eq!(unverified_subject(&token("anything", "abc", -3600)).as_deref(), Some("abc"));
        assert_eq!(unverified_subject("not-a-jwt"), None);
    }

    #[test]
    fn supabase_endpoint_is_derived_from_base_url() {
        let provider = SupabaseIdentityProvider::new("https://project.supabase.co", "anon").unwrap();
        assert_eq!(provider.user_endpoint.as_str(), "https://project.supabase.co/auth/v1/user");
        assert!(SupabaseIdentityProvider::new("not a url", "anon").is_err());
    }
}
