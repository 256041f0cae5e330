#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use docfeed_api::auth::{IdentityProvider, ProviderError};
use docfeed_api::config::AppConfig;
use docfeed_api::database::models::User;
use docfeed_api::database::{MemoryStorage, Storage};
use docfeed_api::{app, AppState};

/// Maps opaque test tokens to user ids; anything else is rejected.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: RwLock<HashMap<String, String>>,
    offline: RwLock<bool>,
}

impl StaticIdentityProvider {
    pub fn issue(&self, subject: impl Into<String>) -> String {
        let token = format!("test-token-{}", Uuid::new_v4().simple());
        self.tokens.write().unwrap().insert(token.clone(), subject.into());
        token
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.write().unwrap() = offline;
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, token: &str) -> Result<String, ProviderError> {
        if *self.offline.read().unwrap() {
            return Err(ProviderError::Unreachable("connection refused".into()));
        }
        self.tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("unknown token".into()))
    }
}

pub struct TestApp {
    pub storage: Arc<MemoryStorage>,
    pub provider: Arc<StaticIdentityProvider>,
    router: Router,
}

pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = AppConfig::development();
        config.security.allow_unverified_fallback = false;
        Self::with_config(config)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let provider = Arc::new(StaticIdentityProvider::default());
        let state = AppState::new(storage.clone(), provider.clone(), &config);

        Self {
            storage,
            provider,
            router: app(state),
        }
    }

    /// Store a user with the given role and hand out a token for it
    pub async fn user(&self, role: &str) -> Result<TestUser> {
        let id = Uuid::new_v4();
        let user = User::new(id, format!("{}@school.edu", id.simple()), role);
        self.storage.insert_user(&user).await?;
        let token = self.provider.issue(id.to_string());
        Ok(TestUser { user, token })
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("router failed")?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response was not JSON")?
        };
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, as_user: &TestUser) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, Some(&as_user.token), None).await
    }

    pub async fn post(&self, uri: &str, as_user: &TestUser, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, Some(&as_user.token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, as_user: &TestUser, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::PUT, uri, Some(&as_user.token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, as_user: &TestUser, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::PATCH, uri, Some(&as_user.token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, as_user: &TestUser) -> Result<(StatusCode, Value)> {
        self.request(Method::DELETE, uri, Some(&as_user.token), None).await
    }
}

/// `data.id` of a success envelope
pub fn data_id(body: &Value) -> Result<String> {
    body["data"]["id"]
        .as_str()
        .map(str::to_string)
        .context("response has no data.id")
}
