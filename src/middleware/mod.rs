// Request pipeline: ordered stages run by one dispatcher per route.
//
// Each stage either lets the request continue, answers it directly, or
// fails with an ApiError. The first stage that does not continue ends the
// request; the handler only runs when every stage continued.

pub mod response;
pub mod stages;

pub use response::{ApiResponse, ApiResult};
pub use stages::{Authenticate, EnforcePlanLimit, LimitedResource, RequireRole, Validate};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{Query, RawPathParams, Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::validation::{RawRequest, ValidatedRequest};

/// Outcome of a stage that did not fail
pub enum Flow {
    Continue,
    Respond(Response),
}

/// Everything a stage may inspect or attach for one request.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Value,
    pub body_error: Option<String>,
    pub principal: Option<Principal>,
    pub validated: Option<ValidatedRequest>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            params: Map::new(),
            query: Map::new(),
            body: Value::Null,
            body_error: None,
            principal: None,
            validated: None,
        }
    }

    /// Parse raw body bytes; an empty body is `Null`
    pub fn with_body(mut self, bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            self.body = Value::Null;
        } else {
            match serde_json::from_slice(bytes) {
                Ok(value) => self.body = value,
                Err(e) => self.body_error = Some(e.to_string()),
            }
        }
        self
    }

    /// Resolved caller; stages after `Authenticate` rely on it
    pub fn principal(&self) -> Result<&Principal, ApiError> {
        self.principal
            .as_ref()
            .ok_or_else(|| ApiError::internal("pipeline stage ran before authentication"))
    }

    pub fn raw_request(&self) -> RawRequest {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();

        RawRequest {
            params: self.params.clone(),
            query: self.query.clone(),
            headers,
            body: self.body.clone(),
            body_error: self.body_error.clone(),
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut RequestContext) -> Result<Flow, ApiError>;
}

#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    max_body_bytes: usize,
}

impl Pipeline {
    pub fn new(max_body_bytes: usize) -> Self {
        Self {
            stages: Vec::new(),
            max_body_bytes,
        }
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run stages in registration order, stopping at the first that does not continue
    pub async fn run(&self, ctx: &mut RequestContext) -> Result<Flow, ApiError> {
        for stage in &self.stages {
            let started = Instant::now();
            match stage.run(ctx).await {
                Ok(Flow::Continue) => {
                    tracing::debug!(
                        stage = stage.name(),
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "{} {} stage passed",
                        ctx.method,
                        ctx.path
                    );
                }
                Ok(Flow::Respond(response)) => {
                    tracing::debug!(stage = stage.name(), "{} {} answered by stage", ctx.method, ctx.path);
                    return Ok(Flow::Respond(response));
                }
                Err(err) => {
                    tracing::debug!(
                        stage = stage.name(),
                        status = err.status_code(),
                        "{} {} stopped: {}",
                        ctx.method,
                        ctx.path,
                        err
                    );
                    return Err(err);
                }
            }
        }
        Ok(Flow::Continue)
    }
}

fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// axum middleware entry point; install with
/// `middleware::from_fn_with_state(Arc<Pipeline>, dispatch)` as a route layer.
pub async fn dispatch(
    State(pipeline): State<Arc<Pipeline>>,
    path_params: Option<RawPathParams>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let bytes = match to_bytes(body, pipeline.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) if exceeds_length_limit(&e) => {
            return ApiError::payload_too_large(format!(
                "Request body exceeds {} bytes",
                pipeline.max_body_bytes
            ))
            .into_response()
        }
        Err(e) => return ApiError::bad_request(format!("Unable to read request body: {}", e)).into_response(),
    };

    let query = match Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
        Ok(Query(query)) => query.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
        Err(e) => return ApiError::bad_request(format!("Invalid query string: {}", e)).into_response(),
    };

    let mut ctx = RequestContext::new(parts.method.clone(), parts.uri.path(), parts.headers.clone()).with_body(&bytes);
    ctx.query = query;
    if let Some(params) = &path_params {
        ctx.params = params
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
    }

    match pipeline.run(&mut ctx).await {
        Ok(Flow::Continue) => {}
        Ok(Flow::Respond(response)) => return response,
        Err(err) => return err.into_response(),
    }

    // Downstream sees the coerced body, not the raw one
    let body = match ctx.validated.as_ref().map(|v| &v.body) {
        Some(validated) if !validated.is_null() => match serde_json::to_vec(validated) {
            Ok(encoded) => {
                parts.headers.remove(header::CONTENT_LENGTH);
                Body::from(encoded)
            }
            Err(e) => return ApiError::internal(e).into_response(),
        },
        _ => Body::from(bytes),
    };

    if let Some(principal) = ctx.principal.take() {
        parts.extensions.insert(principal);
    }
    if let Some(validated) = ctx.validated.take() {
        parts.extensions.insert(validated);
    }

    next.run(Request::from_parts(parts, body)).await
}

/// App-wide layer: swaps 500 details for the generic message unless
/// `expose` is set. Install with `middleware::from_fn_with_state(expose, ..)`.
pub async fn redact_internal_errors(State(expose): State<bool>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if expose {
        return response;
    }
    match response.extensions().get::<ApiError>() {
        Some(err @ ApiError::InternalServerError(_)) => err.clone().redacted().into_response(),
        _ => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Count(Arc<AtomicUsize>);

    #[async_trait]
    impl Stage for Count {
        fn name(&self) -> &'static str {
            "count"
        }

        async fn run(&self, _ctx: &mut RequestContext) -> Result<Flow, ApiError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }
    }

    struct Refuse;

    #[async_trait]
    impl Stage for Refuse {
        fn name(&self) -> &'static str {
            "refuse"
        }

        async fn run(&self, _ctx: &mut RequestContext) -> Result<Flow, ApiError> {
            Err(ApiError::forbidden("no"))
        }
    }

    struct Teapot;

    #[async_trait]
    impl Stage for Teapot {
        fn name(&self) -> &'static str {
            "teapot"
        }

        async fn run(&self, _ctx: &mut RequestContext) -> Result<Flow, ApiError> {
            Ok(Flow::Respond(StatusCode::IM_A_TEAPOT.into_response()))
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::GET, "/api/test", HeaderMap::new())
    }

    #[tokio::test]
    async fn stages_stop_at_first_failure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(1024)
            .stage(Count(hits.clone()))
            .stage(Refuse)
            .stage(Count(hits.clone()));

        let result = pipeline.run(&mut ctx()).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_stage_may_answer_directly() {
        let hits = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(1024).stage(Teapot).stage(Count(hits.clone()));

        match pipeline.run(&mut ctx()).await {
            Ok(Flow::Respond(response)) => assert_eq!(response.status(), StatusCode::IM_A_TEAPOT),
            _ => panic!("expected a direct response"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.stage_names(), vec!["teapot", "count"]);
    }

    #[tokio::test]
    async fn length_limit_is_told_apart_from_other_body_errors() {
        let err = to_bytes(Body::from(vec![0u8; 10]), 4).await.unwrap_err();
        assert!(exceeds_length_limit(&err));
        assert!(!exceeds_length_limit(&axum::Error::new("connection reset")));
    }

    #[test]
    fn body_parsing() {
        assert_eq!(ctx().with_body(b"").body, Value::Null);
        assert_eq!(ctx().with_body(br#"{"a":1}"#).body["a"], 1);
        assert!(ctx().with_body(b"{oops").body_error.is_some());
    }
}
