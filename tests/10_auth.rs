mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use uuid::Uuid;

use common::TestApp;
use docfeed_api::config::AppConfig;

#[tokio::test]
async fn health_and_root_are_public() -> Result<()> {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = app.request(Method::GET, "/", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "docfeed-api");
    Ok(())
}

#[tokio::test]
async fn health_reports_unavailable_storage() -> Result<()> {
    let app = TestApp::new();
    app.storage.set_unavailable(true);

    let (status, _) = app.request(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn missing_header_is_unauthorized() -> Result<()> {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/api/documents", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["message"], "missing header");
    Ok(())
}

#[tokio::test]
async fn malformed_header_is_unauthorized() -> Result<()> {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/api/users/me")
        .header("authorization", "Token abc")
        .body(Body::empty())?;

    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid format");

    let (status, body) = app.request(Method::GET, "/api/users/me", Some(""), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid format");
    Ok(())
}

#[tokio::test]
async fn unknown_token_is_unauthorized() -> Result<()> {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/api/users/me", Some("forged"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid token");
    Ok(())
}

#[tokio::test]
async fn verified_subject_without_user_row_is_not_found() -> Result<()> {
    let app = TestApp::new();
    let token = app.provider.issue(Uuid::new_v4().to_string());

    let (status, body) = app.request(Method::GET, "/api/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "user not found in database");
    Ok(())
}

#[tokio::test]
async fn resolved_principal_reaches_the_handler() -> Result<()> {
    let app = TestApp::new();
    let student = app.user("STUDENT").await?;

    let (status, body) = app.get("/api/users/me", &student).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], student.id().to_string());
    assert_eq!(body["data"]["role"], "STUDENT");
    Ok(())
}

#[tokio::test]
async fn provider_outage_falls_back_to_token_subject_when_enabled() -> Result<()> {
    let mut config = AppConfig::development();
    config.security.allow_unverified_fallback = true;
    let app = TestApp::with_config(config);
    let teacher = app.user("TEACHER").await?;
    app.provider.set_offline(true);

    let claims = json!({ "sub": teacher.id().to_string(), "exp": Utc::now().timestamp() + 600 });
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"not-the-real-secret"))?;

    let (status, body) = app.request(Method::GET, "/api/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], teacher.id().to_string());
    Ok(())
}

#[tokio::test]
async fn provider_outage_is_unauthorized_when_fallback_disabled() -> Result<()> {
    let app = TestApp::new();
    let teacher = app.user("TEACHER").await?;
    app.provider.set_offline(true);

    let (status, _) = app.get("/api/users/me", &teacher).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn storage_outage_during_auth_is_a_server_error() -> Result<()> {
    let app = TestApp::new();
    let student = app.user("STUDENT").await?;
    app.storage.set_unavailable(true);

    let (status, body) = app.get("/api/users/me", &student).await?;
    assert!(status.is_server_error());
    assert_eq!(body["error"], true);
    Ok(())
}
