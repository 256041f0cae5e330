mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::TestApp;

#[tokio::test]
async fn profile_name_can_be_updated() -> Result<()> {
    let app = TestApp::new();
    let student = app.user("STUDENT").await?;

    let (status, body) = app.patch("/api/users/me", &student, json!({ "name": "Ada" })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Ada");

    let (status, body) = app.patch("/api/users/me", &student, json!({ "name": "" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field_errors"][0]["field"], "name");
    Ok(())
}

#[tokio::test]
async fn user_administration_is_admin_only() -> Result<()> {
    let app = TestApp::new();
    let admin = app.user("ADMIN").await?;
    let teacher = app.user("TEACHER").await?;
    let student = app.user("STUDENT").await?;

    let (status, _) = app.get("/api/users", &teacher).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/users", &admin).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3));

    let role_uri = format!("/api/users/{}/role", student.id());
    let (status, _) = app.patch(&role_uri, &teacher, json!({ "role": "TEACHER" })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.patch(&role_uri, &admin, json!({ "role": "SUPERUSER" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field_errors"][0]["field"], "role");

    let (status, body) = app.patch(&role_uri, &admin, json!({ "role": "TEACHER" })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "TEACHER");

    // The promotion takes effect on the next request
    let (status, _) = app.post("/api/groups", &student, json!({ "name": "Promoted" })).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .patch(&format!("/api/users/{}/role", Uuid::new_v4()), &admin, json!({ "role": "ADMIN" }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn subscription_summary_reports_plan_limits_and_usage() -> Result<()> {
    let app = TestApp::new();
    let admin = app.user("ADMIN").await?;
    let teacher = app.user("TEACHER").await?;

    app.post("/api/documents", &teacher, json!({ "title": "Syllabus" })).await?;

    let (status, body) = app.get("/api/subscription", &teacher).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["plan"], "FREE");
    assert!(body["data"]["subscription"].is_null());
    assert_eq!(body["data"]["limits"]["maxDocuments"], 5);
    assert_eq!(body["data"]["usage"]["documents"], 1);

    let sub_uri = format!("/api/users/{}/subscription", teacher.id());
    let (status, body) = app
        .put(&sub_uri, &admin, json!({ "plan": "ENTERPRISE", "currentPeriodEnd": "2030-01-31" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ACTIVE");
    assert_eq!(body["data"]["currentPeriodEnd"], "2030-01-31T00:00:00Z");

    let (_, body) = app.get("/api/subscription", &teacher).await?;
    assert_eq!(body["data"]["plan"], "ENTERPRISE");
    assert!(body["data"]["limits"]["maxGroups"].is_null());

    let (status, _) = app
        .put(&sub_uri, &admin, json!({ "plan": "PRO", "status": "PAST_DUE" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/subscription", &teacher).await?;
    assert_eq!(body["data"]["plan"], "FREE");

    let (status, _) = app.put(&sub_uri, &teacher, json!({ "plan": "PRO" })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
