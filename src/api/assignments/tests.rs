use axum::http::{Method, StatusCode};
use serde_json::json;
use time::Duration;
use tower::ServiceExt;

use crate::core::security::Role;
use crate::db::models::Exam;
use crate::repositories::ExamCatalog;
use crate::test_support::{
    bearer_token, exam_fixture, json_request, read_json, setup_test_context, TestContext,
};

async fn stored_exam(ctx: &TestContext) -> Exam {
    let exam = exam_fixture(&ctx.catalog, 3, 2);
    ctx.catalog.insert_exam(&exam).await.expect("exam");
    exam
}

async fn create(ctx: &TestContext, exam: &Exam, publish: bool) -> serde_json::Value {
    let token = bearer_token("admin-1", Role::Admin, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/assignments",
            Some(&token),
            Some(json!({
                "examId": exam.id,
                "classId": "10A",
                "startTime": "2025-04-01T09:00:00Z",
                "endTime": "2025-04-01T11:00:00Z",
                "maxAttempts": 2,
                "publish": publish
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

async fn entry(ctx: &TestContext, code: &str) -> (StatusCode, serde_json::Value) {
    let token = bearer_token("student-1", Role::Student, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/v1/assignments/code/{code}"),
            Some(&token),
            None,
        ))
        .await
        .expect("response");
    let status = response.status();
    (status, read_json(response).await)
}

#[tokio::test]
async fn draft_assignment_is_found_but_not_startable_until_published() {
    let ctx = setup_test_context().await;
    let exam = stored_exam(&ctx).await;
    let created = create(&ctx, &exam, false).await;
    assert_eq!(created["status"], "draft");
    let code = created["code"].as_str().expect("code").to_string();
    assert_eq!(code.len(), 8);

    let (status, body) = entry(&ctx, &code.to_lowercase()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["can_start"], false);
    assert_eq!(body["total_questions"], 3);
    assert_eq!(body["duration_minutes"], 45);

    let admin = bearer_token("admin-1", Role::Admin, ctx.state.settings());
    let id = created["id"].as_str().expect("id");
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/assignments/{id}/publish"),
            Some(&admin),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "open");

    let (_, body) = entry(&ctx, &code).await;
    assert_eq!(body["can_start"], true);
    assert_eq!(body["attempts_used"], 0);
    assert!(body["reason"].is_null());
}

#[tokio::test]
async fn elapsed_window_reads_as_closed() {
    let ctx = setup_test_context().await;
    let exam = stored_exam(&ctx).await;
    let created = create(&ctx, &exam, true).await;
    let code = created["code"].as_str().expect("code").to_string();

    ctx.clock.advance(Duration::hours(3));

    let (_, body) = entry(&ctx, &code).await;
    assert_eq!(body["status"], "closed");
    assert_eq!(body["can_start"], false);
}

#[tokio::test]
async fn closing_twice_is_a_conflict() {
    let ctx = setup_test_context().await;
    let exam = stored_exam(&ctx).await;
    let created = create(&ctx, &exam, true).await;
    let id = created["id"].as_str().expect("id").to_string();
    let admin = bearer_token("admin-1", Role::Admin, ctx.state.settings());

    let close = || {
        json_request(Method::POST, &format!("/api/v1/assignments/{id}/close"), Some(&admin), None)
    };
    let first = ctx.app.clone().oneshot(close()).await.expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    let second = ctx.app.clone().oneshot(close()).await.expect("response");
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_or_malformed_codes_are_not_found() {
    let ctx = setup_test_context().await;

    let (status, _) = entry(&ctx, "ZZZZ9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = entry(&ctx, "short").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn assignment_for_missing_exam_is_rejected() {
    let ctx = setup_test_context().await;
    let admin = bearer_token("admin-1", Role::Admin, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/assignments",
            Some(&admin),
            Some(json!({
                "exam_id": "missing",
                "class_id": "10A",
                "start_time": "2025-04-01T09:00:00Z",
                "end_time": "2025-04-01T11:00:00Z"
            })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
