use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::core::security::Role;
use crate::db::types::CognitiveLevel;
use crate::test_support::{
    bearer_token, json_request, question, read_json, setup_test_context, TestContext,
};

fn seed_pool(ctx: &TestContext) {
    for index in 0..4 {
        ctx.catalog.add_question(question(
            &format!("rec-{index}"),
            "lesson-1",
            CognitiveLevel::Recognition,
        ));
    }
    for index in 0..2 {
        ctx.catalog.add_question(question(
            &format!("app-{index}"),
            "lesson-2",
            CognitiveLevel::Application,
        ));
    }
    ctx.catalog.add_question(question("elsewhere", "lesson-9", CognitiveLevel::Application));
}

#[tokio::test]
async fn admin_generates_and_reads_back_an_exam() {
    let ctx = setup_test_context().await;
    seed_pool(&ctx);
    let token = bearer_token("admin-1", Role::Admin, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/exams/generate",
            Some(&token),
            Some(json!({
                "title": "Unit test",
                "durationMinutes": 40,
                "lessonIds": ["lesson-1", "lesson-2"],
                "levelCounts": { "recognition": 2, "application": 1 },
                "variantCount": 3,
                "seed": 7
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["total_questions"], 3);
    assert_eq!(created["generation_seed"], 7);
    let variants = created["variants"].as_array().expect("variants");
    assert_eq!(variants.len(), 3);
    for variant in variants {
        let ids = variant["question_ids"].as_array().expect("ids");
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| id != "elsewhere"));
    }

    let exam_id = created["id"].as_str().expect("id");
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, &format!("/api/v1/exams/{exam_id}"), Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["variants"], created["variants"]);
}

#[tokio::test]
async fn shortfall_is_reported_per_level() {
    let ctx = setup_test_context().await;
    seed_pool(&ctx);
    let token = bearer_token("admin-1", Role::Admin, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/exams/generate",
            Some(&token),
            Some(json!({
                "title": "Too big",
                "duration_minutes": 30,
                "lesson_ids": ["lesson-1", "lesson-2"],
                "level_counts": { "recognition": 2, "application": 5 }
            })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert_eq!(
        body["shortfalls"],
        json!([{ "level": "application", "requested": 5, "available": 2 }])
    );
}

#[tokio::test]
async fn students_cannot_generate_exams() {
    let ctx = setup_test_context().await;
    let token = bearer_token("student-1", Role::Student, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/exams/generate",
            Some(&token),
            Some(json!({
                "title": "Nope",
                "duration_minutes": 30,
                "lesson_ids": ["lesson-1"],
                "level_counts": { "recognition": 1 }
            })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn availability_counts_each_level() {
    let ctx = setup_test_context().await;
    seed_pool(&ctx);
    let token = bearer_token("admin-1", Role::Admin, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            "/api/v1/questions/availability?lesson_ids=lesson-1,lesson-2",
            Some(&token),
            None,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["total"], 6);
    assert_eq!(body["levels"]["recognition"], 4);
    assert_eq!(body["levels"]["application"], 2);
}
