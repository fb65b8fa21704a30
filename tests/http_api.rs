//! HTTP surface: status codes, error bodies and JSON shapes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{body_json, build_test_app, call, get, post_json, stub_app, SlowGenerator};
use pathway_backend::config::EngineConfig;

async fn create(app: &axum::Router, owner: &str, topic: &str) -> Value {
    let res = post_json(app, "/api/v1/paths", json!({ "ownerId": owner, "topic": topic, "level": "beginner" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    body_json(res).await
}

fn step_id(path: &Value, order: u64) -> String {
    path["steps"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["order"] == order)
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string()
}

// ---------------------------------------------------------------------------
// Test: health and create/get/list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_the_generator() {
    let app = stub_app();
    let res = get(&app, "/api/v1/health").await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["generator"], "stub");
}

#[tokio::test]
async fn create_then_fetch_and_list() {
    let app = stub_app();
    let path = create(&app, "learner-1", "ownership").await;
    assert_eq!(path["version"], 1);
    assert_eq!(path["level"], "beginner");
    assert_eq!(path["steps"].as_array().unwrap().len(), 6);
    assert_eq!(path["checkpoints"][0]["after_step_order"], 2);
    assert!(path["checkpoints"][0]["questions"][0]["correct_answers"].is_array());

    let again = post_json(&app, "/api/v1/paths", json!({ "ownerId": "learner-1", "topic": "ownership", "level": "beginner" })).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(body_json(again).await["id"], path["id"]);

    let id = path["id"].as_str().unwrap();
    let (status, fetched) = call(&app, Method::GET, &format!("/api/v1/paths/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], path["id"]);

    let (status, list) = call(&app, Method::GET, "/api/v1/paths?ownerId=learner-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, empty) = call(&app, Method::GET, "/api/v1/paths?ownerId=nobody", None).await;
    assert!(empty.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn blank_topic_is_a_bad_request() {
    let app = stub_app();
    let (status, json) = call(
        &app,
        Method::POST,
        "/api/v1/paths",
        Some(json!({ "ownerId": "learner-1", "topic": "  ", "level": "beginner" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json.get("current").is_none());
}

#[tokio::test]
async fn generation_timeout_is_a_gateway_timeout() {
    let config = EngineConfig { generation_timeout_ms: 20, ..EngineConfig::default() };
    let app = build_test_app(Arc::new(SlowGenerator(Duration::from_millis(500))), config);
    let (status, json) = call(
        &app,
        Method::POST,
        "/api/v1/paths",
        Some(json!({ "ownerId": "learner-1", "topic": "ownership", "level": "beginner" })),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["code"], "GENERATION_TIMEOUT");

    let (_, list) = call(&app, Method::GET, "/api/v1/paths?ownerId=learner-1", None).await;
    assert!(list.as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: error mapping carries the current state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_path_is_not_found() {
    let app = stub_app();
    let (status, json) = call(&app, Method::GET, "/api/v1/paths/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "PATH_NOT_FOUND");
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict_with_current_state() {
    let app = stub_app();
    let path = create(&app, "learner-1", "ownership").await;
    let id = path["id"].as_str().unwrap();
    let first = step_id(&path, 0);

    let (status, _) = call(&app, Method::POST, &format!("/api/v1/paths/{id}/steps/{first}/complete?expectedVersion=1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let second = step_id(&path, 1);
    let (status, json) = call(&app, Method::POST, &format!("/api/v1/paths/{id}/steps/{second}/complete?expectedVersion=1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(json["current"]["version"], 2);
    assert_eq!(json["current"]["steps"][1]["completed"], false);
}

#[tokio::test]
async fn locked_step_is_unprocessable() {
    let app = stub_app();
    let path = create(&app, "learner-1", "ownership").await;
    let id = path["id"].as_str().unwrap();
    let third = step_id(&path, 2);

    let (status, json) = call(&app, Method::POST, &format!("/api/v1/paths/{id}/steps/{third}/complete"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "STEP_LOCKED");
    assert_eq!(json["current"]["version"], 1);
}

#[tokio::test]
async fn unknown_option_is_an_invalid_answer() {
    let app = stub_app();
    let mut path = create(&app, "learner-1", "ownership").await;
    let id = path["id"].as_str().unwrap().to_string();
    for order in 0..3 {
        let step = step_id(&path, order);
        let (status, next) = call(&app, Method::POST, &format!("/api/v1/paths/{id}/steps/{step}/complete"), None).await;
        assert_eq!(status, StatusCode::OK);
        path = next;
    }
    let checkpoint = &path["checkpoints"][0];
    let cp_id = checkpoint["id"].as_str().unwrap();
    let question = checkpoint["questions"][0]["id"].as_str().unwrap();

    let (status, json) = call(
        &app,
        Method::POST,
        &format!("/api/v1/paths/{id}/checkpoints/{cp_id}/attempts"),
        Some(json!({ "answers": { question: ["zzz"] } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_ANSWER");

    let answers: serde_json::Map<String, Value> = checkpoint["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| (q["id"].as_str().unwrap().to_string(), q["correct_answers"].clone()))
        .collect();
    let (status, json) = call(
        &app,
        Method::POST,
        &format!("/api/v1/paths/{id}/checkpoints/{cp_id}/attempts"),
        Some(json!({ "answers": answers, "expectedVersion": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["attempt"]["passed"], true);
    assert_eq!(json["path"]["version"], 5);
}

// ---------------------------------------------------------------------------
// Test: branches and adaptation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn branch_lifecycle() {
    let app = stub_app();
    let path = create(&app, "learner-1", "ownership").await;
    let id = path["id"].as_str().unwrap();

    let (status, json) = call(
        &app,
        Method::POST,
        &format!("/api/v1/paths/{id}/branches"),
        Some(json!({ "forkAtStepOrder": 0, "branchName": "alt" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_FORK_POINT");

    let first = step_id(&path, 0);
    call(&app, Method::POST, &format!("/api/v1/paths/{id}/steps/{first}/complete"), None).await;
    let (status, json) = call(
        &app,
        Method::POST,
        &format!("/api/v1/paths/{id}/branches"),
        Some(json!({
            "forkAtStepOrder": 0,
            "branchName": "alt",
            "initialSteps": [{ "label": "Another angle", "body": "..." }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let branch_id = json["branchId"].as_str().unwrap().to_string();
    assert_eq!(json["path"]["active_branch_id"], branch_id.as_str());
    assert_eq!(json["path"]["branches"][0]["fork_at_step_order"], 0);

    let (status, json) = call(&app, Method::PUT, &format!("/api/v1/paths/{id}/active-branch"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["active_branch_id"].is_null());

    let (status, json) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/paths/{id}/active-branch"),
        Some(json!({ "branchId": "ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "BRANCH_NOT_FOUND");
}

#[tokio::test]
async fn difficulty_feedback_inserts_remediation() {
    let app = stub_app();
    let path = create(&app, "learner-1", "ownership").await;
    let id = path["id"].as_str().unwrap();

    let (status, json) = call(
        &app,
        Method::POST,
        &format!("/api/v1/paths/{id}/adapt"),
        Some(json!({ "signal": { "kind": "difficulty", "feedback": "too_high" }, "expectedVersion": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["kind"], "remediation_inserted");
    assert_eq!(json["path"]["version"], 2);
    assert_eq!(json["path"]["steps"].as_array().unwrap().len(), 7);

    let (status, json) = call(
        &app,
        Method::POST,
        &format!("/api/v1/paths/{id}/adapt"),
        Some(json!({ "signal": { "kind": "checkpoint_scores", "scores": [101] } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_SIGNAL");
    assert_eq!(json["current"]["version"], 2);
}

#[tokio::test]
async fn delete_with_version_guard() {
    let app = stub_app();
    let path = create(&app, "learner-1", "ownership").await;
    let id = path["id"].as_str().unwrap();

    let (status, json) = call(&app, Method::DELETE, &format!("/api/v1/paths/{id}?expectedVersion=3"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["current"]["version"], 1);

    let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/paths/{id}?expectedVersion=1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, &format!("/api/v1/paths/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
