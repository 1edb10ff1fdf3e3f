use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use velo_core::Run;
use velo_dispatch::{Dispatcher, MemoryTaskStore, ResultSink, RunnerLink, TaskQueue};
use velo_wire::{CloseCode, ReportedDimension, RunnerBound};

use crate::router::build_router;
use crate::state::AppState;

struct NullSink;

impl ResultSink for NullSink {
    fn submit(&self, _run: Run, _dimensions: Vec<ReportedDimension>) {}
}

#[derive(Default)]
struct InboxLink(Mutex<Vec<RunnerBound>>);

impl RunnerLink for InboxLink {
    fn send_ping(&self) -> bool {
        true
    }

    fn send_text(&self, text: String) -> bool {
        self.0.lock().unwrap().push(RunnerBound::from_wire(&text).unwrap());
        true
    }

    fn close(&self, _code: CloseCode, _reason: &str) {}
}

fn app() -> (Router, Arc<Dispatcher>) {
    let queue = TaskQueue::new(Arc::new(MemoryTaskStore::new())).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(queue, Arc::new(NullSink)));
    let state = Arc::new(AppState {
        dispatcher: dispatcher.clone(),
        runner_token: None,
    });
    (build_router(state), dispatcher)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn commit_body(repo: Uuid, hash: &str) -> Value {
    json!({ "repo_id": repo, "commit_hash": hash, "author": "alice" })
}

#[tokio::test]
async fn enqueue_commit_and_list() {
    let (app, _) = app();
    let repo = Uuid::new_v4();

    let (status, body) = call(&app, "POST", "/api/queue/commit", Some(commit_body(repo, "abcdef1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "inserted");
    assert_eq!(body["task"]["priority"], "manual");

    let (status, body) = call(&app, "POST", "/api/queue/commit", Some(commit_body(repo, "abcdef1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_queued");

    let (status, body) = call(&app, "GET", "/api/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending"].as_array().unwrap().len(), 1);
    assert_eq!(body["pending"][0]["source"]["commit_hash"], "abcdef1");
    assert!(body["in_process"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_commit_hash_is_a_client_error() {
    let (app, _) = app();
    let (status, body) = call(&app, "POST", "/api/queue/commit", Some(commit_body(Uuid::new_v4(), "not-a-hash"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid task"));
}

#[tokio::test]
async fn tar_uploads_are_user_created() {
    let (app, _) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/queue/tar",
        Some(json!({ "description": "nightly build", "author": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["task"]["priority"], "user_created");
    assert_eq!(body["task"]["source"]["kind"], "tar");

    let (status, _) = call(
        &app,
        "POST",
        "/api/queue/tar",
        Some(json!({ "description": "  ", "author": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_pending_task() {
    let (app, _) = app();
    let (_, body) = call(&app, "POST", "/api/queue/commit", Some(commit_body(Uuid::new_v4(), "1234567"))).await;
    let id = body["task"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "DELETE", &format!("/api/queue/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["was_in_process"], false);

    let (status, _) = call(&app, "DELETE", &format!("/api/queue/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn running_commit_conflicts_and_cancel_resets_runner() {
    let (app, dispatcher) = app();
    let link = Arc::new(InboxLink::default());
    dispatcher.register("r1", link.clone()).unwrap();

    let repo = Uuid::new_v4();
    let (_, body) = call(&app, "POST", "/api/queue/commit", Some(commit_body(repo, "fedcba9"))).await;
    let id = body["task"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "POST", "/api/queue/commit", Some(commit_body(repo, "fedcba9"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already in progress"));

    let (_, runners) = call(&app, "GET", "/api/runners", None).await;
    assert_eq!(runners[0]["name"], "r1");
    assert_eq!(runners[0]["status"], "preparing_work");
    assert_eq!(runners[0]["current_task"], id.as_str());

    let (status, body) = call(&app, "DELETE", &format!("/api/queue/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["was_in_process"], true);
    assert_eq!(body["runner"], "r1");
    assert!(matches!(
        link.0.lock().unwrap().last(),
        Some(RunnerBound::ResetOrder(_))
    ));
}

#[tokio::test]
async fn health_reports_counts() {
    let (app, dispatcher) = app();
    dispatcher.register("r1", Arc::new(InboxLink::default())).unwrap();

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["runners"], 1);
    assert_eq!(body["pending_tasks"], 0);
}
