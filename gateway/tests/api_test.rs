//! End-to-end tests for the HTTP API with an in-process worker pool.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::Router;
use bytes::Bytes;
use embed_dispatch_common::{
    MemoryBroker, MemoryResultStore, ModelRegistry, ResultStore, TaskStatus,
};
use embed_dispatch_gateway::{app, AppState, Config};
use embed_worker::{EngineRegistry, WorkerPool};
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    broker: MemoryBroker,
    pool: Option<WorkerPool>,
}

fn test_config() -> Config {
    serde_json::from_value(json!({
        "service_name": "embed-dispatch-test",
        "api": { "max_batch_size": 3 },
        "worker": { "retry_backoff_ms": 0, "retry_backoff_max_ms": 0 },
        "models": {
            "small": {
                "display_name": "MiniLM L6",
                "description": "fast general-purpose embeddings",
                "version": "1.0",
                "params": { "embedding_dim": 32, "max_seq_length": 128 }
            },
            "large": {
                "queue_name": "large_model_queue",
                "params": { "embedding_dim": 64 }
            }
        }
    }))
    .unwrap()
}

async fn spawn_app(with_workers: bool) -> TestApp {
    let config = test_config();
    let registry = Arc::new(ModelRegistry::from_configs(config.models.clone()).unwrap());
    let broker = MemoryBroker::new();
    let store: Arc<dyn ResultStore> =
        Arc::new(MemoryResultStore::new(Duration::from_secs(3600)));

    let pool = if with_workers {
        let engines = EngineRegistry::from_models(&registry, &config.engines)
            .await
            .unwrap();
        Some(
            WorkerPool::start(
                &registry,
                &engines,
                Arc::new(broker.clone()),
                store.clone(),
                &config.worker,
            )
            .await
            .unwrap(),
        )
    } else {
        None
    };

    let state = Arc::new(AppState::new(
        &config,
        registry,
        Arc::new(broker.clone()),
        store,
    ));

    TestApp {
        router: app(state),
        broker,
        pool,
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(Bytes::from(serde_json::to_vec(&value).unwrap()))
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn poll_until_terminal(app: &Router, task_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, Method::GET, &format!("/tasks/{}", task_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "SUCCESS" || body["status"] == "FAILURE" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never reached a terminal status", task_id);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = spawn_app(false).await;

    let (status, body) = send(&app.router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "embed-dispatch-test");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_models_endpoint_lists_registry() {
    let app = spawn_app(false).await;

    let (status, body) = send(&app.router, Method::GET, "/text_embedding/models", None).await;

    assert_eq!(status, StatusCode::OK);
    let models = body.as_array().unwrap();
    assert_eq!(models.len(), 2);

    assert_eq!(models[0]["model_key"], "large");
    assert_eq!(models[0]["queue"], "large_model_queue");
    assert_eq!(models[0]["name"], "large");
    assert_eq!(models[0]["dimension"], 64);

    assert_eq!(models[1]["model_key"], "small");
    assert_eq!(models[1]["name"], "MiniLM L6");
    assert_eq!(models[1]["queue"], "text_embedding_small_queue");
    assert_eq!(models[1]["max_sequence_length"], 128);
}

#[tokio::test]
async fn test_submit_then_poll_until_success() {
    let app = spawn_app(true).await;

    let (status, accepted) = send(
        &app.router,
        Method::POST,
        "/text_embedding",
        Some(json!({ "model_key": "small", "text": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], "PENDING");
    assert_eq!(accepted["model_key"], "small");
    assert_eq!(accepted["model_name"], "MiniLM L6");
    let task_id = accepted["task_id"].as_str().unwrap().to_string();

    let done = poll_until_terminal(&app.router, &task_id).await;
    assert_eq!(done["status"], "SUCCESS");
    let vectors = done["result"].as_array().unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].as_array().unwrap().len(), 32);
    assert!(done.get("error").is_none());

    // Stored output is returned unchanged on later polls.
    let (_, again) = send(&app.router, Method::GET, &format!("/tasks/{}", task_id), None).await;
    assert_eq!(again, done);

    if let Some(pool) = app.pool {
        pool.shutdown().await;
    }
}

#[tokio::test]
async fn test_batch_submission() {
    let app = spawn_app(true).await;

    let (status, accepted) = send(
        &app.router,
        Method::POST,
        "/text_embedding/batch",
        Some(json!({
            "model_key": "large",
            "texts": ["first text", "second text"],
            "params": { "normalize": false }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let done = poll_until_terminal(&app.router, accepted["task_id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "SUCCESS");
    let vectors = done["result"].as_array().unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[1].as_array().unwrap().len(), 64);

    if let Some(pool) = app.pool {
        pool.shutdown().await;
    }
}

#[tokio::test]
async fn test_task_is_pending_without_workers() {
    let app = spawn_app(false).await;

    let (_, accepted) = send(
        &app.router,
        Method::POST,
        "/text_embedding",
        Some(json!({ "model_key": "small", "text": "hello" })),
    )
    .await;
    let task_id = accepted["task_id"].as_str().unwrap();

    let (status, body) = send(&app.router, Method::GET, &format!("/tasks/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], TaskStatus::Pending.as_str());
    assert!(body.get("result").is_none());
    assert_eq!(app.broker.depth("text_embedding_small_queue"), 1);
}

#[tokio::test]
async fn test_unknown_model_is_rejected() {
    let app = spawn_app(false).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/text_embedding",
        Some(json!({ "model_key": "nonexistent", "text": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "unknown_model");
    assert!(body["error"]["message"].as_str().unwrap().contains("nonexistent"));
    assert_eq!(app.broker.total_published(), 0);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected() {
    let app = spawn_app(false).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/text_embedding/batch",
        Some(json!({ "model_key": "small", "texts": ["a", "b", "c", "d"] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
    assert_eq!(app.broker.total_published(), 0);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let app = spawn_app(false).await;

    let fabricated = uuid::Uuid::new_v4().to_string();
    let (status, body) = send(&app.router, Method::GET, &format!("/tasks/{}", fabricated), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (status, _) = send(&app.router, Method::GET, "/tasks/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let app = spawn_app(false).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/text_embedding",
        Some(json!({ "text": "missing model key" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("model_key"));

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/text_embedding/batch",
        Some(json!({ "model_key": "small", "texts": "not a list" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
    assert_eq!(app.broker.total_published(), 0);
}
