//! # Fault Isolation
//!
//! A panicking processor is contained at the dispatch boundary, and
//! read-only mode refuses writes before any processor runs.

use super::fixtures::*;
use api_gateway::{GatewayBuilder, ProcessorRegistry};
use axum::http::StatusCode;
use serde_json::json;
use shared_types::{Identity, Operation};
use std::sync::atomic::Ordering;
use std::sync::Arc;

// =============================================================================
// PANICS
// =============================================================================

#[tokio::test]
async fn test_panicking_processor_does_not_take_down_gateway() {
    let lists = Arc::new(MemoryStore::new(list()));
    let processors = ProcessorRegistry::new()
        .register(&list(), lists.clone())
        .register(&task(), Arc::new(Exploding));
    let service = GatewayBuilder::new(config(), relationships())
        .with_processors(Arc::new(processors))
        .build()
        .unwrap();
    let app = service.router();

    let response = send(&app, "GET", "/tasks/t1", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(response).await;
    assert_eq!(body[0]["title"], "Internal Server Error");
    assert_eq!(body[0]["description"], "storage corrupted");

    // The next, unrelated request is served normally.
    let response = send(&app, "POST", "/lists", Some(json!({"name": "after"}))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(lists.len(), 1);

    let metrics = service.metrics().to_json();
    assert_eq!(metrics["requests"]["panics"], 1);
}

#[tokio::test]
async fn test_panic_through_dispatcher_api() {
    let processors = ProcessorRegistry::new().register(&list(), Arc::new(Exploding));
    let service = GatewayBuilder::new(config(), relationships())
        .with_processors(Arc::new(processors))
        .build()
        .unwrap();

    let err = service
        .dispatcher()
        .dispatch(Operation::Retrieve, raw("lists", Some("l1")))
        .await
        .unwrap_err();
    assert_eq!(err.code, 500);
}

// =============================================================================
// READ-ONLY MODE
// =============================================================================

#[tokio::test]
async fn test_read_only_refuses_writes_but_serves_reads() {
    let lists = Arc::new(MemoryStore::new(list()));
    let tasks = Arc::new(MemoryStore::new(task()));

    let mut config = config();
    config.model.read_only = true;
    config.model.read_only_excluded_identities = vec![Identity::new("task", "tasks")];

    let app = GatewayBuilder::new(config, relationships())
        .with_processors(Arc::new(registry(Arc::clone(&lists), Arc::clone(&tasks))))
        .build()
        .unwrap()
        .router();

    let response = send(&app, "POST", "/lists", Some(json!({"name": "blocked"}))).await;
    assert_eq!(response.status(), StatusCode::LOCKED);
    assert_eq!(
        json(response).await[0]["description"],
        "This api is currently in read only mode"
    );
    assert_eq!(lists.calls.load(Ordering::SeqCst), 0);

    let response = send(&app, "GET", "/lists", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Excluded identities stay writable; the write fails on the missing id.
    let response = send(&app, "PUT", "/tasks/t1", Some(json!({"title": "x"}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(tasks.calls.load(Ordering::SeqCst), 1);
}
