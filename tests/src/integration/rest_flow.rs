//! # REST Flow
//!
//! A full CRUD round over HTTP: the request passes tracing, CORS and the
//! per-IP rate limiter, is authenticated, checked against the relationship
//! registry and handed to the in-memory processors.

use super::fixtures::*;
use api_gateway::{GatewayBuilder, RequestAuthenticator};
use axum::http::StatusCode;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Harness {
    app: axum::Router,
    lists: Arc<MemoryStore>,
    tasks: Arc<MemoryStore>,
    auth: Arc<BearerAuth>,
}

fn harness(burst: u32) -> Harness {
    let lists = Arc::new(MemoryStore::new(list()));
    let tasks = Arc::new(MemoryStore::new(task()));
    let auth = Arc::new(BearerAuth::default());

    let mut config = config();
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = burst;

    let app = GatewayBuilder::new(config, relationships())
        .with_processors(Arc::new(registry(Arc::clone(&lists), Arc::clone(&tasks))))
        .with_authenticators(vec![Arc::clone(&auth) as Arc<dyn RequestAuthenticator>])
        .build()
        .unwrap()
        .router();

    Harness {
        app,
        lists,
        tasks,
        auth,
    }
}

// =============================================================================
// CRUD
// =============================================================================

#[tokio::test]
async fn test_crud_round() {
    let h = harness(100);

    // Create
    let response = send(&h.app, "POST", "/lists", Some(json!({"name": "groceries"}))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));
    let created = json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "groceries");

    // Retrieve
    let response = send(&h.app, "GET", &format!("/lists/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["name"], "groceries");

    // Update
    let response = send(
        &h.app,
        "PUT",
        &format!("/lists/{id}"),
        Some(json!({"name": "hardware"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["id"], id.as_str());

    // Retrieve many
    let response = send(&h.app, "GET", "/lists", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-count-total"], "1");
    let listed = json(response).await;
    assert_eq!(listed[0]["name"], "hardware");

    // Delete
    let response = send(&h.app, "DELETE", &format!("/lists/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.lists.len(), 0);

    let response = send(&h.app, "GET", &format!("/lists/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_nested_collection_pagination() {
    let h = harness(100);

    let parent = json(send(&h.app, "POST", "/lists", Some(json!({"name": "chores"}))).await).await;
    let parent_id = parent["id"].as_str().unwrap().to_string();

    for n in 0..5 {
        let response = send(
            &h.app,
            "POST",
            &format!("/lists/{parent_id}/tasks"),
            Some(json!({"title": format!("task {n}")})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    assert_eq!(h.tasks.len(), 5);

    let response = send(
        &h.app,
        "GET",
        &format!("/lists/{parent_id}/tasks?page=2&per_page=2"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers["x-count-total"], "5");
    assert_eq!(headers["x-count-local"], "2");
    assert_eq!(headers["x-page-current"], "2");
    assert_eq!(
        headers["x-page-next"],
        format!("http://todo.test/lists/{parent_id}/tasks?page=3&per_page=2").as_str()
    );
    assert_eq!(
        headers["x-page-last"],
        format!("http://todo.test/lists/{parent_id}/tasks?page=3&per_page=2").as_str()
    );

    let page = json(response).await;
    assert_eq!(page.as_array().unwrap().len(), 2);
    assert_eq!(page[0]["title"], "task 2");
}

// =============================================================================
// REJECTIONS
// =============================================================================

#[tokio::test]
async fn test_relationship_violation_never_reaches_processor() {
    let h = harness(100);

    // Tasks can only be created under a list.
    let response = send(&h.app, "POST", "/tasks", Some(json!({"title": "orphan"}))).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        json(response).await[0]["description"],
        "Create operation not allowed on task"
    );
    assert_eq!(h.tasks.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.auth.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unauthenticated_request_is_denied() {
    let h = harness(100);

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/lists")
        .header("x-forwarded-for", "203.0.113.8")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(h.app.clone(), request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.lists.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rate_limit_applies_before_dispatch() {
    let h = harness(2);

    for _ in 0..2 {
        let response = send(&h.app, "GET", "/lists", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&h.app, "GET", "/lists", None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(json(response).await[0]["title"], "Rate Limit");
    assert_eq!(h.auth.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_write_is_audited() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = GatewayBuilder::new(config(), relationships())
        .with_processors(Arc::new(registry(
            Arc::new(MemoryStore::new(list())),
            Arc::new(MemoryStore::new(task())),
        )))
        .with_auditer(Arc::new(ChannelAuditer(tx)))
        .build()
        .unwrap()
        .router();

    let response = send(&app, "DELETE", "/lists/missing", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let record = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, 404);
    assert_eq!(record.object_id.as_deref(), Some("missing"));
    assert_eq!(record.client_ip.map(|ip| ip.to_string()).as_deref(), Some("203.0.113.7"));
}
