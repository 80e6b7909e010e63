use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tempfile::tempdir;
use tower::ServiceExt;
use wayfarer_core::{Hub, InboundRequest, Session};
use wayfarer_server::{
    build_router,
    infra::{app_state::AppState, config::Config},
    worker,
};

#[tokio::test]
async fn health_reports_registry_counts() {
    let config = Config::default();
    let (hub, _task) = Hub::spawn(config.hub_config().unwrap(), Arc::new(worker::catalogue()));

    let tmp = tempdir().unwrap();
    let (session, mut rx) = Session::channel();
    hub.dispatch(
        &session,
        InboundRequest::new(
            "watch",
            "w",
            json!({ "directoryPath": tmp.path().to_string_lossy() }),
        ),
    )
    .unwrap();
    rx.recv().await.expect("watch reply");

    let app = build_router(AppState::new(hub, config));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["checks"]["hub"]["subscriptions"], 1);
    assert_eq!(health["checks"]["hub"]["subscribers"], 1);
    assert_eq!(health["checks"]["hub"]["activeRuns"], 0);
}

#[tokio::test]
async fn health_fails_when_hub_is_gone() {
    let config = Config::default();
    let (hub, task) = Hub::spawn(config.hub_config().unwrap(), Arc::new(worker::catalogue()));
    task.abort();
    let _ = task.await;

    let app = build_router(AppState::new(hub, config));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
