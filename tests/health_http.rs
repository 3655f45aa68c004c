mod common;

use axum::http::{Method, StatusCode};

use common::app::{spawn_test_app, CHIEF_SIAPE, TEST_PASSWORD};
use common::auth::login;
use common::http::{assert_json_error, request, response_json};

#[tokio::test]
async fn it_health_live() {
    let app = spawn_test_app().await;

    let live = request(&app.app, Method::GET, "/health/live", None, &[]).await;
    assert_eq!(live.status(), StatusCode::OK);
}

#[tokio::test]
async fn it_health_reports_session_counts() {
    let app = spawn_test_app().await;
    login(&app.app, CHIEF_SIAPE, TEST_PASSWORD).await;

    let mut stats = app.reaper.subscribe();
    stats
        .wait_for(|s| s.queue_len == 1)
        .await
        .expect("reaper running");

    let response = request(&app.app, Method::GET, "/health", None, &[]).await;
    let (status, _, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"]["live"], 1);
    assert_eq!(body["sessions"]["queueLen"], 1);
    assert_eq!(body["sessions"]["garbage"], 0);
    assert!(body["uptimeSecs"].is_u64());
}

#[tokio::test]
async fn it_unknown_route_is_json_404() {
    let app = spawn_test_app().await;

    let response = request(&app.app, Method::GET, "/api/v1/nope", None, &[]).await;
    let (status, headers, body) = response_json(response).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_error(&body, "NOT_FOUND");
    assert_eq!(
        headers["x-request-id"].to_str().unwrap(),
        body["traceId"].as_str().unwrap()
    );
}
