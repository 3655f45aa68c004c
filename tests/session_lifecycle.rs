mod common;

use std::time::Duration as StdDuration;

use axum::http::{Method, StatusCode};
use chrono::Duration;

use common::app::{spawn_test_app_with_ttl, CHIEF_SIAPE, TEST_PASSWORD};
use common::auth::{login, session_header};
use common::http::{request, response_json};

#[tokio::test]
async fn it_idle_session_is_reaped_in_background() {
    let app = spawn_test_app_with_ttl(Duration::milliseconds(100)).await;
    login(&app.app, CHIEF_SIAPE, TEST_PASSWORD).await;

    let mut stats = app.reaper.subscribe();
    tokio::time::timeout(StdDuration::from_secs(5), stats.wait_for(|s| s.evicted == 1))
        .await
        .expect("reaped in time")
        .expect("reaper running");

    // Nobody looked the session up; the reaper removed it on its own.
    assert_eq!(app.state.sessions().len().await, 0);
}

#[tokio::test]
async fn it_renewed_session_survives_its_original_deadline() {
    let app = spawn_test_app_with_ttl(Duration::milliseconds(300)).await;
    let (session, _) = login(&app.app, CHIEF_SIAPE, TEST_PASSWORD).await;

    for _ in 0..4 {
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        let response = request(
            &app.app,
            Method::POST,
            "/api/v1/auth/renew",
            None,
            &[session_header(&session)],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = request(
        &app.app,
        Method::GET,
        "/api/v1/auth/session",
        None,
        &[session_header(&session)],
    )
    .await;
    let (status, _, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK, "session alive after 400ms: {body}");
}

#[tokio::test]
async fn it_expired_session_is_rejected_and_new_login_gets_fresh_id() {
    let app = spawn_test_app_with_ttl(Duration::milliseconds(50)).await;
    let (first, _) = login(&app.app, CHIEF_SIAPE, TEST_PASSWORD).await;

    tokio::time::sleep(StdDuration::from_millis(120)).await;

    let response = request(
        &app.app,
        Method::GET,
        "/api/v1/auth/session",
        None,
        &[session_header(&first)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (second, _) = login(&app.app, CHIEF_SIAPE, TEST_PASSWORD).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn it_shutdown_leaves_lazy_expiry_in_place() {
    let app = spawn_test_app_with_ttl(Duration::milliseconds(50)).await;
    let sessions = app.state.clone();
    app.reaper.shutdown().await;

    let (session, _) = login(&app.app, CHIEF_SIAPE, TEST_PASSWORD).await;
    tokio::time::sleep(StdDuration::from_millis(120)).await;

    assert_eq!(sessions.sessions().len().await, 1, "nothing reaps in the background");
    let id = session.parse().expect("uuid cookie");
    assert!(sessions.sessions().lookup(id).await.is_err());
    assert_eq!(sessions.sessions().len().await, 0);
}
