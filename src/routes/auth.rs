use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::{clear_session_cookie, session_cookie, session_id_from_headers, CurrentSession};
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::{Session, SessionError, User};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(current_session))
        .route("/renew", post(renew))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub siape: u32,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session: Session,
    pub user: User,
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Response, AppError> {
    let user = state.users().authenticate(req.siape, &req.password).await?;

    // Any session the user already had is invalidated by this one.
    let session = state
        .sessions()
        .create(user.id, state.config().session.default_ttl)
        .await?;
    tracing::info!(user_id = %user.id, siape = user.siape, "User logged in");

    let cookie = session_cookie(
        &session,
        state.sessions().now(),
        state.config().session.cookie_secure,
    )?;
    let mut response = ok(LoginResponse { session, user }).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

/// Always succeeds; a missing or already expired session just clears the cookie.
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = session_id_from_headers(&headers) {
        if state.sessions().delete(session_id).await {
            tracing::info!(%session_id, "User logged out");
        }
    }

    let mut response = ok(serde_json::json!({ "loggedOut": true })).into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, clear_session_cookie());
    response
}

async fn current_session(CurrentSession(session): CurrentSession) -> impl IntoResponse {
    ok(session)
}

async fn renew(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Response, AppError> {
    let renewed = state
        .sessions()
        .renew(session.id, state.config().session.default_ttl)
        .await
        .map_err(|e| match e {
            SessionError::NotFound => AppError::unauthorized("session not found or expired"),
            other => other.into(),
        })?;

    let cookie = session_cookie(
        &renewed,
        state.sessions().now(),
        state.config().session.cookie_secure,
    )?;
    let mut response = ok(renewed).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}
