use axum::http::{HeaderMap, Method, StatusCode};
use axum::Router;
use serde_json::Value;

use super::app::TEST_PASSWORD;
use super::http::{request, response_json};

/// Value of `name` from the response's Set-Cookie headers, if set to something.
pub fn extract_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|s| s.strip_prefix(&format!("{name}=")))
        .map(|rest| rest.split(';').next().unwrap_or("").to_string())
        .find(|val| !val.is_empty())
}

/// `("cookie", "session=<id>")`, ready for [`super::http::request`].
pub fn session_header(session_id: &str) -> (&'static str, String) {
    ("cookie", format!("session={session_id}"))
}

/// Logs in and returns the session id plus the response body.
pub async fn login(app: &Router, siape: u32, password: &str) -> (String, Value) {
    let response = request(
        app,
        Method::POST,
        "/api/v1/auth/login",
        Some(serde_json::json!({ "siape": siape, "password": password })),
        &[],
    )
    .await;

    let (status, headers, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    let session_id = extract_cookie_value(&headers, "session").expect("session cookie on login");
    (session_id, body)
}

/// Creates a user through the API as the given (chief) session and returns its JSON.
pub async fn create_user(app: &Router, chief_session: &str, siape: u32, role: &str) -> Value {
    let response = request(
        app,
        Method::POST,
        "/api/v1/users",
        Some(serde_json::json!({
            "siape": siape,
            "name": "Servidor de Teste",
            "email": format!("servidor{siape}@test.edu.br"),
            "password": TEST_PASSWORD,
            "role": role,
        })),
        &[session_header(chief_session)],
    )
    .await;

    let (status, _, body) = response_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "create user failed: {body}");
    body["data"].clone()
}
