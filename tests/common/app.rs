use std::sync::Arc;

use axum::Router;
use chrono::Duration;

use almodon_backend::auth::Role;
use almodon_backend::clock::SystemClock;
use almodon_backend::config::{Config, SessionConfig};
use almodon_backend::routes::build_router;
use almodon_backend::state::AppState;
use almodon_backend::store::{NewUser, SessionStore, User, UserRepository};
use almodon_backend::workers::ReaperHandle;

pub const CHIEF_SIAPE: u32 = 1_000_001;
pub const TEST_PASSWORD: &str = "12345678";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub chief: User,
    pub reaper: ReaperHandle,
}

fn test_config(session: SessionConfig) -> Config {
    // Built directly so parallel tests never race on process environment.
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        seed_demo_users: false,
        seed_demo_password: String::new(),
        session,
    }
}

pub async fn spawn_with_session_config(session: SessionConfig) -> TestApp {
    let config = test_config(session);

    let users = Arc::new(UserRepository::new());
    let chief = users
        .create(NewUser {
            siape: CHIEF_SIAPE,
            name: "Chefe de Teste".to_string(),
            email: "chefe@test.edu.br".to_string(),
            password: TEST_PASSWORD.to_string(),
            role: Role::Chief,
        })
        .await
        .expect("seed chief");

    let (sessions, reaper) = SessionStore::start(&config.session, Arc::new(SystemClock));
    let state = AppState::new(sessions, users, reaper.subscribe(), &config);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        chief,
        reaper,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with_session_config(SessionConfig::default()).await
}

/// Sessions live for `ttl` instead of the default ten minutes.
pub async fn spawn_test_app_with_ttl(ttl: Duration) -> TestApp {
    spawn_with_session_config(SessionConfig {
        default_ttl: ttl,
        ..SessionConfig::default()
    })
    .await
}
