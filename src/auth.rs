use std::fmt;
use std::str::FromStr;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{request::Parts, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::SESSION_COOKIE_NAME;
use crate::response::AppError;
use crate::state::AppState;
use crate::store::Session;

/// Roles in declaration order, most privileged first after `Unlogged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "unlogged")]
    Unlogged,
    /// Department head.
    #[serde(rename = "chief")]
    Chief,
    /// Promoted administrative technician.
    #[serde(rename = "promoted-admin")]
    Promoted,
    /// Administrative technician.
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "user")]
    User,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Unlogged,
        Role::Chief,
        Role::Promoted,
        Role::Admin,
        Role::User,
    ];

    /// Whether this is an actual account role, i.e. not `Unlogged`.
    pub fn is_valid(self) -> bool {
        self != Role::Unlogged
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Unlogged => "unlogged",
            Role::Chief => "chief",
            Role::Promoted => "promoted-admin",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Partial order over roles. `h(x, y)` reads "the permissions of `x` are inherited by
/// `y`".
pub type Hierarchy = fn(Role, Role) -> bool;

/// Everyone inherits `Unlogged`; only `Unlogged` inherits nothing else. Among account
/// roles the more privileged one inherits the less privileged one's permissions.
pub fn default_hierarchy(r0: Role, r1: Role) -> bool {
    match (r0, r1) {
        (Role::Unlogged, _) => true,
        (_, Role::Unlogged) => false,
        _ => r0 >= r1,
    }
}

/// Authorizes any role that inherits one of `roles`.
#[derive(Clone, Copy)]
pub struct Permission {
    roles: &'static [Role],
    hierarchy: Hierarchy,
}

impl Permission {
    pub const fn permit(roles: &'static [Role]) -> Self {
        Self {
            roles,
            hierarchy: default_hierarchy,
        }
    }

    pub const fn permit_with(hierarchy: Hierarchy, roles: &'static [Role]) -> Self {
        Self { roles, hierarchy }
    }

    pub fn authorizes(&self, role: Role) -> bool {
        self.roles.iter().any(|&class| (self.hierarchy)(class, role))
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permission")
            .field("roles", &self.roles)
            .finish()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.roles.iter().map(|r| r.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

pub const PERMIT_CHIEF: Permission = Permission::permit(&[Role::Chief]);
pub const PERMIT_PROMOTED: Permission = Permission::permit(&[Role::Promoted]);
pub const PERMIT_ADMIN: Permission = Permission::permit(&[Role::Admin]);
pub const PERMIT_LOGGED: Permission = Permission::permit(&[Role::User]);
pub const PERMIT_ANYONE: Permission = Permission::permit(&[Role::Unlogged]);

/// Whoever is making the request, resolved from the session cookie. Requests without a
/// live session resolve to [`Actor::unlogged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    user: Option<Uuid>,
    role: Role,
}

impl Actor {
    pub fn logged(user: Uuid, role: Role) -> Self {
        Self {
            user: Some(user),
            role,
        }
    }

    pub fn unlogged() -> Self {
        Self {
            user: None,
            role: Role::Unlogged,
        }
    }

    pub fn user(&self) -> Option<Uuid> {
        self.user
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is(&self, user: Uuid) -> bool {
        self.user == Some(user)
    }
}

pub fn authorize(permission: &Permission, actor: &Actor) -> Result<(), AppError> {
    if permission.authorizes(actor.role()) {
        return Ok(());
    }
    if actor.role() == Role::Unlogged {
        return Err(AppError::unauthorized("user is not logged in"));
    }
    Err(AppError::forbidden(&format!(
        "auth level {} does not match any criteria in {}",
        actor.role(),
        permission
    )))
}

/// Like [`authorize`], but an actor acting on its own account always passes.
pub fn authorize_self_or(
    permission: &Permission,
    actor: &Actor,
    target: Uuid,
) -> Result<(), AppError> {
    if actor.is(target) {
        return Ok(());
    }
    authorize(permission, actor)
}

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordHashError(String);

pub fn hash_password(password: &str) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|v| v.to_string())
        .map_err(|e| PasswordHashError(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordHashError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordHashError(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Pre-computed argon2 hash verified against when the account does not exist, so the
/// response time does not reveal which SIAPE numbers are registered.
pub fn dummy_password_hash() -> &'static str {
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0ZHVtbXk$YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY"
}

fn extract_cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            cookie.split(';').find_map(|part| {
                let p = part.trim();
                p.strip_prefix(&format!("{cookie_name}="))
                    .map(str::to_string)
            })
        })
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    extract_cookie_token(headers, SESSION_COOKIE_NAME).and_then(|raw| Uuid::parse_str(&raw).ok())
}

/// `now` must be read from the session store's clock (`SessionStore::now`).
pub fn session_cookie(
    session: &Session,
    now: DateTime<Utc>,
    secure: bool,
) -> Result<HeaderValue, AppError> {
    let max_age = (session.expires_at - now).num_seconds().max(0);
    let secure = if secure { "; Secure" } else { "" };
    let cookie = format!(
        "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}",
        session.id
    );
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::internal(&format!("invalid session cookie: {e}")))
}

pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let Some(session_id) = session_id_from_headers(&parts.headers) else {
            return Ok(Actor::unlogged());
        };
        let Ok(session) = app_state.sessions().lookup(session_id).await else {
            return Ok(Actor::unlogged());
        };

        match app_state.users().get(session.owner).await {
            Ok(user) => Ok(Actor::logged(user.id, user.role)),
            Err(e) => {
                tracing::warn!(owner = %session.owner, error = %e, "Session owner not resolvable");
                Ok(Actor::unlogged())
            }
        }
    }
}

/// The caller's live session. Rejects with 401 when there is none.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let session_id = session_id_from_headers(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("user is not logged in"))?;
        let session = app_state
            .sessions()
            .lookup(session_id)
            .await
            .map_err(|_| AppError::unauthorized("session not found or expired"))?;
        Ok(CurrentSession(session))
    }
}
