use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{authorize, authorize_self_or, default_hierarchy, Actor, PERMIT_CHIEF};
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::extractors::{JsonBody, QueryParams};
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::{NewUser, UserPatch};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route(
            "/:id",
            get(get_user).patch(patch_user).delete(delete_user),
        )
        .route("/siape/:siape", get(get_user_by_siape))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn list_users(
    actor: Actor,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&PERMIT_CHIEF, &actor)?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = state.users().list(query.offset.unwrap_or(0), limit).await;
    Ok(ok(page))
}

async fn get_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    authorize_self_or(&PERMIT_CHIEF, &actor, id)?;
    Ok(ok(state.users().get(id).await?))
}

async fn get_user_by_siape(
    actor: Actor,
    State(state): State<AppState>,
    Path(siape): Path<u32>,
) -> Result<impl IntoResponse, AppError> {
    let target = state.users().get_by_siape(siape).await;
    // Non-chiefs learn nothing about SIAPE numbers other than their own.
    match &target {
        Ok(user) => authorize_self_or(&PERMIT_CHIEF, &actor, user.id)?,
        Err(_) => authorize(&PERMIT_CHIEF, &actor)?,
    }
    Ok(ok(target?))
}

async fn create_user(
    actor: Actor,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewUser>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&PERMIT_CHIEF, &actor)?;

    let user = state.users().create(req).await?;
    tracing::info!(user_id = %user.id, siape = user.siape, role = %user.role, "User created");
    Ok(created(user))
}

async fn patch_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(patch): JsonBody<UserPatch>,
) -> Result<impl IntoResponse, AppError> {
    authorize_self_or(&PERMIT_CHIEF, &actor, id)?;

    if let Some(role) = patch.role {
        if !default_hierarchy(role, actor.role()) {
            return Err(AppError::forbidden(&format!(
                "auth level {} cannot grant role {}",
                actor.role(),
                role
            )));
        }
    }

    let user = state.users().patch(id, patch).await?;
    Ok(ok(user))
}

async fn delete_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    authorize_self_or(&PERMIT_CHIEF, &actor, id)?;

    state.users().delete(id).await;
    let had_session = state.sessions().delete_for_owner(id).await;
    tracing::info!(user_id = %id, had_session, "User deleted");
    Ok(ok(serde_json::json!({ "deleted": true })))
}
