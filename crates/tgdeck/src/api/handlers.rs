//! REST handlers for the dashboard.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::CurrentUser;
use crate::chains::DialogueChain;
use crate::sessions::{BotSession, NewBotSession, SessionStatus};
use crate::tasks::Task;
use crate::user::User;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "worker": state.gateway.supervisor().state().to_string(),
        "connections": state.gateway.hub().connection_count(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<User>> {
    if req.username.trim().is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }
    let user = state.gateway.users().create(req.username.trim()).await?;
    Ok(Json(user))
}

/// GET /api/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<BotSession>>> {
    let sessions = state.gateway.sessions().list_by_owner(user.id()).await?;
    Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub name: String,
    pub api_id: i64,
    pub api_hash: String,
    pub session_string: String,
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<Json<BotSession>> {
    let session = state
        .gateway
        .sessions()
        .create(&NewBotSession {
            owner_id: user.id(),
            name: req.name,
            api_id: req.api_id,
            api_hash: req.api_hash,
            session_string: req.session_string,
        })
        .await?;
    Ok(Json(session))
}

/// DELETE /api/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let session = state
        .gateway
        .sessions()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("session"))?;
    if session.owner_id != user.id() {
        return Err(ApiError::Forbidden("not your session".to_string()));
    }
    if session.status == SessionStatus::Active {
        return Err(ApiError::bad_request(
            "session is connected, disconnect it first",
        ));
    }
    state.gateway.sessions().delete(id).await?;
    Ok(Json(json!({"deleted": id})))
}

/// GET /api/chains
pub async fn list_chains(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<DialogueChain>>> {
    let chains = state.gateway.chains().list_by_owner(user.id()).await?;
    Ok(Json(chains))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChainRequest {
    pub name: String,
    pub graph_json: String,
    #[serde(default)]
    pub session_id: Option<i64>,
}

/// POST /api/chains
pub async fn create_chain(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateChainRequest>,
) -> ApiResult<Json<DialogueChain>> {
    let chain = state
        .gateway
        .chains()
        .create(user.id(), &req.name, &req.graph_json, req.session_id)
        .await?;
    Ok(Json(chain))
}

/// POST /api/chains/{id}/start
pub async fn start_chain(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Task>> {
    let task = state.gateway.start_task(user.id(), id).await?;
    Ok(Json(task))
}

/// POST /api/chains/{id}/stop
pub async fn stop_chain(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Task>>> {
    let stopped = state.gateway.stop_chain(user.id(), id).await?;
    Ok(Json(stopped))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Task>> {
    let task = state
        .gateway
        .tasks()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("task"))?;
    let chain = state
        .gateway
        .chains()
        .get(task.chain_id)
        .await?
        .ok_or_else(|| ApiError::not_found("chain"))?;
    if chain.owner_id != user.id() {
        return Err(ApiError::Forbidden("not your task".to_string()));
    }
    Ok(Json(task))
}

/// POST /api/tasks/{id}/stop
pub async fn stop_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Task>> {
    let task = state.gateway.stop_task(user.id(), id).await?;
    Ok(Json(task))
}
