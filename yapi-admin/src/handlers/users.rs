//! /admin/users CRUD (spec.md §3/§6).

use crate::persist;
use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use yapi_core::user::User;
use yapi_store::UserStore;

fn to_response(err: yapi_core::error::GatewayError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_json_body()))
}

/// GET /admin/users
pub async fn list_users(State(state): State<Arc<AdminState>>) -> (StatusCode, Json<Value>) {
    match state.users.list().await {
        Ok(users) => (StatusCode::OK, Json(json!({"list": users, "total": users.len()}))),
        Err(e) => to_response(e),
    }
}

/// GET /admin/users/{id}
pub async fn get_user(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.users.get(&id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(json!(user))),
        Ok(None) => to_response(yapi_core::error::GatewayError::NotFound(format!(
            "user {id:?} not found"
        ))),
        Err(e) => to_response(e),
    }
}

/// POST /admin/users
pub async fn create_user(
    State(state): State<Arc<AdminState>>,
    Json(user): Json<User>,
) -> (StatusCode, Json<Value>) {
    match state.users.save(user.clone()).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"id": user.id, "status": "created"})))
        }
        Err(e) => to_response(e),
    }
}

/// DELETE /admin/users/{id} — soft delete (spec.md §3: users are never
/// hard-deleted, only marked inactive, since keys/credentials reference
/// them by id).
pub async fn delete_user(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.users.soft_delete(&id).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"deleted": true})))
        }
        Err(e) => to_response(e),
    }
}
