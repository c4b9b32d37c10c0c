//! /admin/users/{id}/upstreams and /admin/upstreams/{id} (spec.md §3/§6).

use crate::persist;
use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use yapi_core::credential::UpstreamCredential;

fn to_response(err: yapi_core::error::GatewayError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_json_body()))
}

/// GET /admin/users/{id}/upstreams
pub async fn list_upstreams_for_user(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.upstreams.list_for_user(&user_id).await {
        Ok(creds) => (StatusCode::OK, Json(json!({"list": creds, "total": creds.len()}))),
        Err(e) => to_response(e),
    }
}

/// POST /admin/users/{id}/upstreams
pub async fn create_upstream(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
    Json(mut cred): Json<UpstreamCredential>,
) -> (StatusCode, Json<Value>) {
    cred.user_id = user_id;
    if cred.id.is_empty() {
        cred.id = uuid::Uuid::new_v4().to_string();
    }
    match state.upstreams.save(cred.clone()).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"id": cred.id, "status": "created"})))
        }
        Err(e) => to_response(e),
    }
}

/// GET /admin/upstreams/{id}
pub async fn get_upstream(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.upstreams.get(&id).await {
        Ok(Some(cred)) => (StatusCode::OK, Json(json!(cred))),
        Ok(None) => to_response(yapi_core::error::GatewayError::NotFound(format!(
            "upstream credential {id:?} not found"
        ))),
        Err(e) => to_response(e),
    }
}

/// PUT /admin/upstreams/{id}
pub async fn update_upstream(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(mut cred): Json<UpstreamCredential>,
) -> (StatusCode, Json<Value>) {
    cred.id = id;
    match state.upstreams.save(cred.clone()).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"id": cred.id, "status": "updated"})))
        }
        Err(e) => to_response(e),
    }
}

/// DELETE /admin/upstreams/{id}
pub async fn delete_upstream(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.upstreams.delete(&id).await {
        Ok(()) => {
            let _ = state.bindings.delete_for_credential(&id).await;
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"deleted": true})))
        }
        Err(e) => to_response(e),
    }
}
