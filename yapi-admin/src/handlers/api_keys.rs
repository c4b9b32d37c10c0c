//! /admin/users/{id}/api-keys and /admin/api-keys/{id} (spec.md §3/§4.4/§6).

use crate::persist;
use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use yapi_core::credential::{generate_plaintext_key, ApiKey};

fn to_response(err: yapi_core::error::GatewayError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_json_body()))
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub label: String,
}

/// GET /admin/users/{id}/api-keys
pub async fn list_api_keys_for_user(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.api_keys.list_for_user(&user_id).await {
        Ok(keys) => (StatusCode::OK, Json(json!({"list": keys, "total": keys.len()}))),
        Err(e) => to_response(e),
    }
}

/// POST /admin/users/{id}/api-keys — generates a fresh `yapi_<prefix>_<secret>`
/// key, stores only the bcrypt hash, and returns the plaintext exactly once.
pub async fn create_api_key(
    State(state): State<Arc<AdminState>>,
    Path(user_id): Path<String>,
    Json(req): Json<CreateApiKeyRequest>,
) -> (StatusCode, Json<Value>) {
    let (plaintext, prefix, secret) = generate_plaintext_key();
    let secret_hash = match bcrypt::hash(&secret, bcrypt::DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        }
    };

    let key = ApiKey {
        id: uuid::Uuid::new_v4().to_string(),
        user_id,
        label: req.label,
        prefix,
        secret_hash,
        last_used_at: None,
        enabled: true,
        created_at: Some(chrono::Utc::now()),
        updated_at: None,
    };

    match state.api_keys.save(key.clone()).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (
                StatusCode::OK,
                Json(json!({"id": key.id, "api_key": plaintext})),
            )
        }
        Err(e) => to_response(e),
    }
}

/// DELETE /admin/api-keys/{id}
pub async fn delete_api_key(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.api_keys.delete(&id).await {
        Ok(()) => {
            let _ = state.bindings.delete_for_api_key(&id).await;
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"deleted": true})))
        }
        Err(e) => to_response(e),
    }
}
