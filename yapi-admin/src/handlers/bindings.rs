//! /admin/api-keys/{id}/binding — the key↔upstream-credential link
//! (spec.md §3/§4.4/§6, §8 scenario 5's ownership-mismatch conflict).

use crate::persist;
use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use yapi_core::credential::Binding;

fn to_response(err: yapi_core::error::GatewayError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_json_body()))
}

/// GET /admin/api-keys/{id}/binding
pub async fn get_binding(
    State(state): State<Arc<AdminState>>,
    Path(api_key_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.bindings.get_by_api_key(&api_key_id).await {
        Ok(Some(binding)) => (StatusCode::OK, Json(json!(binding))),
        Ok(None) => to_response(yapi_core::error::GatewayError::NotFound(
            "no binding for this api key".into(),
        )),
        Err(e) => to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PutBindingRequest {
    pub upstream_credential_id: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// PUT /admin/api-keys/{id}/binding — create or replace the binding for
/// this key. Rejects with `conflict` (409) if the key's, credential's, and
/// binding's owners disagree (spec.md §4.4's ownership invariant).
pub async fn put_binding(
    State(state): State<Arc<AdminState>>,
    Path(api_key_id): Path<String>,
    Json(req): Json<PutBindingRequest>,
) -> (StatusCode, Json<Value>) {
    let key = match state.api_keys.get(&api_key_id).await {
        Ok(Some(k)) => k,
        Ok(None) => {
            return to_response(yapi_core::error::GatewayError::NotFound(format!(
                "api key {api_key_id:?} not found"
            )))
        }
        Err(e) => return to_response(e),
    };

    let binding = Binding {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: key.user_id.clone(),
        api_key_id: api_key_id.clone(),
        upstream_credential_id: req.upstream_credential_id,
        service: req.service,
        created_at: Some(chrono::Utc::now()),
    };

    match state.resolver.create_binding_checked(binding.clone()).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"id": binding.id, "status": "bound"})))
        }
        Err(e) => to_response(e),
    }
}

/// DELETE /admin/api-keys/{id}/binding
pub async fn delete_binding(
    State(state): State<Arc<AdminState>>,
    Path(api_key_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.bindings.delete_for_api_key(&api_key_id).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"deleted": true})))
        }
        Err(e) => to_response(e),
    }
}
