//! POST /admin/login — exchange Basic-auth-shaped credentials for a
//! short-lived admin session JWT (spec.md §6).

use crate::server::AdminState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use yapi_auth::admin_auth;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

const SESSION_TTL_SECS: i64 = 3600;

/// POST /admin/login
pub async fn login(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(expected_username) = state.config.basic_auth_username.as_deref() else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "admin login is not configured"})),
        );
    };
    let Some(expected_hash) = state.config.basic_auth_password_hash.as_deref() else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "admin login is not configured"})),
        );
    };
    let Some(signing_key) = state.config.jwt_signing_key.as_deref() else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "admin login is not configured"})),
        );
    };

    if req.username != expected_username {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid admin credentials"})),
        );
    }
    match bcrypt::verify(&req.password, expected_hash) {
        Ok(true) => {}
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid admin credentials"})),
            )
        }
    }

    match admin_auth::issue_token(signing_key, &req.username, SESSION_TTL_SECS) {
        Ok(token) => (StatusCode::OK, Json(json!({"token": token}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        ),
    }
}
