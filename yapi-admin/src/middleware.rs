//! Admin-surface authentication middleware: Bearer JWT or HTTP Basic
//! (spec.md §6), scoped via `route_layer` to every `/admin/*` route except
//! `/admin/login` and `/admin/healthz`.

use crate::server::AdminState;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use yapi_auth::admin_auth;

pub async fn require_admin_auth(
    State(state): State<Arc<AdminState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(header) = header else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if let Some(token) = header.strip_prefix("Bearer ") {
        let signing_key = state
            .config
            .jwt_signing_key
            .as_deref()
            .ok_or(StatusCode::UNAUTHORIZED)?;
        admin_auth::verify_token(signing_key, token).map_err(|_| StatusCode::UNAUTHORIZED)?;
        return Ok(next.run(request).await);
    }

    if header.starts_with("Basic ") {
        let username = state
            .config
            .basic_auth_username
            .as_deref()
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let password_hash = state
            .config
            .basic_auth_password_hash
            .as_deref()
            .ok_or(StatusCode::UNAUTHORIZED)?;
        admin_auth::verify_basic(username, password_hash, &header)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;
        return Ok(next.run(request).await);
    }

    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_detection() {
        assert_eq!("Bearer abc.def.ghi".strip_prefix("Bearer "), Some("abc.def.ghi"));
    }
}
