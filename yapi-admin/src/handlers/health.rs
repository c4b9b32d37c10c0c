use crate::server::AdminState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// GET /admin/healthz
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /metrics — Prometheus text exposition, unauthenticated like the
/// rest of the scrape surface.
pub async fn metrics(State(state): State<Arc<AdminState>>) -> String {
    match &state.metrics {
        Some(m) => yapi_observability::prometheus_exporter::render_metrics(m),
        None => String::new(),
    }
}
