//! /admin/rules CRUD + paginated, filtered listing (spec.md §6).
//!
//! Grounded on `ando-admin/src/handlers/routes.rs`'s CRUD handler idiom
//! (cache mutate → rebuild → persist), adapted to route mutations through
//! `RuleCacheService` instead of a raw `DashMap` + router swap, since the
//! cache service already owns that recompute-and-publish step.

use crate::persist;
use crate::server::AdminState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use yapi_core::rule::Rule;

#[derive(Debug, Deserialize, Default)]
pub struct ListRulesQuery {
    pub q: Option<String>,
    pub enabled: Option<bool>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

fn to_response(err: yapi_core::error::GatewayError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_json_body()))
}

/// GET /admin/rules?q=&enabled=&page=&page_size=
pub async fn list_rules(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<ListRulesQuery>,
) -> Json<Value> {
    let snapshot = state.rule_cache.current();
    let mut rules: Vec<Rule> = snapshot.rules().iter().map(|c| c.rule.clone()).collect();

    if let Some(enabled) = query.enabled {
        rules.retain(|r| r.enabled == enabled);
    }
    if let Some(q) = &query.q {
        let needle = q.to_lowercase();
        rules.retain(|r| r.id.to_lowercase().contains(&needle));
    }

    let total = rules.len();
    let page_size = query
        .page_size
        .unwrap_or(state.config.default_page_size)
        .min(state.config.max_page_size)
        .max(1);
    let page = query.page.unwrap_or(1).max(1);
    let start = (page - 1) * page_size;
    let page_items: Vec<Rule> = rules.into_iter().skip(start).take(page_size).collect();

    Json(json!({
        "list": page_items,
        "total": total,
        "page": page,
        "page_size": page_size,
    }))
}

/// GET /admin/rules/{id}
pub async fn get_rule(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let snapshot = state.rule_cache.current();
    match snapshot.rules().iter().find(|c| c.rule.id == id) {
        Some(c) => (StatusCode::OK, Json(json!(c.rule))),
        None => to_response(yapi_core::error::GatewayError::NotFound(format!(
            "rule {id:?} not found"
        ))),
    }
}

/// POST /admin/rules
pub async fn create_rule(
    State(state): State<Arc<AdminState>>,
    Json(rule): Json<Rule>,
) -> (StatusCode, Json<Value>) {
    match state.rule_cache.upsert(rule.clone()).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"id": rule.id, "status": "created"})))
        }
        Err(e) => to_response(e),
    }
}

/// PUT /admin/rules/{id}
pub async fn update_rule(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
    Json(mut rule): Json<Rule>,
) -> (StatusCode, Json<Value>) {
    rule.id = id;
    match state.rule_cache.upsert(rule.clone()).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"id": rule.id, "status": "updated"})))
        }
        Err(e) => to_response(e),
    }
}

/// DELETE /admin/rules/{id}
pub async fn delete_rule(
    State(state): State<Arc<AdminState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.rule_cache.delete(&id).await {
        Ok(()) => {
            persist::save_state(&state).await;
            (StatusCode::OK, Json(json!({"deleted": true})))
        }
        Err(e) => to_response(e),
    }
}
