//! File-based persistence for standalone mode (spec.md §6's "persistence
//! DSN (optional) — degrades to in-memory rule store").
//!
//! On every admin mutation the current in-memory state (rules, users, API
//! keys, upstream credentials, bindings) is serialized to a JSON file. On
//! startup the file is loaded back into the in-memory stores so data
//! survives restarts when no real persistence DSN is configured.
//!
//! The file is written atomically: first to a `.tmp` sibling, then renamed
//! over the final path, so a crash mid-write never corrupts the stored
//! state.
//!
//! A no-op when `AdminState::state_file` is `None`.

use crate::server::AdminState;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use yapi_core::credential::{ApiKey, Binding, UpstreamCredential};
use yapi_core::rule::Rule;
use yapi_core::user::User;
use yapi_store::{ApiKeyStore, BindingStore, RuleStore, UpstreamCredentialStore, UserStore};

/// The shape serialized to / deserialized from the state file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    #[serde(default)]
    pub upstream_credentials: Vec<UpstreamCredential>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// Snapshot every in-memory store reachable from `state` and write it to
/// `state.state_file`. Returns immediately (no-op) if `state_file` is
/// `None`. Logs a warning rather than panicking on I/O errors.
pub async fn save_state(state: &AdminState) {
    let path = match &state.state_file {
        Some(p) => p.clone(),
        None => return,
    };

    let users = state.users.list().await.unwrap_or_default();
    let mut api_keys = Vec::new();
    let mut upstream_credentials = Vec::new();
    for user in &users {
        api_keys.extend(state.api_keys.list_for_user(&user.id).await.unwrap_or_default());
        upstream_credentials.extend(
            state
                .upstreams
                .list_for_user(&user.id)
                .await
                .unwrap_or_default(),
        );
    }
    let bindings = state.bindings.list().await.unwrap_or_default();
    let rules: Vec<Rule> = state
        .rule_cache
        .current()
        .rules()
        .iter()
        .map(|c| c.rule.clone())
        .collect();

    let persisted = PersistedState {
        rules,
        users,
        api_keys,
        upstream_credentials,
        bindings,
    };

    let json = match serde_json::to_string_pretty(&persisted) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "persist: failed to serialize state");
            return;
        }
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %e, dir = %parent.display(), "persist: failed to create state dir");
            return;
        }
    }

    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, &json) {
        tracing::warn!(error = %e, path = %tmp.display(), "persist: failed to write tmp file");
        return;
    }
    if let Err(e) = std::fs::rename(&tmp, &path) {
        tracing::warn!(error = %e, "persist: failed to rename tmp → state file");
        return;
    }

    tracing::debug!(path = %path.display(), "persist: state saved");
}

/// Load a previously saved state file into the stores reachable from
/// `state`, and publish the restored rules through the rule cache.
///
/// * Missing file     → silently returns (first run).
/// * Malformed file   → logs a warning and returns.
/// * Success          → every store is populated and the rule snapshot is
///   rebuilt from the restored rules.
pub async fn load_state(path: &Path, state: &Arc<AdminState>) {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "persist: no state file found, starting fresh");
        return;
    }

    let data = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "persist: failed to read state file");
            return;
        }
    };

    let persisted: PersistedState = match serde_json::from_str(&data) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "persist: state file is malformed, ignoring");
            return;
        }
    };

    let counts = (
        persisted.rules.len(),
        persisted.users.len(),
        persisted.api_keys.len(),
        persisted.upstream_credentials.len(),
        persisted.bindings.len(),
    );

    for user in persisted.users {
        let _ = state.users.save(user).await;
    }
    for key in persisted.api_keys {
        let _ = state.api_keys.save(key).await;
    }
    for cred in persisted.upstream_credentials {
        let _ = state.upstreams.save(cred).await;
    }
    for binding in persisted.bindings {
        let _ = state.bindings.save(binding).await;
    }
    for rule in persisted.rules {
        let _ = state.rule_cache.upsert(rule).await;
    }

    tracing::info!(
        rules = counts.0,
        users = counts.1,
        api_keys = counts.2,
        upstream_credentials = counts.3,
        bindings = counts.4,
        path = %path.display(),
        "persist: state restored from file"
    );
}
