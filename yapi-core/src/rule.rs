//! Rule model: the persistent (matcher, actions, priority) triple that the
//! matcher evaluates and the action pipeline applies.

use crate::error::GatewayError;
use crate::jsonpath;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Matcher {
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub api_key_ids: Vec<String>,
    #[serde(default)]
    pub api_key_prefixes: Vec<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    #[serde(default)]
    pub binding_upstream_ids: Vec<String>,
    #[serde(default)]
    pub binding_providers: Vec<String>,
    #[serde(default)]
    pub require_binding: bool,
}

impl Matcher {
    /// Matcher is "wholly empty" when every predicate is vacuous — used by
    /// rule validation (a rule with only an empty matcher is invalid).
    pub fn is_wholly_empty(&self) -> bool {
        self.path_prefix.is_none()
            && self.methods.is_empty()
            && self.headers.is_empty()
            && self.api_key_ids.is_empty()
            && self.api_key_prefixes.is_empty()
            && self.user_ids.is_empty()
            && self.user_metadata.is_empty()
            && self.binding_upstream_ids.is_empty()
            && self.binding_providers.is_empty()
            && !self.require_binding
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Actions {
    #[serde(default)]
    pub set_target_url: Option<String>,
    #[serde(default)]
    pub set_headers: HashMap<String, String>,
    #[serde(default)]
    pub add_headers: HashMap<String, String>,
    #[serde(default)]
    pub remove_headers: Vec<String>,
    #[serde(default)]
    pub set_authorization: Option<String>,
    #[serde(default)]
    pub override_json: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub remove_json: Vec<String>,
    #[serde(default)]
    pub rewrite_path_regex: Option<PathRewrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRewrite {
    pub pattern: String,
    pub replacement: String,
}

impl Actions {
    pub fn is_empty(&self) -> bool {
        self.set_target_url.is_none()
            && self.set_headers.is_empty()
            && self.add_headers.is_empty()
            && self.remove_headers.is_empty()
            && self.set_authorization.is_none()
            && self.override_json.is_empty()
            && self.remove_json.is_empty()
            && self.rewrite_path_regex.is_none()
    }
}

/// A single rule action enum kept for callers that want to iterate a fixed
/// pipeline order symbolically (used by `yapi-actions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetHeaders,
    AddHeaders,
    RemoveHeaders,
    SetAuthorization,
    RewritePathRegex,
    JsonRewrite,
    CredentialInjection,
    UserIdHeader,
}

pub const ACTION_ORDER: [Action; 8] = [
    Action::SetHeaders,
    Action::AddHeaders,
    Action::RemoveHeaders,
    Action::SetAuthorization,
    Action::RewritePathRegex,
    Action::JsonRewrite,
    Action::CredentialInjection,
    Action::UserIdHeader,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub matcher: Matcher,
    #[serde(default)]
    pub actions: Actions,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

/// ID must be non-empty and URL-safe: ASCII alphanumerics, `-`, `_`.
fn is_url_safe_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl Rule {
    /// Validate every invariant from spec.md §3/§8: non-empty URL-safe ID,
    /// matcher not wholly empty, at least one action, every embedded regex
    /// compiles, every JSON path parses.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !is_url_safe_id(&self.id) {
            return Err(GatewayError::InvalidInput(format!(
                "rule id {:?} is empty or not URL-safe",
                self.id
            )));
        }
        if self.matcher.is_wholly_empty() {
            return Err(GatewayError::InvalidInput(
                "matcher must not be wholly empty".into(),
            ));
        }
        if self.actions.is_empty() {
            return Err(GatewayError::InvalidInput(
                "at least one action must be present".into(),
            ));
        }
        for pattern in self.matcher.headers.values() {
            Regex::new(pattern)
                .map_err(|e| GatewayError::InvalidInput(format!("invalid header regex {pattern:?}: {e}")))?;
        }
        if let Some(rw) = &self.actions.rewrite_path_regex {
            Regex::new(&rw.pattern)
                .map_err(|e| GatewayError::InvalidInput(format!("invalid rewrite regex {:?}: {e}", rw.pattern)))?;
        }
        for path in self.actions.override_json.keys() {
            jsonpath::parse(path)?;
        }
        for path in &self.actions.remove_json {
            jsonpath::parse(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_rule() -> Rule {
        Rule {
            id: "rule-1".into(),
            priority: 0,
            enabled: true,
            matcher: Matcher {
                path_prefix: Some("/v1".into()),
                ..Default::default()
            },
            actions: Actions {
                set_headers: HashMap::from([("X-Test".into(), "true".into())]),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        }
    }

    // ── validate: id ──
    #[test]
    fn empty_id_fails() {
        let mut r = base_rule();
        r.id = String::new();
        assert!(r.validate().is_err());
    }

    #[test]
    fn non_url_safe_id_fails() {
        let mut r = base_rule();
        r.id = "rule/1".into();
        assert!(r.validate().is_err());
    }

    #[test]
    fn url_safe_id_passes() {
        let r = base_rule();
        assert!(r.validate().is_ok());
    }

    // ── validate: matcher ──
    #[test]
    fn wholly_empty_matcher_fails() {
        let mut r = base_rule();
        r.matcher = Matcher::default();
        assert!(r.validate().is_err());
    }

    // ── validate: actions ──
    #[test]
    fn empty_actions_fail() {
        let mut r = base_rule();
        r.actions = Actions::default();
        assert!(r.validate().is_err());
    }

    // ── validate: regex ──
    #[test]
    fn bad_header_regex_fails() {
        let mut r = base_rule();
        r.matcher.headers.insert("X-Foo".into(), "(unclosed".into());
        assert!(r.validate().is_err());
    }

    #[test]
    fn bad_rewrite_regex_fails() {
        let mut r = base_rule();
        r.actions.rewrite_path_regex = Some(PathRewrite {
            pattern: "(unclosed".into(),
            replacement: "/x".into(),
        });
        assert!(r.validate().is_err());
    }

    // ── validate: json paths ──
    #[test]
    fn bad_override_json_path_fails() {
        let mut r = base_rule();
        r.actions.override_json.insert("a..b".into(), serde_json::json!(1));
        assert!(r.validate().is_err());
    }

    #[test]
    fn bad_remove_json_path_fails() {
        let mut r = base_rule();
        r.actions.remove_json.push("a[]".into());
        assert!(r.validate().is_err());
    }

    #[test]
    fn valid_json_paths_pass() {
        let mut r = base_rule();
        r.actions
            .override_json
            .insert("messages[0].role".into(), serde_json::json!("assistant"));
        r.actions.remove_json.push("metadata.debug".into());
        assert!(r.validate().is_ok());
    }
}
