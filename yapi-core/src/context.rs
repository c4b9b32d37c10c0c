//! Per-request auth facts, populated by the auth middleware and read by the
//! matcher and action pipeline. Modeled as a typed value object rather than
//! a dynamically-typed per-request bag (see spec.md §9's design note on
//! context-facts plumbing) — no downcasting, no stringly-typed keys.

use crate::credential::{ApiKey, Binding, UpstreamInfo};
use crate::user::User;

/// Owned exclusively by the request task; never mutated once the auth
/// middleware has finished populating it (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub api_key: Option<ApiKey>,
    pub raw_key: Option<String>,
    pub user: Option<User>,
    pub binding: Option<Binding>,
    pub upstream_info: Option<UpstreamInfo>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn has_binding(&self) -> bool {
        self.binding.is_some()
    }

    pub fn api_key_id(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.id.as_str())
    }

    pub fn api_key_prefix(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.prefix.as_str())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn binding_upstream_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.upstream_credential_id.as_str())
    }

    pub fn binding_provider(&self) -> Option<&str> {
        self.upstream_info.as_ref().map(|u| u.credential.provider.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_anonymous() {
        let ctx = RequestContext::new("req-1");
        assert_eq!(ctx.request_id, "req-1");
        assert!(!ctx.has_binding());
        assert!(ctx.api_key_id().is_none());
        assert!(ctx.user_id().is_none());
    }
}
