//! Fixed, soft-failing request-mutation pipeline (spec.md §4.7).
//!
//! The 8 steps run in the order of `yapi_core::rule::ACTION_ORDER` and
//! never reorder by config — unlike the teacher's Lua-scriptable plugin
//! chain, there is nothing here for an admin to sequence or skip.

use crate::json_rewrite;
use crate::request::OutboundRequest;
use yapi_core::context::RequestContext;
use yapi_store::CompiledRule;

/// Header carrying a soft-fail diagnostic when JSON rewriting couldn't be
/// applied. The request is still forwarded; this is observability only.
pub const BODY_REWRITE_ERROR_HEADER: &str = "x-yapi-body-rewrite-error";
pub const UPSTREAM_PROVIDER_HEADER: &str = "x-upstream-provider";
pub const UPSTREAM_CREDENTIAL_ID_HEADER: &str = "x-upstream-credential-id";
pub const USER_ID_HEADER: &str = "x-yapi-user-id";

/// Apply every action of `compiled.rule.actions` to `req`, in the fixed
/// order. Each step soft-fails independently: a failure in one step never
/// prevents later steps from running or aborts the request.
pub fn apply(compiled: &CompiledRule, ctx: &RequestContext, req: &mut OutboundRequest) {
    let actions = &compiled.rule.actions;

    // 1. set_headers — overwrite.
    for (name, value) in &actions.set_headers {
        req.set_header(name, value.clone());
    }

    // 2. add_headers — append without removing.
    for (name, value) in &actions.add_headers {
        req.add_header(name, value.clone());
    }

    // 3. remove_headers.
    for name in &actions.remove_headers {
        req.remove_header(name);
    }

    // 4. set_authorization — ignored if blank after trimming; superseded
    // by step 7's credential injection when a binding is present.
    if let Some(auth) = &actions.set_authorization {
        let trimmed = auth.trim();
        if !trimmed.is_empty() {
            req.set_header("authorization", trimmed.to_string());
        }
    }

    // 5. rewrite_path_regex, using the regex precompiled at snapshot
    // publish time rather than recompiled per request.
    if let (Some(rw), Some(re)) = (&actions.rewrite_path_regex, &compiled.rewrite_regex) {
        let rewritten = re.replace(&req.path, rw.replacement.as_str());
        req.path = rewritten.into_owned();
    }

    // 6. JSON override/remove — soft-fail, recorded as a diagnostic header.
    if !actions.override_json.is_empty() || !actions.remove_json.is_empty() {
        if let Err(err) = json_rewrite::apply(&actions.override_json, &actions.remove_json, req) {
            tracing::warn!(error = %err, rule_id = %compiled.rule.id, "json body rewrite failed, forwarding unmodified");
            req.set_header(BODY_REWRITE_ERROR_HEADER, err);
        }
    }

    // 7. credential injection — supersedes any Authorization set by step 4.
    if let Some(info) = &ctx.upstream_info {
        req.set_header(
            "authorization",
            format!("Bearer {}", info.credential.secret),
        );
        req.set_header(UPSTREAM_PROVIDER_HEADER, info.credential.provider.clone());
        req.set_header(UPSTREAM_CREDENTIAL_ID_HEADER, info.credential.id.clone());
    }

    // 8. user-id header.
    if let Some(user) = &ctx.user {
        req.set_header(USER_ID_HEADER, user.id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use yapi_core::credential::{UpstreamCredential, UpstreamInfo};
    use yapi_core::rule::{Actions, Matcher, PathRewrite, Rule};
    use yapi_core::user::User;
    use yapi_store::CompiledRule;

    fn compiled_rule(actions: Actions) -> std::sync::Arc<CompiledRule> {
        let rule = Rule {
            id: "r1".into(),
            priority: 0,
            enabled: true,
            matcher: Matcher {
                path_prefix: Some("/v1".into()),
                ..Default::default()
            },
            actions,
            created_at: None,
            updated_at: None,
        };
        let snapshot = yapi_store::RuleSnapshot::build(vec![rule]);
        std::sync::Arc::clone(&snapshot.rules()[0])
    }

    #[test]
    fn set_then_add_then_remove_headers_order() {
        let mut actions = Actions::default();
        actions.set_headers.insert("x-a".into(), "1".into());
        actions.add_headers.insert("x-b".into(), "2".into());
        actions.remove_headers.push("x-c".into());
        let compiled = compiled_rule(actions);

        let mut req = OutboundRequest::new("/v1/chat");
        req.add_header("x-c", "should-be-removed");
        let ctx = RequestContext::new("req-1");

        apply(&compiled, &ctx, &mut req);
        assert_eq!(req.get_header("x-a"), Some("1"));
        assert_eq!(req.get_header("x-b"), Some("2"));
        assert_eq!(req.get_header("x-c"), None);
    }

    #[test]
    fn blank_set_authorization_is_ignored() {
        let mut actions = Actions::default();
        actions.set_authorization = Some("   ".into());
        let compiled = compiled_rule(actions);
        let mut req = OutboundRequest::new("/v1/chat");
        let ctx = RequestContext::new("req-1");
        apply(&compiled, &ctx, &mut req);
        assert_eq!(req.get_header("authorization"), None);
    }

    #[test]
    fn credential_injection_supersedes_set_authorization() {
        let mut actions = Actions::default();
        actions.set_authorization = Some("Bearer rule-level".into());
        let compiled = compiled_rule(actions);

        let mut req = OutboundRequest::new("/v1/chat");
        let mut ctx = RequestContext::new("req-1");
        ctx.upstream_info = Some(UpstreamInfo::from_credential(UpstreamCredential {
            id: "cred-1".into(),
            user_id: "u1".into(),
            provider: "openai".into(),
            display_name: "prod".into(),
            secret: "sk-real".into(),
            endpoints: vec!["https://api.openai.com".into()],
            metadata: HashMap::new(),
            enabled: true,
            created_at: None,
            updated_at: None,
        }));

        apply(&compiled, &ctx, &mut req);
        assert_eq!(req.get_header("authorization"), Some("Bearer sk-real"));
        assert_eq!(req.get_header(UPSTREAM_PROVIDER_HEADER), Some("openai"));
        assert_eq!(req.get_header(UPSTREAM_CREDENTIAL_ID_HEADER), Some("cred-1"));
    }

    #[test]
    fn user_id_header_set_when_user_present() {
        let compiled = compiled_rule(Actions {
            set_headers: HashMap::from([("x-test".into(), "1".into())]),
            ..Default::default()
        });
        let mut req = OutboundRequest::new("/v1/chat");
        let mut ctx = RequestContext::new("req-1");
        ctx.user = Some(User {
            id: "user-1".into(),
            name: "alice".into(),
            description: String::new(),
            metadata: HashMap::new(),
            deleted: false,
            created_at: None,
            updated_at: None,
        });
        apply(&compiled, &ctx, &mut req);
        assert_eq!(req.get_header(USER_ID_HEADER), Some("user-1"));
    }

    #[test]
    fn rewrite_path_regex_applies_precompiled_pattern() {
        let actions = Actions {
            rewrite_path_regex: Some(PathRewrite {
                pattern: "^/v1/(.*)$".into(),
                replacement: "/internal/$1".into(),
            }),
            set_headers: HashMap::from([("x-test".into(), "1".into())]),
            ..Default::default()
        };
        let compiled = compiled_rule(actions);
        let mut req = OutboundRequest::new("/v1/chat/completions");
        let ctx = RequestContext::new("req-1");
        apply(&compiled, &ctx, &mut req);
        assert_eq!(req.path, "/internal/chat/completions");
    }

    #[test]
    fn json_rewrite_failure_sets_diagnostic_header_and_still_forwards() {
        let mut actions = Actions::default();
        actions
            .override_json
            .insert("a".into(), serde_json::json!(1));
        let compiled = compiled_rule(actions);

        let mut req = OutboundRequest::new("/v1/chat");
        req.set_header("content-type", "text/plain");
        req.body = Some(b"not json".to_vec());
        let ctx = RequestContext::new("req-1");

        apply(&compiled, &ctx, &mut req);
        assert!(req.get_header(BODY_REWRITE_ERROR_HEADER).is_some());
        assert_eq!(req.body.as_deref(), Some(b"not json".as_slice()));
    }
}
