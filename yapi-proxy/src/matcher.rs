//! Matcher: ordered conjunctive predicate evaluation over a `CompiledRule`,
//! and selection across a `RuleSnapshot` (spec.md §4.6).
//!
//! Grounded on `ando-core/src/router.rs`'s snapshot-iteration idiom; the
//! trie-based `matchit` lookup is replaced by linear predicate evaluation
//! since rule matchers are conjunctions over several unrelated dimensions
//! (headers, bindings, user metadata) rather than a single path trie.

use std::sync::Arc;
use yapi_core::context::RequestContext;
use yapi_core::rule::Rule;
use yapi_store::{CompiledRule, RuleSnapshot};

/// Outcome of matching a request against the cached rule snapshot.
pub enum Selection {
    /// An enabled, matching rule from the snapshot.
    Rule(Arc<CompiledRule>),
    /// No rule matched but a default upstream is configured; synthesised
    /// per spec.md §4.6 (`path_prefix: "/"`, priority -1).
    Default(String),
    NoMatch,
}

/// Evaluate every predicate of `compiled.rule.matcher` in the fixed
/// short-circuit order: bare-request predicates first (cheap to check and
/// don't require an authenticated context), then context predicates.
pub fn matches(
    compiled: &CompiledRule,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    ctx: &RequestContext,
) -> bool {
    let m = &compiled.rule.matcher;

    if let Some(prefix) = &m.path_prefix {
        if !path.starts_with(prefix.as_str()) {
            return false;
        }
    }

    if !m.methods.is_empty() && !m.methods.iter().any(|allowed| allowed.eq_ignore_ascii_case(method)) {
        return false;
    }

    for (name, re) in &compiled.header_regexes {
        let found = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v);
        match found {
            Some(v) if re.is_match(v) => {}
            _ => return false,
        }
    }

    if m.require_binding && !ctx.has_binding() {
        return false;
    }

    if !m.api_key_ids.is_empty() {
        match ctx.api_key_id() {
            Some(id) if m.api_key_ids.iter().any(|want| want == id) => {}
            _ => return false,
        }
    }

    if !m.api_key_prefixes.is_empty() {
        match ctx.api_key_prefix() {
            Some(prefix) if m.api_key_prefixes.iter().any(|want| want == prefix) => {}
            _ => return false,
        }
    }

    if !m.user_ids.is_empty() {
        match ctx.user_id() {
            Some(id) if m.user_ids.iter().any(|want| want == id) => {}
            _ => return false,
        }
    }

    if !m.user_metadata.is_empty() {
        let Some(user) = &ctx.user else {
            return false;
        };
        for (key, want) in &m.user_metadata {
            match user.metadata.get(key) {
                Some(got) if got.trim() == want.trim() => {}
                _ => return false,
            }
        }
    }

    if !m.binding_upstream_ids.is_empty() {
        match ctx.binding_upstream_id() {
            Some(id) if m.binding_upstream_ids.iter().any(|want| want == id) => {}
            _ => return false,
        }
    }

    if !m.binding_providers.is_empty() {
        match ctx.binding_provider() {
            Some(provider) if m.binding_providers.iter().any(|want| want.eq_ignore_ascii_case(provider)) => {}
            _ => return false,
        }
    }

    true
}

/// Select the first enabled rule in `snapshot` whose matcher succeeds
/// (priority desc, creation asc — the snapshot's own sort order). Falls
/// back to a synthesised default rule, else `Selection::NoMatch`.
pub fn select(
    snapshot: &RuleSnapshot,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    ctx: &RequestContext,
    default_upstream_url: Option<&str>,
) -> Selection {
    for compiled in snapshot.rules() {
        if !compiled.rule.enabled {
            continue;
        }
        if matches(compiled, method, path, headers, ctx) {
            return Selection::Rule(Arc::clone(compiled));
        }
    }

    match default_upstream_url {
        Some(url) => Selection::Default(url.to_string()),
        None => Selection::NoMatch,
    }
}

/// A default rule synthesised for the `Selection::Default` case, used by
/// the action pipeline and authoriser as an ordinary (empty-action) rule.
pub fn synthesize_default_rule(target_url: &str) -> Rule {
    Rule {
        id: "__default__".to_string(),
        priority: -1,
        enabled: true,
        matcher: yapi_core::rule::Matcher {
            path_prefix: Some("/".to_string()),
            ..Default::default()
        },
        actions: yapi_core::rule::Actions {
            set_target_url: Some(target_url.to_string()),
            ..Default::default()
        },
        created_at: None,
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use yapi_core::credential::{Binding, UpstreamCredential, UpstreamInfo};
    use yapi_core::rule::{Actions, Matcher};
    use yapi_core::user::User;

    fn build(rules: Vec<Rule>) -> RuleSnapshot {
        RuleSnapshot::build(rules)
    }

    fn rule(id: &str, priority: i64, matcher: Matcher) -> Rule {
        Rule {
            id: id.into(),
            priority,
            enabled: true,
            matcher,
            actions: Actions {
                set_headers: HashMap::from([("x-test".into(), "1".into())]),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        }
    }

    fn anon_ctx() -> RequestContext {
        RequestContext::new("req-1")
    }

    #[test]
    fn path_prefix_matches() {
        let snap = build(vec![rule(
            "r1",
            0,
            Matcher {
                path_prefix: Some("/v1".into()),
                ..Default::default()
            },
        )]);
        let ctx = anon_ctx();
        match select(&snap, "GET", "/v1/chat", &[], &ctx, None) {
            Selection::Rule(r) => assert_eq!(r.rule.id, "r1"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn method_mismatch_fails() {
        let snap = build(vec![rule(
            "r1",
            0,
            Matcher {
                path_prefix: Some("/v1".into()),
                methods: vec!["POST".into()],
                ..Default::default()
            },
        )]);
        let ctx = anon_ctx();
        assert!(matches!(select(&snap, "GET", "/v1/chat", &[], &ctx, None), Selection::NoMatch));
    }

    #[test]
    fn header_regex_must_match() {
        let mut m = Matcher {
            path_prefix: Some("/v1".into()),
            ..Default::default()
        };
        m.headers.insert("x-env".into(), "^prod$".into());
        let snap = build(vec![rule("r1", 0, m)]);
        let ctx = anon_ctx();

        assert!(matches!(
            select(&snap, "GET", "/v1/chat", &[("x-env", "staging")], &ctx, None),
            Selection::NoMatch
        ));
        match select(&snap, "GET", "/v1/chat", &[("x-env", "prod")], &ctx, None) {
            Selection::Rule(_) => {}
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn require_binding_rejects_anonymous_context() {
        let snap = build(vec![rule(
            "r1",
            0,
            Matcher {
                path_prefix: Some("/v1".into()),
                require_binding: true,
                ..Default::default()
            },
        )]);
        let ctx = anon_ctx();
        assert!(matches!(select(&snap, "GET", "/v1/chat", &[], &ctx, None), Selection::NoMatch));
    }

    #[test]
    fn binding_provider_matches_case_insensitively() {
        let snap = build(vec![rule(
            "r1",
            0,
            Matcher {
                path_prefix: Some("/v1".into()),
                binding_providers: vec!["OpenAI".into()],
                ..Default::default()
            },
        )]);

        let mut ctx = RequestContext::new("req-1");
        let cred = UpstreamCredential {
            id: "cred-1".into(),
            user_id: "user-1".into(),
            provider: "openai".into(),
            display_name: "prod".into(),
            secret: "sk-x".into(),
            endpoints: vec!["https://api.openai.com".into()],
            metadata: HashMap::new(),
            enabled: true,
            created_at: None,
            updated_at: None,
        };
        ctx.upstream_info = Some(UpstreamInfo::from_credential(cred));

        match select(&snap, "GET", "/v1/chat", &[], &ctx, None) {
            Selection::Rule(r) => assert_eq!(r.rule.id, "r1"),
            _ => panic!("expected provider match regardless of case"),
        }
    }

    #[test]
    fn no_match_falls_back_to_default_upstream() {
        let snap = build(vec![]);
        let ctx = anon_ctx();
        match select(&snap, "GET", "/anything", &[], &ctx, Some("http://default.internal")) {
            Selection::Default(url) => assert_eq!(url, "http://default.internal"),
            _ => panic!("expected default fallback"),
        }
    }

    #[test]
    fn no_match_and_no_default_is_no_match() {
        let snap = build(vec![]);
        let ctx = anon_ctx();
        assert!(matches!(select(&snap, "GET", "/anything", &[], &ctx, None), Selection::NoMatch));
    }

    #[test]
    fn disabled_rule_is_skipped() {
        let mut r = rule(
            "r1",
            0,
            Matcher {
                path_prefix: Some("/v1".into()),
                ..Default::default()
            },
        );
        r.enabled = false;
        let snap = build(vec![r]);
        let ctx = anon_ctx();
        assert!(matches!(select(&snap, "GET", "/v1/chat", &[], &ctx, None), Selection::NoMatch));
    }

    // ── spec.md §8, scenario 3: account-aware routing wins ──
    #[test]
    fn higher_priority_account_aware_rule_wins_with_context() {
        let mut narrow = Matcher {
            path_prefix: Some("/v1".into()),
            require_binding: true,
            api_key_prefixes: vec!["abcd1234".into()],
            user_ids: vec!["user-1".into()],
            binding_upstream_ids: vec!["cred-1".into()],
            binding_providers: vec!["openai".into()],
            ..Default::default()
        };
        narrow.user_metadata.insert("tier".into(), "gold".into());
        let broad = Matcher {
            path_prefix: Some("/v1".into()),
            ..Default::default()
        };
        let snap = build(vec![rule("narrow", 100, narrow), rule("broad", 10, broad)]);

        let mut ctx = RequestContext::new("req-1");
        ctx.api_key = Some(yapi_core::credential::ApiKey {
            id: "key-1".into(),
            user_id: "user-1".into(),
            label: String::new(),
            prefix: "abcd1234".into(),
            secret_hash: String::new(),
            last_used_at: None,
            enabled: true,
            created_at: None,
            updated_at: None,
        });
        ctx.user = Some(User {
            id: "user-1".into(),
            name: "alice".into(),
            description: String::new(),
            metadata: HashMap::from([("tier".into(), "gold".into())]),
            deleted: false,
            created_at: None,
            updated_at: None,
        });
        ctx.binding = Some(Binding {
            id: "b1".into(),
            user_id: "user-1".into(),
            api_key_id: "key-1".into(),
            upstream_credential_id: "cred-1".into(),
            service: None,
            created_at: None,
        });
        let cred = UpstreamCredential {
            id: "cred-1".into(),
            user_id: "user-1".into(),
            provider: "openai".into(),
            display_name: "prod".into(),
            secret: "sk-x".into(),
            endpoints: vec!["https://api.openai.com".into()],
            metadata: HashMap::new(),
            enabled: true,
            created_at: None,
            updated_at: None,
        };
        ctx.upstream_info = Some(UpstreamInfo::from_credential(cred));

        match select(&snap, "GET", "/v1/chat", &[], &ctx, None) {
            Selection::Rule(r) => assert_eq!(r.rule.id, "narrow"),
            _ => panic!("expected the narrow, higher-priority rule to win"),
        }

        let anon = RequestContext::new("req-2");
        match select(&snap, "GET", "/v1/chat", &[], &anon, None) {
            Selection::Rule(r) => assert_eq!(r.rule.id, "broad"),
            _ => panic!("expected the broad rule to win without context"),
        }
    }
}
