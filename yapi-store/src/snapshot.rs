//! Immutable, ordered rule snapshot with regexes pre-compiled once at
//! publish time rather than per request.

use regex::Regex;
use std::sync::Arc;
use yapi_core::rule::Rule;

/// A rule plus its compiled header-match and path-rewrite regexes.
///
/// `Rule::validate` already rejects rules with non-compiling patterns at
/// save time, so compilation here is infallible in practice; a pattern that
/// somehow still fails to compile is dropped from matching rather than
/// panicking the worker.
pub struct CompiledRule {
    pub rule: Rule,
    pub header_regexes: Vec<(String, Regex)>,
    pub rewrite_regex: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: Rule) -> Self {
        let header_regexes = rule
            .matcher
            .headers
            .iter()
            .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name.clone(), re)))
            .collect();
        let rewrite_regex = rule
            .actions
            .rewrite_path_regex
            .as_ref()
            .and_then(|rw| Regex::new(&rw.pattern).ok());
        Self {
            rule,
            header_regexes,
            rewrite_regex,
        }
    }
}

/// Ordered, immutable rule set: priority descending, then creation time
/// ascending, per spec.md §3's "rule snapshot".
#[derive(Clone, Default)]
pub struct RuleSnapshot {
    rules: Arc<Vec<Arc<CompiledRule>>>,
}

impl RuleSnapshot {
    pub fn build(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        let compiled = rules
            .into_iter()
            .map(|r| Arc::new(CompiledRule::compile(r)))
            .collect();
        Self {
            rules: Arc::new(compiled),
        }
    }

    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapi_core::rule::{Actions, Matcher};

    fn rule(id: &str, priority: i64) -> Rule {
        Rule {
            id: id.into(),
            priority,
            enabled: true,
            matcher: Matcher {
                path_prefix: Some("/v1".into()),
                ..Default::default()
            },
            actions: Actions {
                set_headers: std::collections::HashMap::from([("X-Test".into(), "1".into())]),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn orders_by_priority_descending() {
        let snap = RuleSnapshot::build(vec![rule("low", 1), rule("high", 10), rule("mid", 5)]);
        let ids: Vec<_> = snap.rules().iter().map(|r| r.rule.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn empty_snapshot_is_empty() {
        let snap = RuleSnapshot::default();
        assert!(snap.is_empty());
        assert_eq!(snap.len(), 0);
    }

    #[test]
    fn compiles_header_regex() {
        let mut r = rule("r1", 0);
        r.matcher.headers.insert("X-Env".into(), "^prod$".into());
        let snap = RuleSnapshot::build(vec![r]);
        let compiled = &snap.rules()[0];
        assert_eq!(compiled.header_regexes.len(), 1);
        assert!(compiled.header_regexes[0].1.is_match("prod"));
    }
}
