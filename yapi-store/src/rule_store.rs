//! Durable rule storage behind a trait, so the gateway degrades to an
//! in-memory store when no shared-KV endpoint is configured (spec.md §4.2,
//! "simpler in-memory variant ... for graceful degradation").

use async_trait::async_trait;
use dashmap::DashMap;
use yapi_core::error::GatewayError;
use yapi_core::rule::Rule;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Rule>, GatewayError>;
    async fn get(&self, id: &str) -> Result<Option<Rule>, GatewayError>;
    /// Validates `rule` before persisting it; rejects invalid rules without
    /// writing anything.
    async fn save(&self, rule: Rule) -> Result<(), GatewayError>;
    /// Fails with `GatewayError::NotFound` if `id` does not exist.
    async fn delete(&self, id: &str) -> Result<(), GatewayError>;
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: DashMap<String, Rule>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list(&self) -> Result<Vec<Rule>, GatewayError> {
        Ok(self.rules.iter().map(|e| e.value().clone()).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Rule>, GatewayError> {
        Ok(self.rules.get(id).map(|e| e.value().clone()))
    }

    async fn save(&self, rule: Rule) -> Result<(), GatewayError> {
        rule.validate()?;
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        self.rules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("rule {id:?} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapi_core::rule::{Actions, Matcher};
    use std::collections::HashMap;

    fn rule(id: &str) -> Rule {
        Rule {
            id: id.into(),
            priority: 0,
            enabled: true,
            matcher: Matcher {
                path_prefix: Some("/v1".into()),
                ..Default::default()
            },
            actions: Actions {
                set_headers: HashMap::from([("X-Test".into(), "1".into())]),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = InMemoryRuleStore::new();
        store.save(rule("r1")).await.unwrap();
        let got = store.get("r1").await.unwrap();
        assert_eq!(got.unwrap().id, "r1");
    }

    #[tokio::test]
    async fn save_rejects_invalid_rule() {
        let store = InMemoryRuleStore::new();
        let mut r = rule("r1");
        r.actions = Actions::default();
        assert!(store.save(r).await.is_err());
        assert!(store.get("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_rule_is_not_found() {
        let store = InMemoryRuleStore::new();
        let err = store.delete("missing").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn delete_removes_from_list() {
        let store = InMemoryRuleStore::new();
        store.save(rule("r1")).await.unwrap();
        store.delete("r1").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
