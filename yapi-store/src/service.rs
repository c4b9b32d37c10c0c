//! Ties the three tiers from spec.md §4.3 together: local snapshot (a),
//! shared cache blob (b), rule store (c). Reads check (a); writes fan out
//! through (c) → recompute → (b) → event bus, in that order.

use crate::cache::RuleCache;
use crate::event_bus::EventBus;
use crate::rule_store::RuleStore;
use crate::snapshot::RuleSnapshot;
use arc_swap::Guard;
use async_trait::async_trait;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use yapi_core::error::GatewayError;
use yapi_core::rule::Rule;

/// Tier (b): a single JSON blob holding the full rule snapshot in a shared,
/// out-of-process key-value store. `None` when no shared cache is configured
/// (spec.md §6: "shared-KV address ... optional — degrades to local-only").
#[async_trait]
pub trait SharedSnapshotStore: Send + Sync {
    async fn put_snapshot(&self, rules: &[Rule]) -> Result<(), GatewayError>;
    async fn get_snapshot(&self) -> Result<Option<Vec<Rule>>, GatewayError>;
}

pub struct RuleCacheService {
    store: Arc<dyn RuleStore>,
    cache: RuleCache,
    bus: Arc<dyn EventBus>,
    shared: Option<Arc<dyn SharedSnapshotStore>>,
}

impl RuleCacheService {
    pub fn new(
        store: Arc<dyn RuleStore>,
        bus: Arc<dyn EventBus>,
        shared: Option<Arc<dyn SharedSnapshotStore>>,
    ) -> Self {
        Self {
            store,
            cache: RuleCache::default(),
            bus,
            shared,
        }
    }

    /// Tier (a): the matcher's hot-path read. Never blocks on I/O.
    pub fn current(&self) -> Guard<Arc<RuleSnapshot>> {
        self.cache.current()
    }

    /// Startup / cold-miss load: prefer the shared cache, fall back to the
    /// authoritative store, populate upward (spec.md §4.3 tiering).
    pub async fn load_or_init(&self) -> Result<(), GatewayError> {
        let rules = self.fetch_preferring_shared().await?;
        self.cache.publish(RuleSnapshot::build(rules));
        Ok(())
    }

    async fn fetch_preferring_shared(&self) -> Result<Vec<Rule>, GatewayError> {
        if let Some(shared) = &self.shared {
            match shared.get_snapshot().await {
                Ok(Some(rules)) => return Ok(rules),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "shared cache read failed, falling back to store"),
            }
        }
        self.store.list().await
    }

    /// Upsert a rule: persist, recompute the full snapshot, publish to
    /// every tier. Shared-cache and event-bus failures are logged only —
    /// the local snapshot is already authoritative for this replica.
    pub async fn upsert(&self, rule: Rule) -> Result<(), GatewayError> {
        self.store.save(rule).await?;
        self.recompute_and_broadcast().await
    }

    /// Delete a rule; `GatewayError::NotFound` if the ID is absent.
    pub async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        self.store.delete(id).await?;
        self.recompute_and_broadcast().await
    }

    async fn recompute_and_broadcast(&self) -> Result<(), GatewayError> {
        let rules = self.store.list().await?;
        self.cache.publish(RuleSnapshot::build(rules.clone()));

        if let Some(shared) = &self.shared {
            if let Err(e) = shared.put_snapshot(&rules).await {
                tracing::warn!(error = %e, "failed to publish snapshot to shared cache");
            }
        }
        self.bus.publish().await;
        Ok(())
    }

    /// Reload the local snapshot from remote tiers (shared cache, else
    /// store) — called by the event-bus subscriber on `rules_changed`.
    pub async fn reload_from_remote(&self) -> Result<(), GatewayError> {
        let rules = self.fetch_preferring_shared().await?;
        self.cache.publish(RuleSnapshot::build(rules));
        Ok(())
    }
}

/// Drive the event-bus subscriber loop: block (off the async executor) for
/// the next `rules_changed` notification, then reload. Exits when the
/// channel closes — the spec leaves restart to a supervising caller.
pub async fn run_subscriber(service: Arc<RuleCacheService>, rx: Receiver<()>) {
    loop {
        let recv_result = {
            let rx = rx.clone();
            tokio::task::spawn_blocking(move || rx.recv()).await
        };
        match recv_result {
            Ok(Ok(())) => {
                if let Err(e) = service.reload_from_remote().await {
                    tracing::warn!(error = %e, "rules_changed reload failed");
                }
            }
            Ok(Err(_)) => {
                tracing::info!("event bus channel closed, subscriber exiting");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "subscriber blocking task panicked, exiting");
                break;
            }
        }
    }
}
