//! etcd-backed implementations of `RuleStore`, `SharedSnapshotStore`, and
//! `EventBus` (spec.md §4.2/§4.3/§6: "a shared key-value store holds one
//! JSON-encoded rules snapshot under a fixed key and a pub/sub channel for
//! `rules_changed` events"). Feature-gated behind `etcd` so the crate builds
//! (and the gateway degrades gracefully) without an etcd endpoint configured.

use crate::event_bus::EventBus;
use crate::rule_store::RuleStore;
use crate::schema::Schema;
use crate::service::SharedSnapshotStore;
use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, unbounded};
use etcd_client::{Client, GetOptions, PutOptions, WatchOptions};
use std::sync::Mutex;
use yapi_core::error::GatewayError;
use yapi_core::rule::Rule;

fn io_err(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::UpstreamUnreachable(format!("etcd: {e}"))
}

pub struct EtcdRuleStore {
    client: Mutex<Client>,
    schema: Schema,
}

impl EtcdRuleStore {
    pub async fn connect(endpoints: &[String], key_prefix: &str) -> Result<Self, GatewayError> {
        let client = Client::connect(endpoints, None).await.map_err(io_err)?;
        Ok(Self {
            client: Mutex::new(client),
            schema: Schema::new(key_prefix),
        })
    }

    fn clone_client(&self) -> Client {
        self.client.lock().expect("etcd client lock poisoned").clone()
    }
}

#[async_trait]
impl RuleStore for EtcdRuleStore {
    async fn list(&self) -> Result<Vec<Rule>, GatewayError> {
        let mut client = self.clone_client();
        let resp = client
            .get(
                self.schema.rules_prefix(),
                Some(GetOptions::new().with_prefix()),
            )
            .await
            .map_err(io_err)?;

        let mut rules = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let rule: Rule = serde_json::from_slice(kv.value())
                .map_err(|e| GatewayError::InvalidInput(format!("corrupt rule record: {e}")))?;
            rules.push(rule);
        }
        Ok(rules)
    }

    async fn get(&self, id: &str) -> Result<Option<Rule>, GatewayError> {
        let mut client = self.clone_client();
        let resp = client.get(self.schema.rule_key(id), None).await.map_err(io_err)?;
        match resp.kvs().first() {
            Some(kv) => {
                let rule = serde_json::from_slice(kv.value())
                    .map_err(|e| GatewayError::InvalidInput(format!("corrupt rule record: {e}")))?;
                Ok(Some(rule))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, rule: Rule) -> Result<(), GatewayError> {
        rule.validate()?;
        let body = serde_json::to_vec(&rule)
            .map_err(|e| GatewayError::InvalidInput(format!("rule serialize failed: {e}")))?;
        let mut client = self.clone_client();
        client
            .put(self.schema.rule_key(&rule.id), body, None)
            .await
            .map_err(io_err)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        let mut client = self.clone_client();
        let resp = client
            .delete(self.schema.rule_key(id), None)
            .await
            .map_err(io_err)?;
        if resp.deleted() == 0 {
            return Err(GatewayError::NotFound(format!("rule {id:?} not found")));
        }
        Ok(())
    }
}

pub struct EtcdSnapshotStore {
    client: Mutex<Client>,
    schema: Schema,
}

impl EtcdSnapshotStore {
    pub fn new(client: Client, key_prefix: &str) -> Self {
        Self {
            client: Mutex::new(client),
            schema: Schema::new(key_prefix),
        }
    }

    fn clone_client(&self) -> Client {
        self.client.lock().expect("etcd client lock poisoned").clone()
    }
}

#[async_trait]
impl SharedSnapshotStore for EtcdSnapshotStore {
    async fn put_snapshot(&self, rules: &[Rule]) -> Result<(), GatewayError> {
        let body = serde_json::to_vec(rules)
            .map_err(|e| GatewayError::InvalidInput(format!("snapshot serialize failed: {e}")))?;
        let mut client = self.clone_client();
        client
            .put(self.schema.snapshot_blob_key(), body, None)
            .await
            .map_err(io_err)?;
        Ok(())
    }

    async fn get_snapshot(&self) -> Result<Option<Vec<Rule>>, GatewayError> {
        let mut client = self.clone_client();
        let resp = client
            .get(self.schema.snapshot_blob_key(), None)
            .await
            .map_err(io_err)?;
        match resp.kvs().first() {
            Some(kv) => {
                let rules = serde_json::from_slice(kv.value())
                    .map_err(|e| GatewayError::InvalidInput(format!("corrupt snapshot blob: {e}")))?;
                Ok(Some(rules))
            }
            None => Ok(None),
        }
    }
}

/// Publishes by writing an incrementing counter to the `rules_changed` key;
/// a background task watches that key and fans the notification out to
/// local `LocalEventBus`-style subscribers so the rest of the gateway never
/// has to deal with etcd watch streams directly.
pub struct EtcdEventBus {
    client: Mutex<Client>,
    channel_key: String,
    subscribers: Mutex<Vec<Sender<()>>>,
}

impl EtcdEventBus {
    pub async fn new(client: Client, channel_key: String) -> Result<Self, GatewayError> {
        Ok(Self {
            client: Mutex::new(client),
            channel_key,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn clone_client(&self) -> Client {
        self.client.lock().expect("etcd client lock poisoned").clone()
    }

    /// Background watch loop: forward every PUT on `channel_key` to every
    /// registered local subscriber. Exits when the watch stream ends
    /// (etcd connection lost) — a supervising caller decides whether to
    /// reconnect and re-spawn (spec.md §4.3 / §9).
    pub async fn run_watch_loop(&self) -> Result<(), GatewayError> {
        let mut client = self.clone_client();
        let (_watcher, mut stream) = client
            .watch(self.channel_key.clone(), Some(WatchOptions::new()))
            .await
            .map_err(io_err)?;

        while let Ok(Some(resp)) = stream.message().await {
            if resp.events().is_empty() {
                continue;
            }
            let subs = self.subscribers.lock().expect("subscriber lock poisoned");
            for tx in subs.iter() {
                let _ = tx.send(());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for EtcdEventBus {
    async fn publish(&self) {
        let mut client = self.clone_client();
        let now = chrono::Utc::now().timestamp_millis().to_string();
        if let Err(e) = client
            .put(self.channel_key.clone(), now, Some(PutOptions::new()))
            .await
        {
            tracing::warn!(error = %e, "failed to publish rules_changed to etcd");
        }
    }

    fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(tx);
        rx
    }
}
