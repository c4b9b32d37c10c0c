//! Rule store, multi-tier rule cache, and cross-replica event bus
//! (spec.md §4.2–§4.3).

pub mod account_store;
pub mod cache;
pub mod event_bus;
pub mod rule_store;
pub mod schema;
pub mod service;
pub mod snapshot;

#[cfg(feature = "etcd")]
pub mod etcd_store;

pub use account_store::{
    ApiKeyStore, BindingStore, InMemoryApiKeyStore, InMemoryBindingStore, InMemoryUpstreamCredentialStore,
    InMemoryUserStore, UpstreamCredentialStore, UserStore,
};
pub use cache::RuleCache;
pub use event_bus::{EventBus, LocalEventBus};
pub use rule_store::{InMemoryRuleStore, RuleStore};
pub use schema::Schema;
pub use service::RuleCacheService;
pub use snapshot::{CompiledRule, RuleSnapshot};
