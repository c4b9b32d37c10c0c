//! Local tier of the rule cache: a lock-free, atomically-swapped snapshot
//! pointer bumped on every rule mutation or remote sync (spec.md §4.3).
//!
//! Mirrors the teacher's `ArcSwap<CompiledRouter>` + `AtomicU64` version
//! pattern — readers never block a writer and never see a partially built
//! snapshot.

use crate::snapshot::RuleSnapshot;
use arc_swap::{ArcSwap, Guard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct RuleCache {
    snapshot: ArcSwap<RuleSnapshot>,
    version: AtomicU64,
}

impl RuleCache {
    pub fn new(initial: RuleSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(initial),
            version: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Guard<Arc<RuleSnapshot>> {
        self.snapshot.load()
    }

    /// Swap in a freshly built snapshot and bump the version. Returns the
    /// new version number.
    pub fn publish(&self, snapshot: RuleSnapshot) -> u64 {
        self.snapshot.store(Arc::new(snapshot));
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::new(RuleSnapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_version_zero_and_empty() {
        let cache = RuleCache::default();
        assert_eq!(cache.version(), 0);
        assert!(cache.current().is_empty());
    }

    #[test]
    fn publish_bumps_version_and_swaps_snapshot() {
        let cache = RuleCache::default();
        let snap = RuleSnapshot::build(vec![]);
        let v1 = cache.publish(snap);
        assert_eq!(v1, 1);
        assert_eq!(cache.version(), 1);
        let v2 = cache.publish(RuleSnapshot::build(vec![]));
        assert_eq!(v2, 2);
    }
}
