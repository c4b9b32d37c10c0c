//! Cross-replica `rules_changed` pub/sub (spec.md §4.3).
//!
//! A publish is best-effort: failure to notify is logged, never propagated
//! to the admin mutation that triggered it — correctness depends on a
//! sibling's next cache miss or next successful event, not on this publish
//! succeeding (spec.md §7, "errors from the event bus ... are logged, not
//! surfaced").

use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Mutex;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a `rules_changed` notification to every live subscriber.
    async fn publish(&self);

    /// Register a new subscriber. The returned receiver yields one `()`
    /// per publish; subscribers that can't keep up simply see a backlog
    /// (the channel is unbounded) rather than dropped events — reloads are
    /// idempotent so a backlog just means extra redundant reloads.
    fn subscribe(&self) -> Receiver<()>;
}

/// In-process fan-out: every `subscribe()` call gets its own unbounded
/// channel; `publish()` sends into all of them. Mirrors the teacher's
/// `ConfigWatcher` (crossbeam-channel notify, per-resource-type dispatch)
/// generalized to the single `rules_changed` topic.
#[derive(Default)]
pub struct LocalEventBus {
    subscribers: Mutex<Vec<Sender<()>>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self) {
        let subs = self.subscribers.lock().expect("event bus lock poisoned");
        for tx in subs.iter() {
            // An unbounded channel send only fails if the receiver has been
            // dropped; that subscriber is gone, nothing to do about it here.
            let _ = tx.send(());
        }
    }

    fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }
}
