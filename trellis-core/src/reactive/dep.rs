//! Dependency Nodes
//!
//! A [`Dep`] is the publisher attached to one observable location: a field
//! of an observed object, the structure of an observed object or array, a
//! [`Signal`](super::Signal), or a computed watcher's value. Watchers that
//! read the location during their last evaluation are its subscribers.
//!
//! Subscribers are held weakly. A watcher whose last handle was dropped
//! simply stops receiving notifications and is pruned on the next
//! [`Dep::notify`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, WatcherId};

/// Unique identifier for a dependency node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct DepInner {
    id: DepId,
    /// Keyed by watcher id, in subscription order.
    subs: Mutex<IndexMap<WatcherId, Weak<dyn Subscriber>>>,
}

/// A dependency node. Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct Dep(Arc<DepInner>);

impl Dep {
    /// Create a node with no subscribers.
    pub fn new() -> Self {
        Self(Arc::new(DepInner {
            id: DepId::next(),
            subs: Mutex::new(IndexMap::new()),
        }))
    }

    /// Get the node's unique ID.
    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Register `sub`. Registering the same subscriber twice is a no-op.
    pub fn add_sub(&self, sub: Weak<dyn Subscriber>, id: WatcherId) {
        self.0.subs.lock().entry(id).or_insert(sub);
    }

    /// Unregister the subscriber with the given id, if present.
    pub fn remove_sub(&self, id: WatcherId) {
        self.0.subs.lock().shift_remove(&id);
    }

    /// Register the currently evaluating watcher, if any.
    pub fn depend(&self) {
        if let Some(current) = ReactiveContext::current() {
            current.add_dep(self);
        }
    }

    /// Notify every subscriber that the observed location changed.
    ///
    /// The subscriber list is snapshotted first: callbacks may add or remove
    /// subscriptions on this very node while we iterate.
    pub fn notify(&self) {
        let snapshot: Vec<Arc<dyn Subscriber>> = {
            let mut subs = self.0.subs.lock();
            subs.retain(|_, weak| weak.strong_count() > 0);
            subs.values().filter_map(Weak::upgrade).collect()
        };

        tracing::trace!(dep = self.0.id.0, subscribers = snapshot.len(), "notify");

        for sub in snapshot {
            sub.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.0
            .subs
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether `id` is currently subscribed.
    pub fn has_subscriber(&self, id: WatcherId) -> bool {
        self.0.subs.lock().contains_key(&id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id.0)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
