//! Subscriber types for the reactive system.
//!
//! A subscriber is anything a [`Dep`](super::Dep) can notify. In practice
//! that is a [`Watcher`](super::Watcher), but the trait keeps the dependency
//! node independent of watcher internals (and lets tests observe
//! notifications directly).

use std::sync::atomic::{AtomicU64, Ordering};

use super::dep::Dep;

/// Unique identifier for a watcher.
///
/// Ids are handed out in creation order and double as the scheduler's sort
/// key: a watcher created earlier (a parent's render watcher, or a user
/// watcher declared before its owner's render watcher) always has a smaller
/// id than one created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber to dependency nodes.
pub trait Subscriber: Send + Sync {
    /// The subscriber's identity.
    fn id(&self) -> WatcherId;

    /// Record that `dep` was read during the current evaluation.
    ///
    /// Called by [`Dep::depend`] while this subscriber is the active one.
    fn add_dep(&self, dep: &Dep);

    /// One of the subscriber's dependencies changed.
    fn update(&self);
}
