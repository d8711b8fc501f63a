//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a field is read,
//! the dependency node registers the current watcher as a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing watcher.
//! Entering a context pushes an entry; dropping the returned guard pops it.
//! Evaluations nest (a computed property read during a render pushes the
//! computed watcher on top of the render watcher), so the stack discipline
//! matters: only the top entry receives dependencies.
//!
//! An entry may also be empty. Lifecycle hooks and data factories run inside
//! an empty entry so that reads they perform are not tracked by whichever
//! watcher happens to be evaluating around them.

use std::cell::RefCell;
use std::sync::Arc;

use super::subscriber::{Subscriber, WatcherId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Arc<dyn Subscriber>>>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the evaluation returns early with an error.
pub struct ReactiveContext {
    subscriber_id: Option<WatcherId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any dependency node that is read will
    /// register the subscriber.
    pub fn enter(subscriber: Arc<dyn Subscriber>) -> Self {
        let subscriber_id = Some(subscriber.id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Some(subscriber)));
        Self { subscriber_id }
    }

    /// Enter a context in which reads are not tracked.
    pub fn untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));
        Self {
            subscriber_id: None,
        }
    }

    /// Check if a subscriber is currently collecting dependencies.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the current subscriber, if any.
    pub fn current() -> Option<Arc<dyn Subscriber>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<WatcherId> {
        Self::current().map(|s| s.id())
    }

    /// Depth of the context stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.map(|s| s.id()),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Dep;

    struct Stub(WatcherId);

    impl Subscriber for Stub {
        fn id(&self) -> WatcherId {
            self.0
        }
        fn add_dep(&self, _dep: &Dep) {}
        fn update(&self) {}
    }

    fn stub() -> Arc<dyn Subscriber> {
        Arc::new(Stub(WatcherId::new()))
    }

    #[test]
    fn context_tracks_subscriber() {
        let sub = stub();
        let id = sub.id();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(sub);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let outer = stub();
        let inner = stub();
        let (id1, id2) = (outer.id(), inner.id());

        {
            let _ctx1 = ReactiveContext::enter(outer);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_masks_the_outer_subscriber() {
        let _ctx = ReactiveContext::enter(stub());
        {
            let _quiet = ReactiveContext::untracked();
            assert!(!ReactiveContext::is_active());
        }
        assert!(ReactiveContext::is_active());
    }
}
