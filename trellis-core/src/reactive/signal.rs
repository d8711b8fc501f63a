//! Signal Implementation
//!
//! A Signal is a typed reactive cell: one value, one dependency node. It is
//! the statically typed counterpart of a reactive [`Object`](super::Object)
//! field, for state that does not need to live in dynamic data.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within an evaluating watcher, the signal's
//!    [`Dep`] registers that watcher as a subscriber.
//!
//! 2. When the signal's value changes, all subscribers are notified.
//!
//! 3. Writing a value equal to the current one notifies nobody.
//!
//! # Example
//!
//! ```rust,ignore
//! let count = Signal::new(0);
//!
//! // Read the value
//! let value = count.get();
//!
//! // Update the value (notifies subscribers)
//! count.set(5);
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::dep::Dep;

/// A reactive cell holding a value of type T.
///
/// Cloning yields another handle to the same cell.
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Node notified on change.
    dep: Dep,

    /// The current value.
    value: Arc<RwLock<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            dep: Dep::new(),
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// Get the current value.
    ///
    /// If called while a watcher evaluates, this also subscribes it.
    pub fn get(&self) -> T {
        self.dep.depend();
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and notify subscribers if it differs.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }
        self.dep.notify();
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.value.read());
        self.set(new_value);
    }

    /// The signal's dependency node.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.dep.subscriber_count()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            dep: self.dep.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("dep", &self.dep.id().raw())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
