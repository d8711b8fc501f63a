//! Observable Arrays
//!
//! Array elements have no per-index dependency node. Instead every mutation
//! entry point (`push`, `splice`, `sort_by`, ...) notifies the array's
//! collection node once the array is observed, and observes the values it
//! inserted. Watchers subscribe to that node by reading the field that holds
//! the array.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::observer::{observe, Observer};
use super::value::Value;

struct ArrayInner {
    items: Mutex<Vec<Value>>,
    observer: OnceLock<Observer>,
}

/// A shared sequence. Cloning yields another handle to the same array.
#[derive(Clone)]
pub struct Array(Arc<ArrayInner>);

impl Array {
    /// An empty, unobserved array.
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    pub fn from_values<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self(Arc::new(ArrayInner {
            items: Mutex::new(items.into_iter().collect()),
            observer: OnceLock::new(),
        }))
    }

    /// Whether both handles point at the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// The attached observer, once the array has been observed.
    pub fn observer(&self) -> Option<Observer> {
        self.0.observer.get().cloned()
    }

    pub(crate) fn attach_observer(&self, ob: Observer) -> bool {
        self.0.observer.set(ob).is_ok()
    }

    /// Number of elements. Not tracked.
    pub fn len(&self) -> usize {
        self.0.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`. Not tracked.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.lock().get(index).cloned()
    }

    /// Snapshot of the elements. Not tracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.lock().clone()
    }

    pub fn push(&self, value: Value) {
        self.0.items.lock().push(value.clone());
        self.changed(&[value]);
    }

    pub fn pop(&self) -> Option<Value> {
        let popped = self.0.items.lock().pop();
        self.changed(&[]);
        popped
    }

    pub fn shift(&self) -> Option<Value> {
        let shifted = {
            let mut items = self.0.items.lock();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.changed(&[]);
        shifted
    }

    pub fn unshift(&self, value: Value) {
        self.0.items.lock().insert(0, value.clone());
        self.changed(&[value]);
    }

    /// Insert at `index`, clamped to the length.
    pub fn insert(&self, index: usize, value: Value) {
        {
            let mut items = self.0.items.lock();
            let index = index.min(items.len());
            items.insert(index, value.clone());
        }
        self.changed(&[value]);
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.0.items.lock();
            (index < items.len()).then(|| items.remove(index))
        };
        self.changed(&[]);
        removed
    }

    /// Remove `delete_count` elements starting at `start` and insert `insert`
    /// in their place. Both bounds are clamped. Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut items = self.0.items.lock();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert.iter().cloned()).collect()
        };
        self.changed(&insert);
        removed
    }

    pub fn truncate(&self, len: usize) {
        self.0.items.lock().truncate(len);
        self.changed(&[]);
    }

    pub fn reverse(&self) {
        self.0.items.lock().reverse();
        self.changed(&[]);
    }

    /// Sort in place. The comparator runs on a snapshot, so it may read
    /// this array.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        let mut snapshot = self.to_vec();
        snapshot.sort_by(compare);
        *self.0.items.lock() = snapshot;
        self.changed(&[]);
    }

    /// Replace the element at `index`, padding with `Null` when writing past
    /// the end.
    pub fn set_index(&self, index: usize, value: Value) {
        {
            let mut items = self.0.items.lock();
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value.clone();
        }
        self.changed(&[value]);
    }

    fn changed(&self, inserted: &[Value]) {
        let Some(ob) = self.observer() else {
            return;
        };
        for value in inserted {
            observe(value);
        }
        ob.dep().notify();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("observed", &self.0.observer.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(a: &Array) -> Vec<f64> {
        a.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let a = Array::from_values([1, 2, 3].map(Value::from));
        let removed = a.splice(1, 10, vec![Value::from(9)]);
        assert_eq!(removed.len(), 2);
        assert_eq!(numbers(&a), [1.0, 9.0]);
    }

    #[test]
    fn set_index_pads_past_the_end() {
        let a = Array::new();
        a.set_index(2, Value::from(7));
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(0), Some(Value::Null));
        assert_eq!(a.get(2), Some(Value::from(7)));
    }

    #[test]
    fn sort_and_reverse() {
        let a = Array::from_values([3, 1, 2].map(Value::from));
        a.sort_by(|x, y| {
            x.as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(CmpOrdering::Equal)
        });
        assert_eq!(numbers(&a), [1.0, 2.0, 3.0]);
        a.reverse();
        assert_eq!(numbers(&a), [3.0, 2.0, 1.0]);
    }

    #[test]
    fn shift_and_pop_on_empty_arrays() {
        let a = Array::new();
        assert!(a.shift().is_none());
        assert!(a.pop().is_none());
        assert!(a.remove(0).is_none());
    }
}
