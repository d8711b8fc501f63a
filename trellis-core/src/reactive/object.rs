//! Observable Objects
//!
//! An [`Object`] is a shared, insertion-ordered keyed structure. Until it is
//! passed to [`observe`](super::observe) it behaves like a plain map. Once
//! observed, every field present at that moment owns a [`Dep`]:
//!
//! - reading the field through [`Object::get`] while a watcher evaluates
//!   subscribes that watcher to the field (and to the collection node of the
//!   field's value, if that value is observed too);
//! - writing it through [`Object::assign`] notifies the subscribers, unless
//!   the new value is the same as the old one.
//!
//! Fields added later with `assign` are plain, untracked fields. Use
//! [`set`](super::set) to add a key that watchers should see.
//!
//! A field is either a data slot or an accessor pair. Accessors are kept
//! when the object is observed: reads go through the getter, writes through
//! the setter, and an accessor without a setter ignores writes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::dep::Dep;
use super::observer::{depend_value, observe, Observer};
use super::value::Value;

/// Accessor read function.
pub type Getter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Accessor write function.
pub type Setter = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone)]
enum Slot {
    Data(Value),
    Accessor { get: Getter, set: Option<Setter> },
}

impl Slot {
    /// Read the slot. Must be called without the field lock held, since a
    /// getter may read this very object.
    fn read(&self) -> Value {
        match self {
            Slot::Data(value) => value.clone(),
            Slot::Accessor { get, .. } => get(),
        }
    }
}

struct Field {
    slot: Slot,
    /// Present once the field has been made reactive.
    dep: Option<Dep>,
}

struct ObjectInner {
    fields: Mutex<IndexMap<String, Field>>,
    observer: OnceLock<Observer>,
    extensible: AtomicBool,
}

/// A shared keyed structure. Cloning yields another handle to the same object.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

impl Object {
    /// Create an empty, unobserved object.
    pub fn new() -> Self {
        Self(Arc::new(ObjectInner {
            fields: Mutex::new(IndexMap::new()),
            observer: OnceLock::new(),
            extensible: AtomicBool::new(true),
        }))
    }

    /// Create an unobserved object from key/value pairs, in order.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let object = Self::new();
        {
            let mut fields = object.0.fields.lock();
            for (key, value) in pairs {
                fields.insert(
                    key.into(),
                    Field {
                        slot: Slot::Data(value),
                        dep: None,
                    },
                );
            }
        }
        object
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// The observer attached to this object, if any.
    pub fn observer(&self) -> Option<Observer> {
        self.0.observer.get().cloned()
    }

    /// Attach `ob` as this object's observer. Returns false if one was
    /// already attached.
    pub(crate) fn attach_observer(&self, ob: Observer) -> bool {
        self.0.observer.set(ob).is_ok()
    }

    /// Read a field, tracking it if a watcher is evaluating.
    ///
    /// Missing keys read as [`Value::Null`].
    pub fn get(&self, key: &str) -> Value {
        let (slot, dep) = {
            let fields = self.0.fields.lock();
            match fields.get(key) {
                Some(field) => (field.slot.clone(), field.dep.clone()),
                None => return Value::Null,
            }
        };

        let value = slot.read();
        if let Some(dep) = dep {
            dep.depend();
            depend_value(&value);
        }
        value
    }

    /// Read a field without tracking. Returns `None` for a missing key.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        let slot = self.0.fields.lock().get(key).map(|f| f.slot.clone())?;
        Some(slot.read())
    }

    /// Write a field.
    ///
    /// For a reactive field: no-op when the value is unchanged, otherwise
    /// store it (or call the setter), observe it and notify subscribers. A
    /// missing key is inserted as a plain field, unless the object is
    /// non-extensible, in which case the write is ignored.
    pub fn assign(&self, key: &str, value: Value) {
        let existing = {
            let mut fields = self.0.fields.lock();
            match fields.get(key) {
                Some(field) => Some((field.slot.clone(), field.dep.clone())),
                None => {
                    if self.is_extensible() {
                        fields.insert(
                            key.to_string(),
                            Field {
                                slot: Slot::Data(value.clone()),
                                dep: None,
                            },
                        );
                    }
                    None
                }
            }
        };

        let Some((slot, dep)) = existing else {
            return;
        };

        if dep.is_some() && slot.read().same(&value) {
            return;
        }

        match slot {
            Slot::Accessor { set: None, .. } => return,
            Slot::Accessor { set: Some(set), .. } => set(value.clone()),
            Slot::Data(_) => {
                if let Some(field) = self.0.fields.lock().get_mut(key) {
                    field.slot = Slot::Data(value.clone());
                }
            }
        }

        if let Some(dep) = dep {
            observe(&value);
            dep.notify();
        }
    }

    /// Define (or replace) an accessor field. The field is not reactive
    /// until the object is observed or [`define_reactive`](super::define_reactive)
    /// is applied to it.
    pub fn define_accessor(&self, key: &str, get: Getter, set: Option<Setter>) {
        let mut fields = self.0.fields.lock();
        let slot = Slot::Accessor { get, set };
        match fields.get_mut(key) {
            Some(field) => field.slot = slot,
            None => {
                fields.insert(key.to_string(), Field { slot, dep: None });
            }
        }
    }

    /// Forbid adding new keys. Non-extensible objects are never observed.
    pub fn prevent_extensions(&self) {
        self.0.extensible.store(false, Ordering::Release);
    }

    /// False after [`prevent_extensions`](Self::prevent_extensions).
    pub fn is_extensible(&self) -> bool {
        self.0.extensible.load(Ordering::Acquire)
    }

    /// Whether the object has its own field named `key`. Not tracked.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.fields.lock().contains_key(key)
    }

    /// Whether `key` is a reactive field.
    pub fn is_reactive(&self, key: &str) -> bool {
        self.0
            .fields
            .lock()
            .get(key)
            .is_some_and(|f| f.dep.is_some())
    }

    /// The object's keys in insertion order.
    ///
    /// On an observed object this subscribes the current watcher to the
    /// object's collection node, so keys added by [`set`](super::set) or
    /// removed by [`del`](super::del) are noticed.
    pub fn keys(&self) -> Vec<String> {
        if let Some(ob) = self.observer() {
            ob.dep().depend();
        }
        self.keys_untracked()
    }

    pub(crate) fn keys_untracked(&self) -> Vec<String> {
        self.0.fields.lock().keys().cloned().collect()
    }

    /// Number of own fields. Not tracked; read [`keys`](Self::keys) to
    /// depend on the key set.
    pub fn len(&self) -> usize {
        self.0.fields.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries without tracking.
    pub fn entries_untracked(&self) -> Vec<(String, Value)> {
        let slots: Vec<(String, Slot)> = self
            .0
            .fields
            .lock()
            .iter()
            .map(|(k, f)| (k.clone(), f.slot.clone()))
            .collect();
        slots
            .into_iter()
            .map(|(key, slot)| (key, slot.read()))
            .collect()
    }

    /// Give `key` a dependency node, inserting it if missing.
    ///
    /// An existing reactive field keeps its node; `initial`, when given,
    /// replaces a data slot's value without notifying. The field's value is
    /// observed.
    pub(crate) fn make_reactive(&self, key: &str, initial: Option<Value>) {
        let slot = {
            let mut fields = self.0.fields.lock();
            match fields.get_mut(key) {
                Some(field) => {
                    if let (Some(value), Slot::Data(_)) = (initial, &field.slot) {
                        field.slot = Slot::Data(value);
                    }
                    if field.dep.is_none() {
                        field.dep = Some(Dep::new());
                    }
                    field.slot.clone()
                }
                None => {
                    if !self.is_extensible() {
                        return;
                    }
                    let slot = Slot::Data(initial.unwrap_or_default());
                    fields.insert(
                        key.to_string(),
                        Field {
                            slot: slot.clone(),
                            dep: Some(Dep::new()),
                        },
                    );
                    slot
                }
            }
        };

        // A read-only accessor has no stored value to observe.
        let child = match slot {
            Slot::Data(value) => value,
            Slot::Accessor { get, set: Some(_) } => get(),
            Slot::Accessor { set: None, .. } => return,
        };
        observe(&child);
    }

    /// Remove `key`. Returns whether it was present.
    pub(crate) fn remove_field(&self, key: &str) -> bool {
        self.0.fields.lock().shift_remove(key).is_some()
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys_untracked())
            .field("observed", &self.0.observer.get().is_some())
            .finish()
    }
}
