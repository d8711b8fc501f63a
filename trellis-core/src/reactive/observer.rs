//! Observation
//!
//! [`observe`] turns a plain [`Object`] or [`Array`] into an observed one by
//! attaching an [`Observer`]: the marker that owns the collection-level
//! [`Dep`]. Observation is recursive, and the marker is attached before
//! recursing so that cyclic structures terminate.
//!
//! The collection node is notified when the *shape* of a value changes: an
//! array mutation, or a key added with [`set`] / removed with [`del`].
//! Individual field writes notify the field's own node instead.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::diagnostics;
use crate::error::{Error, Result};

use super::array::Array;
use super::dep::Dep;
use super::object::Object;
use super::value::Value;

struct ObserverInner {
    dep: Dep,
    vm_count: AtomicUsize,
}

/// Marker attached to an observed object or array.
#[derive(Clone)]
pub struct Observer(Arc<ObserverInner>);

impl Observer {
    fn new() -> Self {
        Self(Arc::new(ObserverInner {
            dep: Dep::new(),
            vm_count: AtomicUsize::new(0),
        }))
    }

    /// The collection-level dependency node.
    pub fn dep(&self) -> &Dep {
        &self.0.dep
    }

    /// Number of component instances using the value as root data.
    pub fn vm_count(&self) -> usize {
        self.0.vm_count.load(Ordering::Acquire)
    }

    pub(crate) fn retain_root(&self) {
        self.0.vm_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_root(&self) {
        let _ = self
            .0
            .vm_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.0.dep)
            .field("vm_count", &self.vm_count())
            .finish()
    }
}

/// Observe `value`, returning its observer.
///
/// Returns the existing observer when the value is already observed, and
/// `None` for primitives and non-extensible objects.
pub fn observe(value: &Value) -> Option<Observer> {
    match value {
        Value::Object(object) => observe_object(object),
        Value::Array(array) => observe_array(array),
        _ => None,
    }
}

fn observe_object(object: &Object) -> Option<Observer> {
    if let Some(ob) = object.observer() {
        return Some(ob);
    }
    if !object.is_extensible() {
        return None;
    }
    let ob = Observer::new();
    if !object.attach_observer(ob.clone()) {
        return object.observer();
    }
    for key in object.keys_untracked() {
        object.make_reactive(&key, None);
    }
    Some(ob)
}

fn observe_array(array: &Array) -> Option<Observer> {
    if let Some(ob) = array.observer() {
        return Some(ob);
    }
    let ob = Observer::new();
    if !array.attach_observer(ob.clone()) {
        return array.observer();
    }
    for item in array.to_vec() {
        observe(&item);
    }
    Some(ob)
}

/// Make `key` a reactive field of `object` holding `value`.
///
/// The field is created if missing. Adding a key this way does not notify
/// the object's collection node; [`set`] does.
pub fn define_reactive(object: &Object, key: &str, value: Value) {
    object.make_reactive(key, Some(value));
}

/// Subscribe the current watcher to the collection node of `value` (and of
/// nested arrays' elements), as a reactive field read does.
pub(crate) fn depend_value(value: &Value) {
    let Some(ob) = value.observer() else {
        return;
    };
    ob.dep().depend();
    if let Value::Array(array) = value {
        let mut seen = HashSet::new();
        seen.insert(array.addr());
        depend_array(array, &mut seen);
    }
}

/// Element reads are not intercepted, so reading an array field depends on
/// the observers of every element, recursively through nested arrays.
fn depend_array(array: &Array, seen: &mut HashSet<usize>) {
    for item in array.to_vec() {
        if let Some(ob) = item.observer() {
            ob.dep().depend();
        }
        if let Value::Array(inner) = &item {
            if seen.insert(inner.addr()) {
                depend_array(inner, seen);
            }
        }
    }
}

fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Set `key` on `target`, adding it as a reactive field if missing and
/// notifying watchers of the target's shape.
///
/// Array targets take a numeric key and route through [`Array::set_index`].
/// Component root data and non-extensible objects are left unchanged with
/// a warning. Returns `value`.
pub fn set(target: &Value, key: &str, value: Value) -> Value {
    match target {
        Value::Array(array) => match parse_index(key) {
            Some(index) => array.set_index(index, value.clone()),
            None => diagnostics::warn(format!(
                "cannot set non-index key \"{key}\" on an array"
            )),
        },
        Value::Object(object) => set_on_object(object, key, value.clone()),
        _ => diagnostics::warn(format!(
            "cannot set reactive property \"{key}\" on a primitive value"
        )),
    }
    value
}

fn set_on_object(object: &Object, key: &str, value: Value) {
    if object.contains_key(key) {
        object.assign(key, value);
        return;
    }
    let ob = object.observer();
    if ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
        diagnostics::warn(format!(
            "avoid adding reactive property \"{key}\" to component root data at runtime; declare it upfront"
        ));
        return;
    }
    if !object.is_extensible() {
        diagnostics::warn(format!(
            "cannot add property \"{key}\": object is not extensible"
        ));
        return;
    }
    match ob {
        None => object.assign(key, value),
        Some(ob) => {
            define_reactive(object, key, value);
            ob.dep().notify();
        }
    }
}

/// Delete `key` from `target`, notifying watchers of the target's shape.
///
/// Array targets take a numeric key and remove that element. Component root
/// data is left unchanged with a warning.
pub fn del(target: &Value, key: &str) {
    match target {
        Value::Array(array) => match parse_index(key) {
            Some(index) => {
                array.splice(index, 1, Vec::new());
            }
            None => diagnostics::warn(format!(
                "cannot delete non-index key \"{key}\" from an array"
            )),
        },
        Value::Object(object) => {
            let ob = object.observer();
            if ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                diagnostics::warn(format!(
                    "avoid deleting property \"{key}\" from component root data; set it to null instead"
                ));
                return;
            }
            if !object.remove_field(key) {
                return;
            }
            if let Some(ob) = ob {
                ob.dep().notify();
            }
        }
        _ => diagnostics::warn(format!(
            "cannot delete reactive property \"{key}\" on a primitive value"
        )),
    }
}

/// Split a watch expression such as `"user.address.city"` into segments.
///
/// Only simple dot-delimited paths of word characters and `$` are accepted.
pub fn parse_path(path: &str) -> Result<Vec<String>> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$');
    if !valid {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(path.split('.').map(str::to_string).collect())
}

/// Resolve parsed path segments against `root`, tracking every field read.
///
/// Resolution stops at `Null` as soon as an intermediate value is neither an
/// object nor an array.
pub fn resolve_path(root: &Value, segments: &[String]) -> Value {
    let mut current = root.clone();
    for segment in segments {
        current = match &current {
            Value::Object(object) => object.get(segment),
            Value::Array(array) => parse_index(segment)
                .and_then(|i| array.get(i))
                .unwrap_or_default(),
            _ => return Value::Null,
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Value {
        Value::from_json(serde_json::json!({
            "name": "ada",
            "address": { "city": "london" },
            "tags": ["a", "b"]
        }))
    }

    #[test]
    fn observe_is_recursive_and_idempotent() {
        let data = user();
        let ob = observe(&data).unwrap();
        let again = observe(&data).unwrap();
        assert_eq!(ob.dep().id(), again.dep().id());

        let obj = data.as_object().unwrap();
        assert!(obj.is_reactive("name"));
        assert!(obj.get_untracked("address").unwrap().observer().is_some());
        assert!(obj.get_untracked("tags").unwrap().observer().is_some());
    }

    #[test]
    fn cyclic_structures_terminate() {
        let obj = Object::new();
        obj.assign("me", Value::Object(obj.clone()));
        assert!(observe(&Value::Object(obj.clone())).is_some());
        assert!(obj.is_reactive("me"));
    }

    #[test]
    fn primitives_and_frozen_objects_are_not_observed() {
        assert!(observe(&Value::from(1)).is_none());

        let frozen = Object::new();
        frozen.prevent_extensions();
        assert!(observe(&Value::Object(frozen)).is_none());
    }

    #[test]
    fn set_adds_reactive_keys_to_observed_objects() {
        let data = user();
        observe(&data);
        set(&data, "age", Value::from(36));

        let obj = data.as_object().unwrap();
        assert!(obj.is_reactive("age"));
        assert_eq!(obj.get("age"), Value::from(36));
    }

    #[test]
    fn set_on_unobserved_objects_is_plain() {
        let data = Value::object([("a", Value::from(1))]);
        set(&data, "b", Value::from(2));
        assert!(!data.as_object().unwrap().is_reactive("b"));
    }

    #[test]
    fn set_and_del_leave_root_data_alone() {
        crate::config::update(|c| c.silent = true);
        let data = user();
        observe(&data).unwrap().retain_root();

        set(&data, "age", Value::from(1));
        del(&data, "name");

        let obj = data.as_object().unwrap();
        assert!(!obj.contains_key("age"));
        assert!(obj.contains_key("name"));
        crate::config::install(crate::config::Config::default());
    }

    #[test]
    fn array_targets_route_through_index_writes() {
        let list = Value::array([1, 2, 3].map(Value::from));
        set(&list, "1", Value::from(9));
        del(&list, "0");
        let items = list.as_array().unwrap().to_vec();
        assert_eq!(items, vec![Value::from(9), Value::from(3)]);
    }

    #[test]
    fn parse_path_rejects_expressions() {
        assert_eq!(parse_path("user.name").unwrap(), ["user", "name"]);
        assert_eq!(parse_path("$data.x_1").unwrap(), ["$data", "x_1"]);
        assert!(matches!(parse_path("a[0]"), Err(Error::InvalidPath(_))));
        assert!(parse_path("a + b").is_err());
    }

    #[test]
    fn resolve_path_walks_objects_and_arrays() {
        let data = user();
        let city = resolve_path(&data, &parse_path("address.city").unwrap());
        assert_eq!(city, Value::from("london"));
        let tag = resolve_path(&data, &parse_path("tags.1").unwrap());
        assert_eq!(tag, Value::from("b"));
        let missing = resolve_path(&data, &parse_path("name.first").unwrap());
        assert!(missing.is_null());
    }
}
