//! Deep traversal for `deep` watchers.
//!
//! Touching every nested field while a watcher is active subscribes it to
//! all of them. Observed values are visited once per traversal, keyed by
//! their collection node id, which also makes traversal of cyclic graphs
//! terminate.

use std::collections::HashSet;

use super::dep::DepId;
use super::value::Value;

#[derive(Default)]
struct Seen {
    observed: HashSet<DepId>,
    plain: HashSet<usize>,
}

/// Recursively read every field reachable from `value`.
pub fn traverse(value: &Value) {
    let mut seen = Seen::default();
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut Seen) {
    let first_visit = match (value.observer(), value) {
        (Some(ob), _) => seen.observed.insert(ob.dep().id()),
        (None, Value::Object(o)) => seen.plain.insert(o.addr()),
        (None, Value::Array(a)) => seen.plain.insert(a.addr()),
        _ => return,
    };
    if !first_visit {
        return;
    }

    match value {
        Value::Object(object) => {
            for key in object.keys_untracked() {
                let child = object.get(&key);
                visit(&child, seen);
            }
        }
        Value::Array(array) => {
            for item in array.to_vec() {
                visit(&item, seen);
            }
        }
        _ => {}
    }
}
