//! Patch modules.
//!
//! Each module owns one slice of a node's data bag and keeps the realized
//! node in sync with it. Modules are driven by the patcher at three points:
//! when a node is created, when it is patched against its previous version,
//! and when it is destroyed. Every module only issues backend operations for
//! what actually changed, so re-patching an identical tree is free.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::Value;

use super::ops::{Backend, Invoker, NodeId};
use super::vnode::VNode;

/// A patch module.
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the module also runs for component placeholders.
    fn applies_to_components(&self) -> bool {
        false
    }

    /// `vnode` was just realized.
    fn create(&self, backend: &Backend, vnode: &mut VNode) {
        self.update(backend, &VNode::empty(), vnode);
    }

    /// `new` replaces `old` on the same realized node.
    fn update(&self, backend: &Backend, old: &VNode, new: &mut VNode);

    /// `vnode` is being destroyed.
    fn destroy(&self, _backend: &Backend, _vnode: &VNode) {}
}

/// The standard module set.
pub fn default_modules() -> Vec<Arc<dyn Module>> {
    vec![
        Arc::new(AttrsModule),
        Arc::new(DomPropsModule),
        Arc::new(ClassModule),
        Arc::new(StyleModule),
        Arc::new(EventsModule),
        Arc::new(RefModule),
    ]
}

// ---- attrs ----

/// Attributes. `Null` and `false` mean "absent"; `true` sets the attribute
/// to its own name.
pub struct AttrsModule;

fn attr_value(name: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(name.to_string()),
        other => Some(other.to_display_string()),
    }
}

impl Module for AttrsModule {
    fn name(&self) -> &'static str {
        "attrs"
    }

    fn update(&self, backend: &Backend, old: &VNode, new: &mut VNode) {
        let Some(elm) = new.elm else { return };
        let (old_attrs, new_attrs) = (&old.data.attrs, &new.data.attrs);
        if old_attrs.is_empty() && new_attrs.is_empty() {
            return;
        }

        for (name, value) in new_attrs {
            let cur = attr_value(name, value);
            let prev = old_attrs.get(name).and_then(|v| attr_value(name, v));
            if cur == prev {
                continue;
            }
            match cur {
                Some(cur) => backend.set_attribute(elm, name, &cur),
                None => backend.remove_attribute(elm, name),
            }
        }
        for name in old_attrs.keys() {
            if !new_attrs.contains_key(name) {
                backend.remove_attribute(elm, name);
            }
        }
    }
}

// ---- DOM properties ----

/// Properties set directly on the realized node.
pub struct DomPropsModule;

impl Module for DomPropsModule {
    fn name(&self) -> &'static str {
        "dom_props"
    }

    fn update(&self, backend: &Backend, old: &VNode, new: &mut VNode) {
        let Some(elm) = new.elm else { return };
        let (old_props, new_props) = (&old.data.dom_props, &new.data.dom_props);

        for name in old_props.keys() {
            if !new_props.contains_key(name) {
                backend.set_property(elm, name, &Value::Null);
            }
        }
        for (name, value) in new_props {
            if old_props.get(name).is_some_and(|prev| prev.same(value)) {
                continue;
            }
            backend.set_property(elm, name, value);
        }
    }
}

// ---- class ----

/// Render a class binding: strings as-is, arrays joined, objects as the
/// keys whose values are truthy.
pub fn stringify_class(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .to_vec()
            .iter()
            .map(stringify_class)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(object) => object
            .entries_untracked()
            .into_iter()
            .filter(|(_, on)| on.truthy())
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// The `class` binding.
pub struct ClassModule;

impl Module for ClassModule {
    fn name(&self) -> &'static str {
        "class"
    }

    fn update(&self, backend: &Backend, old: &VNode, new: &mut VNode) {
        let Some(elm) = new.elm else { return };
        if old.data.class.is_none() && new.data.class.is_none() {
            return;
        }
        let prev = old.data.class.as_ref().map(stringify_class).unwrap_or_default();
        let cur = new.data.class.as_ref().map(stringify_class).unwrap_or_default();
        if prev != cur {
            backend.set_class(elm, &cur);
        }
    }
}

// ---- style ----

/// Inline style properties.
pub struct StyleModule;

impl Module for StyleModule {
    fn name(&self) -> &'static str {
        "style"
    }

    fn update(&self, backend: &Backend, old: &VNode, new: &mut VNode) {
        let Some(elm) = new.elm else { return };
        let (old_style, new_style) = (&old.data.style, &new.data.style);

        for name in old_style.keys() {
            if !new_style.contains_key(name) {
                backend.set_style(elm, name, None);
            }
        }
        for (name, value) in new_style {
            if old_style.get(name) != Some(value) {
                backend.set_style(elm, name, Some(value));
            }
        }
    }
}

// ---- events ----

/// Event listeners, attached once per event name through a stable
/// [`Invoker`]. Later patches only swap the handler.
pub struct EventsModule;

impl Module for EventsModule {
    fn name(&self) -> &'static str {
        "events"
    }

    fn update(&self, backend: &Backend, old: &VNode, new: &mut VNode) {
        let Some(elm) = new.elm else { return };
        if old.data.on.is_empty() && new.data.on.is_empty() {
            return;
        }

        let mut invokers = IndexMap::with_capacity(new.data.on.len());
        for (event, handler) in &new.data.on {
            let invoker = match old.invokers.get(event) {
                Some(invoker) => {
                    invoker.set(handler.clone());
                    invoker.clone()
                }
                None => {
                    let invoker = Invoker::new(handler.clone());
                    backend.add_listener(elm, event, invoker.clone());
                    invoker
                }
            };
            invokers.insert(event.clone(), invoker);
        }
        for event in old.invokers.keys() {
            if !new.data.on.contains_key(event) {
                backend.remove_listener(elm, event);
            }
        }
        new.invokers = invokers;
    }

    fn destroy(&self, backend: &Backend, vnode: &VNode) {
        let Some(elm) = vnode.elm else { return };
        for event in vnode.invokers.keys() {
            backend.remove_listener(elm, event);
        }
    }
}

// ---- ref ----

/// Registers realized nodes under their `ref` name in the owning component.
pub struct RefModule;

fn register_ref(vnode: &VNode, elm: Option<NodeId>, remove: bool) {
    let (Some(name), Some(elm)) = (vnode.data.ref_name.as_deref(), elm) else {
        return;
    };
    let Some(owner) = vnode.context.as_ref().and_then(|w| w.upgrade()) else {
        return;
    };
    if remove {
        owner.unregister_ref(name, elm);
    } else {
        owner.register_ref(name, elm);
    }
}

impl Module for RefModule {
    fn name(&self) -> &'static str {
        "ref"
    }

    fn applies_to_components(&self) -> bool {
        true
    }

    fn create(&self, _backend: &Backend, vnode: &mut VNode) {
        register_ref(vnode, vnode.root_elm(), false);
    }

    fn update(&self, _backend: &Backend, old: &VNode, new: &mut VNode) {
        let (old_elm, new_elm) = (old.root_elm(), new.root_elm());
        if old.data.ref_name != new.data.ref_name || old_elm != new_elm {
            register_ref(old, old_elm, true);
            register_ref(new, new_elm, false);
        }
    }

    fn destroy(&self, _backend: &Backend, vnode: &VNode) {
        register_ref(vnode, vnode.root_elm(), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_bindings_stringify() {
        let value = Value::from_json(serde_json::json!([
            "a",
            { "b": true, "c": false },
            ["d", ""]
        ]));
        assert_eq!(stringify_class(&value), "a b d");
        assert_eq!(stringify_class(&Value::from("x y")), "x y");
        assert_eq!(stringify_class(&Value::Null), "");
    }

    #[test]
    fn boolean_attributes() {
        assert_eq!(attr_value("disabled", &Value::from(true)).as_deref(), Some("disabled"));
        assert_eq!(attr_value("disabled", &Value::from(false)), None);
        assert_eq!(attr_value("id", &Value::from(3)).as_deref(), Some("3"));
    }
}
