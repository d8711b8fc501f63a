//! Virtual Nodes
//!
//! A [`VNode`] describes one element, text leaf, comment or child component
//! of a render's output. Trees are rebuilt on every render and compared
//! against the previous tree by the [patcher](super::Patcher); after a patch
//! each node's `elm` points at the realized node it maps to.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::error::Result;
use crate::reactive::Value;

use super::async_component::AsyncComponent;
use super::ops::{Backend, Handler, Invoker, NodeId};

/// Explicit identity of a node among its siblings.
///
/// Keys compare by type as well as by value: the number `1.5` and the string
/// `"1.5"` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(String),
    Int(i64),
    /// Bit pattern of a non-integral number.
    Float(u64),
    Bool(bool),
}

impl Key {
    /// Convert a primitive value into a key. Composites and null are not
    /// valid keys.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::String(s) => Some(Key::Str(s.clone())),
            Value::Number(n) => Some(Key::from(*n)),
            Value::Bool(b) => Some(Key::Bool(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(n) => write!(f, "{n}"),
            Key::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Key::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            Key::Int(n as i64)
        } else {
            Key::Float(n.to_bits())
        }
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(i64::from(n))
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key::Int(n as i64)
    }
}

/// Parameterized slot content supplied by a parent.
pub type ScopedSlot = Arc<dyn Fn(&Value) -> Vec<VNode> + Send + Sync>;

/// Creates child component instances for component nodes.
pub trait ComponentFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Create and mount an instance for `placeholder`. The instance's root
    /// is realized but not yet inserted anywhere.
    fn instantiate(&self, placeholder: &VNode, backend: &Backend) -> Result<Arc<dyn MountedComponent>>;
}

/// A mounted child component, as seen by the patcher.
pub trait MountedComponent: Send + Sync {
    /// The realized root of the component's current tree.
    fn root_elm(&self) -> Option<NodeId>;

    /// The placeholder was re-rendered: take new props and slot content.
    fn prepatch(&self, placeholder: &VNode);

    /// The component's root has been inserted by the outermost patch.
    fn inserted(&self);

    fn destroy(&self);
}

/// Receives ref registrations for nodes rendered by a component.
pub trait RefOwner: Send + Sync {
    fn register_ref(&self, name: &str, elm: NodeId);

    /// Remove `name` if it still points at `elm`.
    fn unregister_ref(&self, name: &str, elm: NodeId);
}

/// A component that can be asked to render again.
pub trait RenderOwner: Send + Sync {
    fn force_render(&self);
}

/// What a node is.
#[derive(Clone)]
pub enum VNodeKind {
    Element(String),
    Component(Arc<dyn ComponentFactory>),
    Text(String),
    Comment(String),
    /// An async component that has not resolved yet. Realized as an empty
    /// comment.
    AsyncPlaceholder(AsyncComponent),
}

impl fmt::Debug for VNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeKind::Element(tag) => write!(f, "Element({tag:?})"),
            VNodeKind::Component(factory) => write!(f, "Component({:?})", factory.name()),
            VNodeKind::Text(text) => write!(f, "Text({text:?})"),
            VNodeKind::Comment(text) => write!(f, "Comment({text:?})"),
            VNodeKind::AsyncPlaceholder(c) => write!(f, "AsyncPlaceholder({:?})", c.name()),
        }
    }
}

/// Everything about a node other than its kind and children.
#[derive(Clone, Default)]
pub struct VNodeData {
    pub key: Option<Key>,
    /// Attributes. `Null` and `false` remove the attribute.
    pub attrs: IndexMap<String, Value>,
    /// Properties set directly on the realized node.
    pub dom_props: IndexMap<String, Value>,
    /// A string, an array of class values, or an object of booleans.
    pub class: Option<Value>,
    pub style: IndexMap<String, String>,
    pub on: IndexMap<String, Handler>,
    /// Props passed to a child component.
    pub props: IndexMap<String, Value>,
    pub ref_name: Option<String>,
    /// Named slot this node is passed into, when it is slot content.
    pub slot: Option<String>,
    pub scoped_slots: IndexMap<String, ScopedSlot>,
}

impl VNodeData {
    /// Build a data bag from a dynamic description such as
    /// `{ "key": 1, "attrs": { "id": "x" }, "class": ["a", { "b": true }] }`.
    ///
    /// A non-primitive `key` is dropped with a warning.
    pub fn from_value(value: &Value) -> Self {
        let mut data = VNodeData::default();
        let Some(object) = value.as_object() else {
            return data;
        };
        for (name, field) in object.entries_untracked() {
            match name.as_str() {
                "key" => match Key::from_value(&field) {
                    Some(key) => data.key = Some(key),
                    None => crate::diagnostics::warn(
                        "avoid using non-primitive value as key, use string/number value instead",
                    ),
                },
                "attrs" => data.attrs = entries(&field).collect(),
                "domProps" | "dom_props" => data.dom_props = entries(&field).collect(),
                "props" => data.props = entries(&field).collect(),
                "class" => data.class = Some(field),
                "style" => {
                    data.style = entries(&field)
                        .map(|(k, v)| (k, v.to_display_string()))
                        .collect()
                }
                "ref" => data.ref_name = field.as_str().map(str::to_string),
                "slot" => data.slot = field.as_str().map(str::to_string),
                _ => {}
            }
        }
        data
    }
}

fn entries(value: &Value) -> impl Iterator<Item = (String, Value)> {
    value
        .as_object()
        .map(|o| o.entries_untracked())
        .unwrap_or_default()
        .into_iter()
}

impl fmt::Debug for VNodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNodeData")
            .field("key", &self.key)
            .field("attrs", &self.attrs)
            .field("dom_props", &self.dom_props)
            .field("class", &self.class)
            .field("style", &self.style)
            .field("on", &self.on.keys().collect::<Vec<_>>())
            .field("props", &self.props)
            .field("ref_name", &self.ref_name)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// A node of a virtual tree.
#[derive(Clone)]
pub struct VNode {
    pub kind: VNodeKind,
    pub key: Option<Key>,
    pub data: VNodeData,
    /// Element children, or slot content for a component node.
    pub children: Vec<VNode>,
    /// Realized node, set by the patcher.
    pub elm: Option<NodeId>,
    /// Mounted instance of a component node, set by the patcher.
    pub component: Option<Arc<dyn MountedComponent>>,
    /// Component whose render produced this node.
    pub context: Option<Weak<dyn RefOwner>>,
    /// Listeners attached to `elm`, carried from patch to patch.
    pub(crate) invokers: IndexMap<String, Invoker>,
}

impl VNode {
    fn with_kind(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            data: VNodeData::default(),
            children: Vec::new(),
            elm: None,
            component: None,
            context: None,
            invokers: IndexMap::new(),
        }
    }

    /// An element node. Chain the builder methods to fill it in.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::with_kind(VNodeKind::Element(tag.into()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_kind(VNodeKind::Text(text.into()))
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::with_kind(VNodeKind::Comment(text.into()))
    }

    /// Placeholder for "nothing rendered here".
    pub fn empty() -> Self {
        Self::comment("")
    }

    pub fn component(factory: Arc<dyn ComponentFactory>) -> Self {
        Self::with_kind(VNodeKind::Component(factory))
    }

    /// Stand-in for `component` until it resolves.
    pub fn async_placeholder(component: AsyncComponent) -> Self {
        Self::with_kind(VNodeKind::AsyncPlaceholder(component))
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        let key = key.into();
        self.data.key = Some(key.clone());
        self.key = Some(key);
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.attrs.insert(name.into(), value.into());
        self
    }

    pub fn dom_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.dom_props.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, class: impl Into<Value>) -> Self {
        self.data.class = Some(class.into());
        self
    }

    pub fn style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.style.insert(name.into(), value.into());
        self
    }

    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.data.on.insert(event.into(), Arc::new(handler));
        self
    }

    /// Pass a prop to a component node.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.props.insert(name.into(), value.into());
        self
    }

    pub fn ref_name(mut self, name: impl Into<String>) -> Self {
        self.data.ref_name = Some(name.into());
        self
    }

    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.data.slot = Some(name.into());
        self
    }

    pub fn child(mut self, child: VNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            VNodeKind::Element(tag) => Some(tag),
            VNodeKind::Component(factory) => Some(factory.name()),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, VNodeKind::Text(_))
    }

    /// Comments and async placeholders.
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, VNodeKind::Comment(_) | VNodeKind::AsyncPlaceholder(_))
    }

    pub fn is_async_placeholder(&self) -> bool {
        matches!(self.kind, VNodeKind::AsyncPlaceholder(_))
    }

    pub fn is_component(&self) -> bool {
        matches!(self.kind, VNodeKind::Component(_))
    }

    /// Text of a text or comment node.
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            VNodeKind::Text(text) | VNodeKind::Comment(text) => Some(text),
            _ => None,
        }
    }

    /// The realized node this vnode maps to. For a component node this is
    /// the component's current root, which may change when it re-renders.
    pub fn root_elm(&self) -> Option<NodeId> {
        match &self.component {
            Some(component) => component.root_elm(),
            None => self.elm,
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("elm", &self.elm)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Input types that are interchangeable for reuse.
const TEXT_INPUT_TYPES: [&str; 7] = ["text", "number", "password", "search", "email", "tel", "url"];

fn same_input_type(a: &VNode, b: &VNode) -> bool {
    if a.tag() != Some("input") {
        return true;
    }
    let input_type = |n: &VNode| n.data.attrs.get("type").map(Value::to_display_string);
    let (ta, tb) = (input_type(a), input_type(b));
    ta == tb
        || (ta.as_deref().is_some_and(|t| TEXT_INPUT_TYPES.contains(&t))
            && tb.as_deref().is_some_and(|t| TEXT_INPUT_TYPES.contains(&t)))
}

/// Whether `b` may be patched into `a`'s realized output in place.
pub fn same_vnode(a: &VNode, b: &VNode) -> bool {
    if a.key != b.key {
        return false;
    }
    let same_kind = match (&a.kind, &b.kind) {
        (VNodeKind::Element(x), VNodeKind::Element(y)) => x == y,
        (VNodeKind::Component(x), VNodeKind::Component(y)) => {
            std::ptr::addr_eq(Arc::as_ptr(x), Arc::as_ptr(y))
        }
        (VNodeKind::Text(_), VNodeKind::Text(_)) => true,
        (VNodeKind::Comment(_), VNodeKind::Comment(_)) => true,
        // Only the same pending load; a failed one re-renders from scratch.
        (VNodeKind::AsyncPlaceholder(x), VNodeKind::AsyncPlaceholder(y)) => {
            x.ptr_eq(y) && !y.has_failed()
        }
        _ => false,
    };
    same_kind && same_input_type(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_must_match() {
        let a = VNode::element("li").key(1);
        assert!(same_vnode(&a, &VNode::element("li").key(1)));
        assert!(!same_vnode(&a, &VNode::element("li").key(2)));
        assert!(!same_vnode(&a, &VNode::element("li")));
        assert!(same_vnode(&VNode::element("li"), &VNode::element("li")));
    }

    #[test]
    fn kinds_must_match() {
        assert!(!same_vnode(&VNode::element("p"), &VNode::element("div")));
        assert!(same_vnode(&VNode::text("a"), &VNode::text("b")));
        assert!(!same_vnode(&VNode::text("a"), &VNode::comment("a")));
    }

    #[test]
    fn placeholders_match_on_the_same_pending_load() {
        crate::config::update(|c| c.silent = true);
        let pending = AsyncComponent::new("lazy", |_| {});
        let other = AsyncComponent::new("lazy", |_| {});
        let a = VNode::async_placeholder(pending.clone());
        assert!(same_vnode(&a, &VNode::async_placeholder(pending.clone())));
        assert!(!same_vnode(&a, &VNode::async_placeholder(other)));
        assert!(!same_vnode(&a, &VNode::empty()));

        let failing = AsyncComponent::new("broken", |resolver| resolver.reject("missing"));
        assert!(failing.resolve(None).is_none());
        let b = VNode::async_placeholder(failing.clone());
        assert!(!same_vnode(&b, &VNode::async_placeholder(failing)));
        crate::config::install(crate::config::Config::default());
    }

    #[test]
    fn text_like_inputs_are_interchangeable() {
        let input = |t: &str| VNode::element("input").attr("type", t);
        assert!(same_vnode(&input("text"), &input("email")));
        assert!(!same_vnode(&input("text"), &input("checkbox")));
        assert!(same_vnode(&input("checkbox"), &input("checkbox")));
    }

    #[test]
    fn data_from_value_reads_known_fields() {
        let value = Value::from_json(serde_json::json!({
            "key": 3,
            "attrs": { "id": "main" },
            "style": { "color": "red" },
            "ref": "root"
        }));
        let data = VNodeData::from_value(&value);
        assert_eq!(data.key, Some(Key::Int(3)));
        assert_eq!(data.attrs.get("id"), Some(&Value::from("main")));
        assert_eq!(data.style.get("color").map(String::as_str), Some("red"));
        assert_eq!(data.ref_name.as_deref(), Some("root"));
    }

    #[test]
    fn keys_keep_their_type() {
        let number = Key::from_value(&Value::from(1.5));
        let string = Key::from_value(&Value::from("1.5"));
        assert_eq!(number, Some(Key::from(1.5)));
        assert_ne!(number, string);
        assert_eq!(number.map(|k| k.to_string()).as_deref(), Some("1.5"));

        assert_eq!(Key::from_value(&Value::from(2.0)), Some(Key::Int(2)));
        assert_eq!(Key::from_value(&Value::Bool(true)), Some(Key::Bool(true)));
        assert_ne!(Key::from(true), Key::from("true"));
        assert_eq!(Key::from_value(&Value::Null), None);
    }

    #[test]
    fn composite_keys_are_dropped() {
        crate::config::update(|c| c.silent = true);
        let value = Value::from_json(serde_json::json!({ "key": { "id": 1 } }));
        assert!(VNodeData::from_value(&value).key.is_none());
        crate::config::install(crate::config::Config::default());
    }
}
