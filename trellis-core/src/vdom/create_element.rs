//! Element creation and child normalization.
//!
//! [`create_element`] is the `h` function render functions call. It accepts
//! loosely shaped input (nested child lists, primitive values, a dynamic data
//! bag) and produces a well-formed [`VNode`]:
//!
//! - children are flattened according to the requested [`Normalization`];
//! - primitives become text nodes;
//! - a function as the first child becomes the `default` scoped slot;
//! - tags registered as components in the render context resolve to
//!   component nodes.
//!
//! Malformed input never fails: it is reported as a development warning and
//! the closest sensible node is produced.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::diagnostics;
use crate::reactive::{traverse, Value};

use super::async_component::AsyncComponent;
use super::vnode::{ComponentFactory, RefOwner, RenderOwner, ScopedSlot, VNode, VNodeData, VNodeKind};

/// How children are flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Children are already flat. Nested lists are skipped with a warning.
    #[default]
    None,
    /// Flatten exactly one level of nesting.
    Simple,
    /// Flatten fully, drop `Null`/boolean children and merge adjacent text.
    Always,
}

/// Render-time environment of [`create_element`].
pub trait ElementContext {
    /// Look up a component registered under `name`.
    fn resolve_component(&self, name: &str) -> Option<Arc<dyn ComponentFactory>>;

    /// Component that owns the nodes being created, for refs.
    fn ref_owner(&self) -> Option<Weak<dyn RefOwner>>;

    /// Look up an async component registered under `name`. Consulted after
    /// [`resolve_component`](Self::resolve_component).
    fn resolve_async_component(&self, _name: &str) -> Option<AsyncComponent> {
        None
    }

    /// Component to re-render when an async component it rendered resolves.
    fn render_owner(&self) -> Option<Weak<dyn RenderOwner>> {
        None
    }
}

/// Context for rendering outside any component.
impl ElementContext for () {
    fn resolve_component(&self, _name: &str) -> Option<Arc<dyn ComponentFactory>> {
        None
    }

    fn ref_owner(&self) -> Option<Weak<dyn RefOwner>> {
        None
    }
}

/// What to create.
#[derive(Clone, Default)]
pub enum Tag {
    /// Nothing: produces an empty node.
    #[default]
    None,
    /// An element name, or the name of a registered component.
    Name(String),
    /// A component given directly.
    Component(Arc<dyn ComponentFactory>),
    /// A lazily loaded component given directly.
    Async(AsyncComponent),
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        if name.is_empty() {
            Tag::None
        } else {
            Tag::Name(name.to_string())
        }
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::from(name.as_str())
    }
}

impl From<Arc<dyn ComponentFactory>> for Tag {
    fn from(factory: Arc<dyn ComponentFactory>) -> Self {
        Tag::Component(factory)
    }
}

impl From<AsyncComponent> for Tag {
    fn from(component: AsyncComponent) -> Self {
        Tag::Async(component)
    }
}

impl<T: Into<Tag>> From<Option<T>> for Tag {
    fn from(tag: Option<T>) -> Self {
        tag.map(Into::into).unwrap_or_default()
    }
}

/// A node's data bag.
#[derive(Default)]
pub enum ElementData {
    #[default]
    None,
    Data(VNodeData),
    /// A dynamic description, converted with [`VNodeData::from_value`].
    Dynamic(Value),
}

impl From<VNodeData> for ElementData {
    fn from(data: VNodeData) -> Self {
        ElementData::Data(data)
    }
}

impl From<Value> for ElementData {
    fn from(value: Value) -> Self {
        ElementData::Dynamic(value)
    }
}

impl From<()> for ElementData {
    fn from(_: ()) -> Self {
        ElementData::None
    }
}

/// One entry of a children list passed to `create_element`.
#[derive(Clone)]
pub enum Child {
    Node(VNode),
    /// A primitive, rendered as text.
    Value(Value),
    List(Vec<Child>),
    /// Parameterized content; only meaningful as the first child.
    Slot(ScopedSlot),
}

impl From<VNode> for Child {
    fn from(node: VNode) -> Self {
        Child::Node(node)
    }
}

impl From<Value> for Child {
    fn from(value: Value) -> Self {
        Child::Value(value)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Value(Value::from(text))
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Value(Value::from(text))
    }
}

impl From<Vec<VNode>> for Child {
    fn from(nodes: Vec<VNode>) -> Self {
        Child::List(nodes.into_iter().map(Child::Node).collect())
    }
}

impl From<Vec<Child>> for Child {
    fn from(children: Vec<Child>) -> Self {
        Child::List(children)
    }
}

/// Create a node.
pub fn create_element(
    ctx: &dyn ElementContext,
    tag: impl Into<Tag>,
    data: impl Into<ElementData>,
    children: Vec<Child>,
    normalization: Normalization,
) -> VNode {
    let mut data = match data.into() {
        ElementData::None => VNodeData::default(),
        ElementData::Data(data) => data,
        ElementData::Dynamic(value) => {
            if value.observer().is_some() {
                diagnostics::warn(
                    "avoid using observed data object as vnode data; always create fresh vnode data objects in each render",
                );
                return VNode::empty();
            }
            VNodeData::from_value(&value)
        }
    };

    let kind = match tag.into() {
        Tag::None => return VNode::empty(),
        Tag::Name(name) => match ctx.resolve_component(&name) {
            Some(factory) => VNodeKind::Component(factory),
            None => match ctx.resolve_async_component(&name) {
                Some(component) => async_kind(ctx, component),
                None => VNodeKind::Element(name),
            },
        },
        Tag::Component(factory) => VNodeKind::Component(factory),
        Tag::Async(component) => async_kind(ctx, component),
    };

    let mut children = children;
    if let Some(Child::Slot(slot)) = children.first() {
        data.scoped_slots.insert("default".to_string(), slot.clone());
        children.clear();
    }

    let children = match normalization {
        Normalization::None => flat_children(children),
        Normalization::Simple => simple_normalize_children(children),
        Normalization::Always => normalize_children(children),
    };

    // Class and style objects may be read deeply by the modules; make the
    // render depend on all of it.
    if let Some(class) = &data.class {
        if class.is_composite() {
            traverse(class);
        }
    }

    VNode {
        kind,
        key: data.key.clone(),
        data,
        children,
        elm: None,
        component: None,
        context: ctx.ref_owner(),
        invokers: IndexMap::new(),
    }
}

/// The resolved component, or a placeholder while it loads.
fn async_kind(ctx: &dyn ElementContext, component: AsyncComponent) -> VNodeKind {
    match component.resolve(ctx.render_owner()) {
        Some(factory) => VNodeKind::Component(factory),
        None => VNodeKind::AsyncPlaceholder(component),
    }
}

fn primitive_node(value: Value) -> Option<VNode> {
    match value {
        Value::Null | Value::Bool(_) => None,
        Value::Object(_) | Value::Array(_) => {
            diagnostics::warn("composite values cannot be rendered as children; skipped");
            None
        }
        primitive => Some(VNode::text(primitive.to_display_string())),
    }
}

fn flat_children(children: Vec<Child>) -> Vec<VNode> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Child::Node(node) => out.push(node),
            Child::Value(value) => out.extend(primitive_node(value)),
            Child::List(_) => diagnostics::warn("nested child list without normalization; skipped"),
            Child::Slot(_) => diagnostics::warn("scoped slot function is only allowed as the first child"),
        }
    }
    out
}

/// Flatten one level of nesting.
pub fn simple_normalize_children(children: Vec<Child>) -> Vec<VNode> {
    let mut spliced = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Child::List(inner) => spliced.extend(inner),
            other => spliced.push(other),
        }
    }
    flat_children(spliced)
}

/// Flatten fully, dropping empty children and merging adjacent text.
pub fn normalize_children(children: Vec<Child>) -> Vec<VNode> {
    let mut out = Vec::new();
    normalize_into(children, &mut out);
    out
}

fn normalize_into(children: Vec<Child>, out: &mut Vec<VNode>) {
    for child in children {
        match child {
            Child::List(inner) => normalize_into(inner, out),
            Child::Value(value) => {
                if let Some(node) = primitive_node(value) {
                    push_merging_text(out, node);
                }
            }
            Child::Node(node) => push_merging_text(out, node),
            Child::Slot(_) => {
                diagnostics::warn("scoped slot function is only allowed as the first child")
            }
        }
    }
}

fn push_merging_text(out: &mut Vec<VNode>, node: VNode) {
    if let (Some(last), VNodeKind::Text(text)) = (out.last_mut(), &node.kind) {
        if let VNodeKind::Text(prev) = &mut last.kind {
            if last.elm.is_none() && node.key.is_none() && last.key.is_none() {
                prev.push_str(text);
                return;
            }
        }
    }
    out.push(node);
}
