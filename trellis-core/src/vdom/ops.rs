//! Platform backend interface.
//!
//! The patch engine never touches realized output directly. Every mutation
//! goes through a [`NodeOps`] implementation, reached through a shared
//! [`Backend`] handle that is locked once per operation. Child components
//! mount while their parent is being patched, so the lock is never held
//! across anything that could call back into the engine.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::reactive::Value;

/// Opaque handle to a realized node, assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event handler. Receives the event payload.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Stable listener attached to a realized node once. Re-renders swap the
/// handler behind it instead of detaching and re-attaching.
#[derive(Clone)]
pub struct Invoker(Arc<Mutex<Handler>>);

impl Invoker {
    pub fn new(handler: Handler) -> Self {
        Self(Arc::new(Mutex::new(handler)))
    }

    /// Replace the handler.
    pub fn set(&self, handler: Handler) {
        *self.0.lock() = handler;
    }

    /// Call the current handler. The handler runs without the invoker lock.
    pub fn call(&self, payload: &Value) {
        let handler = self.0.lock().clone();
        handler(payload);
    }

    /// Whether both handles are the same attached listener.
    pub fn ptr_eq(&self, other: &Invoker) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invoker")
    }
}

/// Primitive operations on a realized tree.
pub trait NodeOps {
    fn create_element(&mut self, tag: &str) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    fn create_comment(&mut self, text: &str) -> NodeId;

    /// Insert `node` into `parent` before `reference`, or append when
    /// `reference` is `None`. A node that already has a parent is moved.
    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>);
    fn remove_child(&mut self, parent: NodeId, node: NodeId);

    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn set_text_content(&mut self, node: NodeId, text: &str);
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);
    fn remove_attribute(&mut self, node: NodeId, name: &str);
    fn set_property(&mut self, node: NodeId, name: &str, value: &Value);
    /// Set a style property, or clear it with `None`.
    fn set_style(&mut self, node: NodeId, name: &str, value: Option<&str>);
    fn set_class(&mut self, node: NodeId, class: &str);
    fn add_listener(&mut self, node: NodeId, event: &str, invoker: Invoker);
    fn remove_listener(&mut self, node: NodeId, event: &str);
}

/// Shared, lockable handle to a backend.
#[derive(Clone)]
pub struct Backend {
    ops: Arc<Mutex<dyn NodeOps + Send>>,
}

impl Backend {
    pub fn new<T>(ops: T) -> Self
    where
        T: NodeOps + Send + 'static,
    {
        Self {
            ops: Arc::new(Mutex::new(ops)),
        }
    }

    /// Wrap a backend the caller keeps its own typed handle to.
    pub fn from_shared<T>(ops: Arc<Mutex<T>>) -> Self
    where
        T: NodeOps + Send + 'static,
    {
        Self { ops }
    }

    /// Run `f` with the backend locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn NodeOps) -> R) -> R {
        let mut guard = self.ops.lock();
        f(&mut *guard)
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.with(|ops| ops.create_element(tag))
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.with(|ops| ops.create_text(text))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.with(|ops| ops.create_comment(text))
    }

    pub fn insert_before(&self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        self.with(|ops| ops.insert_before(parent, node, reference))
    }

    pub fn remove_child(&self, parent: NodeId, node: NodeId) {
        self.with(|ops| ops.remove_child(parent, node))
    }

    pub fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.with(|ops| ops.parent_node(node))
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.with(|ops| ops.next_sibling(node))
    }

    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.with(|ops| ops.tag_name(node))
    }

    pub fn set_text_content(&self, node: NodeId, text: &str) {
        self.with(|ops| ops.set_text_content(node, text))
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.with(|ops| ops.set_attribute(node, name, value))
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        self.with(|ops| ops.remove_attribute(node, name))
    }

    pub fn set_property(&self, node: NodeId, name: &str, value: &Value) {
        self.with(|ops| ops.set_property(node, name, value))
    }

    pub fn set_style(&self, node: NodeId, name: &str, value: Option<&str>) {
        self.with(|ops| ops.set_style(node, name, value))
    }

    pub fn set_class(&self, node: NodeId, class: &str) {
        self.with(|ops| ops.set_class(node, class))
    }

    pub fn add_listener(&self, node: NodeId, event: &str, invoker: Invoker) {
        self.with(|ops| ops.add_listener(node, event, invoker))
    }

    pub fn remove_listener(&self, node: NodeId, event: &str) {
        self.with(|ops| ops.remove_listener(node, event))
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Backend")
    }
}
