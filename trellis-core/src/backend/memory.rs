//! In-memory backend.
//!
//! Keeps realized nodes in an arena indexed by [`NodeId`] and records every
//! mutating operation in an [`Op`] log. Used by the test suites and by hosts
//! that want to ship the operation stream elsewhere: the log serializes to
//! JSON or MessagePack.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reactive::Value;
use crate::vdom::{Backend, Invoker, NodeId, NodeOps};

/// One mutating backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    CreateComment { node: NodeId, text: String },
    /// A detached node was attached.
    Insert { parent: NodeId, node: NodeId, before: Option<NodeId> },
    /// An attached node was re-positioned.
    Move { parent: NodeId, node: NodeId, before: Option<NodeId> },
    Remove { parent: NodeId, node: NodeId },
    SetText { node: NodeId, text: String },
    SetAttr { node: NodeId, name: String, value: String },
    RemoveAttr { node: NodeId, name: String },
    SetProp { node: NodeId, name: String, value: String },
    SetStyle { node: NodeId, name: String, value: Option<String> },
    SetClass { node: NodeId, class: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element(String),
    Text,
    Comment,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    text: String,
    attrs: IndexMap<String, String>,
    props: IndexMap<String, Value>,
    style: IndexMap<String, String>,
    class: String,
    listeners: IndexMap<String, Invoker>,
}

impl Node {
    fn new(kind: NodeKind, text: &str) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            text: text.to_string(),
            attrs: IndexMap::new(),
            props: IndexMap::new(),
            style: IndexMap::new(),
            class: String::new(),
            listeners: IndexMap::new(),
        }
    }
}

/// Arena-backed realized tree with an operation log.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: IndexMap<NodeId, Node>,
    next_id: u64,
    ops: Vec<Op>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend plus the [`Backend`] handle the patcher uses, sharing one
    /// lock so the caller can inspect the tree between patches.
    pub fn shared() -> (Arc<Mutex<MemoryBackend>>, Backend) {
        let memory = Arc::new(Mutex::new(MemoryBackend::new()));
        let backend = Backend::from_shared(memory.clone());
        (memory, backend)
    }

    /// Number of operations recorded since the last [`take_ops`](Self::take_ops).
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Operations recorded since the last [`take_ops`](Self::take_ops).
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<Op> {
        std::mem::take(&mut self.ops)
    }

    /// The pending log as MessagePack.
    pub fn encode_log(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(&self.ops)?)
    }

    /// The pending log as JSON.
    pub fn log_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.ops)?)
    }

    /// Number of live nodes. Removed subtrees are not counted.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.text.as_str())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(&node)?.attrs.get(name).map(String::as_str)
    }

    pub fn property(&self, node: NodeId, name: &str) -> Option<&Value> {
        self.nodes.get(&node)?.props.get(name)
    }

    /// The invoker attached for `event`, if any.
    pub fn listener(&self, node: NodeId, event: &str) -> Option<Invoker> {
        self.nodes.get(&node)?.listeners.get(event).cloned()
    }

    /// Deliver `payload` to the `event` listener of `node`. The handler runs
    /// after the backend lock is released, so it may mutate state that
    /// patches this very backend. Returns whether a listener was found.
    pub fn dispatch(shared: &Arc<Mutex<MemoryBackend>>, node: NodeId, event: &str, payload: &Value) -> bool {
        let invoker = shared.lock().listener(node, event);
        match invoker {
            Some(invoker) => {
                invoker.call(payload);
                true
            }
            None => false,
        }
    }

    /// Markup rendering of the subtree rooted at `node`.
    pub fn serialize(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else { return };
        match &node.kind {
            NodeKind::Text => out.push_str(&escape(&node.text)),
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(&node.text);
                out.push_str("-->");
            }
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.attrs {
                    out.push_str(&format!(" {name}=\"{}\"", escape(value)));
                }
                if !node.class.is_empty() {
                    out.push_str(&format!(" class=\"{}\"", escape(&node.class)));
                }
                if !node.style.is_empty() {
                    let style: Vec<String> =
                        node.style.iter().map(|(k, v)| format!("{k}: {v};")).collect();
                    out.push_str(&format!(" style=\"{}\"", escape(&style.join(" "))));
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.next_id += 1;
        let id = NodeId::new(self.next_id);
        self.nodes.insert(id, node);
        id
    }

    /// Drop `node` and its descendants from the arena. Listeners go with
    /// them.
    fn release(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.shift_remove(&id) {
                stack.extend(n.children);
            }
        }
    }

    fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&node)?.parent.take()?;
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != node);
        }
        Some(parent)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl NodeOps for MemoryBackend {
    fn create_element(&mut self, tag: &str) -> NodeId {
        let node = self.alloc(Node::new(NodeKind::Element(tag.to_string()), ""));
        self.ops.push(Op::CreateElement { node, tag: tag.to_string() });
        node
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        let node = self.alloc(Node::new(NodeKind::Text, text));
        self.ops.push(Op::CreateText { node, text: text.to_string() });
        node
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        let node = self.alloc(Node::new(NodeKind::Comment, text));
        self.ops.push(Op::CreateComment { node, text: text.to_string() });
        node
    }

    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        if reference == Some(node) || !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&node) {
            return;
        }
        let moved = self.detach(node).is_some();

        let Some(p) = self.nodes.get_mut(&parent) else { return };
        let at = reference
            .and_then(|r| p.children.iter().position(|c| *c == r))
            .unwrap_or(p.children.len());
        p.children.insert(at, node);
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(parent);
        }

        self.ops.push(if moved {
            Op::Move { parent, node, before: reference }
        } else {
            Op::Insert { parent, node, before: reference }
        });
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) {
        if self.nodes.get(&node).and_then(|n| n.parent) != Some(parent) {
            return;
        }
        self.detach(node);
        self.release(node);
        self.ops.push(Op::Remove { parent, node });
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node)?.parent
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(&self.nodes.get(&node)?.parent?)?;
        let at = parent.children.iter().position(|c| *c == node)?;
        parent.children.get(at + 1).copied()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Element(tag) => Some(tag.to_uppercase()),
            _ => None,
        }
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) {
        let is_element = match self.nodes.get(&node) {
            Some(n) => matches!(n.kind, NodeKind::Element(_)),
            None => return,
        };
        if is_element {
            for child in self.children(node) {
                self.detach(child);
                self.release(child);
            }
            let child = self.alloc(Node::new(NodeKind::Text, text));
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parent = Some(node);
            }
            if let Some(n) = self.nodes.get_mut(&node) {
                n.children.push(child);
            }
        } else if let Some(n) = self.nodes.get_mut(&node) {
            n.text = text.to_string();
        }
        self.ops.push(Op::SetText { node, text: text.to_string() });
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.attrs.insert(name.to_string(), value.to_string());
            self.ops.push(Op::SetAttr { node, name: name.to_string(), value: value.to_string() });
        }
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.attrs.shift_remove(name);
            self.ops.push(Op::RemoveAttr { node, name: name.to_string() });
        }
    }

    fn set_property(&mut self, node: NodeId, name: &str, value: &Value) {
        if let Some(n) = self.nodes.get_mut(&node) {
            if value.is_null() {
                n.props.shift_remove(name);
            } else {
                n.props.insert(name.to_string(), value.clone());
            }
            self.ops.push(Op::SetProp {
                node,
                name: name.to_string(),
                value: value.to_display_string(),
            });
        }
    }

    fn set_style(&mut self, node: NodeId, name: &str, value: Option<&str>) {
        if let Some(n) = self.nodes.get_mut(&node) {
            match value {
                Some(v) => {
                    n.style.insert(name.to_string(), v.to_string());
                }
                None => {
                    n.style.shift_remove(name);
                }
            }
            self.ops.push(Op::SetStyle {
                node,
                name: name.to_string(),
                value: value.map(str::to_string),
            });
        }
    }

    fn set_class(&mut self, node: NodeId, class: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.class = class.to_string();
            self.ops.push(Op::SetClass { node, class: class.to_string() });
        }
    }

    fn add_listener(&mut self, node: NodeId, event: &str, invoker: Invoker) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.listeners.insert(event.to_string(), invoker);
            self.ops.push(Op::AddListener { node, event: event.to_string() });
        }
    }

    fn remove_listener(&mut self, node: NodeId, event: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.listeners.shift_remove(event);
            self.ops.push(Op::RemoveListener { node, event: event.to_string() });
        }
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn inserting_an_attached_node_is_a_move() {
        let mut mem = MemoryBackend::new();
        let root = mem.create_element("ul");
        let a = mem.create_element("li");
        let b = mem.create_element("li");
        mem.insert_before(root, a, None);
        mem.insert_before(root, b, None);
        mem.take_ops();

        mem.insert_before(root, b, Some(a));
        assert_eq!(mem.children(root), vec![b, a]);
        assert_eq!(
            mem.take_ops(),
            vec![Op::Move { parent: root, node: b, before: Some(a) }]
        );
        assert_eq!(mem.next_sibling(b), Some(a));
        assert_eq!(mem.next_sibling(a), None);
    }

    #[test]
    fn removal_detaches() {
        let mut mem = MemoryBackend::new();
        let root = mem.create_element("div");
        let text = mem.create_text("x");
        mem.insert_before(root, text, None);
        mem.remove_child(root, text);
        assert_eq!(mem.parent_node(text), None);
        assert_eq!(mem.serialize(root), "<div></div>");
    }

    #[test]
    fn removal_frees_the_subtree() {
        let mut mem = MemoryBackend::new();
        let root = mem.create_element("div");
        let list = mem.create_element("ul");
        let item = mem.create_element("li");
        let label = mem.create_text("a");
        mem.insert_before(item, label, None);
        mem.insert_before(list, item, None);
        mem.insert_before(root, list, None);
        mem.add_listener(item, "click", Invoker::new(Arc::new(|_: &Value| {})));
        assert_eq!(mem.node_count(), 4);

        mem.remove_child(root, list);
        assert_eq!(mem.node_count(), 1);
        assert!(mem.listener(item, "click").is_none());
        assert_eq!(
            mem.take_ops().last(),
            Some(&Op::Remove { parent: root, node: list })
        );
    }

    #[test]
    fn replacing_text_content_frees_old_children() {
        let mut mem = MemoryBackend::new();
        let root = mem.create_element("p");
        for _ in 0..3 {
            let span = mem.create_element("span");
            mem.insert_before(root, span, None);
        }
        mem.set_text_content(root, "one");
        mem.set_text_content(root, "two");
        assert_eq!(mem.node_count(), 2);
        assert_eq!(mem.serialize(root), "<p>two</p>");
    }

    #[test]
    fn serializes_attributes_class_and_style() {
        let mut mem = MemoryBackend::new();
        let root = mem.create_element("p");
        mem.set_attribute(root, "title", "a\"b");
        mem.set_class(root, "big red");
        mem.set_style(root, "color", Some("red"));
        let text = mem.create_text("1 < 2");
        mem.insert_before(root, text, None);
        assert_eq!(
            mem.serialize(root),
            r#"<p title="a&quot;b" class="big red" style="color: red;">1 &lt; 2</p>"#
        );
    }

    #[test]
    fn dispatch_runs_without_the_lock() {
        let (memory, backend) = MemoryBackend::shared();
        let button = backend.create_element("button");
        let hits = Arc::new(AtomicI32::new(0));

        let inner = memory.clone();
        let h = hits.clone();
        backend.add_listener(
            button,
            "click",
            Invoker::new(Arc::new(move |_: &Value| {
                // Re-entering the backend must not deadlock.
                inner.lock().set_class(button, "clicked");
                h.fetch_add(1, Ordering::SeqCst);
            })),
        );

        assert!(MemoryBackend::dispatch(&memory, button, "click", &Value::Null));
        assert!(!MemoryBackend::dispatch(&memory, button, "keyup", &Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn log_encodes() {
        let mut mem = MemoryBackend::new();
        let node = mem.create_element("div");
        mem.set_attribute(node, "id", "app");

        let json = mem.log_json().unwrap();
        assert!(json.contains(r#""op":"set_attr""#));

        let bytes = mem.encode_log().unwrap();
        let decoded: Vec<Op> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, mem.ops());
    }
}
