//! Patch Engine
//!
//! The patcher reconciles a freshly rendered virtual tree with the previous
//! one and applies the difference to the realized tree through the backend.
//!
//! # How Patching Works
//!
//! 1. Nodes that are the "same" (see [`same_vnode`]) are patched in place:
//!    the new node inherits the realized node, modules update what changed
//!    in the data bag, and children are reconciled recursively.
//!
//! 2. Anything else is replaced: the new subtree is realized next to the old
//!    one, then the old one is removed and destroyed.
//!
//! 3. Children are reconciled with a four-pointer walk over the old and new
//!    lists (heads and tails of both). Matching heads, matching tails and
//!    the two crossed cases cover append, prepend, removal and reversal in
//!    linear time; anything else falls back to a key lookup table.
//!
//! # Child Components
//!
//! Component nodes are instantiated through their [`ComponentFactory`] while
//! the parent is being patched. Their `inserted` notification is deferred
//! until the outermost patch completes, so it fires once the whole tree is
//! in place, deepest components first.
//!
//! [`ComponentFactory`]: super::ComponentFactory

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::diagnostics;
use crate::reactive::ReactiveContext;

use super::modules::{default_modules, Module};
use super::ops::{Backend, NodeId};
use super::vnode::{same_vnode, ComponentFactory, Key, MountedComponent, VNode, VNodeKind};

thread_local! {
    static PATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static INSERTED: RefCell<Vec<Arc<dyn MountedComponent>>> = const { RefCell::new(Vec::new()) };
}

/// The previous state a patch starts from.
#[derive(Debug)]
pub enum OldTree {
    /// The tree produced by the previous render.
    VNode(VNode),
    /// A realized node not produced by a render, e.g. a mount target. It is
    /// replaced by the new tree.
    Realized(NodeId),
}

/// Reconciles virtual trees against a backend.
#[derive(Clone)]
pub struct Patcher {
    backend: Backend,
    modules: Vec<Arc<dyn Module>>,
}

impl Patcher {
    /// A patcher with the standard modules.
    pub fn new(backend: Backend) -> Self {
        Self::with_modules(backend, default_modules())
    }

    /// A patcher running only `modules`, in order.
    pub fn with_modules(backend: Backend, modules: Vec<Arc<dyn Module>>) -> Self {
        Self { backend, modules }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Patch `old` into `new` and return the realized root of `new`.
    ///
    /// - no `new`: `old` is destroyed (its realized nodes are left in place);
    /// - no `old`: `new` is realized detached from any parent;
    /// - same node: patched in place;
    /// - otherwise `new` replaces `old` in `old`'s parent.
    ///
    /// Hydration is not supported: a `hydrating` patch against a realized
    /// node warns and renders from scratch. `remove_only` suppresses moves
    /// during child reconciliation.
    pub fn patch(
        &self,
        old: Option<OldTree>,
        new: Option<&mut VNode>,
        hydrating: bool,
        remove_only: bool,
    ) -> Option<NodeId> {
        let outermost = PATCH_DEPTH.with(|depth| {
            let current = depth.get();
            depth.set(current + 1);
            current == 0
        });

        let root = self.patch_root(old, new, hydrating, remove_only);

        PATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        if outermost {
            let inserted = INSERTED.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
            for component in inserted {
                component.inserted();
            }
        }
        root
    }

    fn patch_root(
        &self,
        old: Option<OldTree>,
        new: Option<&mut VNode>,
        hydrating: bool,
        remove_only: bool,
    ) -> Option<NodeId> {
        let Some(new) = new else {
            if let Some(OldTree::VNode(old)) = old {
                self.invoke_destroy_hook(&old);
            }
            return None;
        };

        match old {
            None => self.create_elm(new, None, None),
            Some(OldTree::VNode(old)) if same_vnode(&old, new) => {
                self.patch_vnode(old, new, remove_only)
            }
            Some(old) => {
                let old = match old {
                    OldTree::VNode(old) => old,
                    OldTree::Realized(elm) => {
                        if hydrating {
                            diagnostics::warn(
                                "hydration is not supported; performing a full client-side render",
                            );
                        }
                        self.empty_node_at(elm)
                    }
                };
                let old_elm = old.root_elm();
                let parent = old_elm.and_then(|elm| self.backend.parent_node(elm));
                let reference = old_elm.and_then(|elm| self.backend.next_sibling(elm));

                self.create_elm(new, parent, reference);

                if parent.is_some() {
                    self.remove_vnodes(vec![old]);
                } else {
                    self.invoke_destroy_hook(&old);
                }
            }
        }
        new.root_elm()
    }

    fn empty_node_at(&self, elm: NodeId) -> VNode {
        let tag = self.backend.tag_name(elm).unwrap_or_default();
        let mut node = VNode::element(tag.to_lowercase());
        node.elm = Some(elm);
        node
    }

    // ---- Creation ----

    fn create_elm(&self, vnode: &mut VNode, parent: Option<NodeId>, reference: Option<NodeId>) {
        let elm = match &vnode.kind {
            VNodeKind::Component(factory) => {
                let factory = factory.clone();
                self.create_component(factory, vnode, parent, reference);
                return;
            }
            VNodeKind::Element(tag) => self.backend.create_element(tag),
            VNodeKind::Text(text) => self.backend.create_text(text),
            VNodeKind::Comment(text) => self.backend.create_comment(text),
            VNodeKind::AsyncPlaceholder(_) => self.backend.create_comment(""),
        };
        vnode.elm = Some(elm);

        if matches!(vnode.kind, VNodeKind::Element(_)) {
            self.create_children(&mut vnode.children, elm);
            self.invoke_create_hooks(vnode);
        }
        self.insert(parent, elm, reference);
    }

    fn create_children(&self, children: &mut [VNode], parent: NodeId) {
        check_duplicate_keys(children);
        for child in children {
            self.create_elm(child, Some(parent), None);
        }
    }

    fn create_component(
        &self,
        factory: Arc<dyn ComponentFactory>,
        vnode: &mut VNode,
        parent: Option<NodeId>,
        reference: Option<NodeId>,
    ) {
        // The child sets itself up with its own watchers; none of its reads
        // belong to the render that is patching it in.
        let instance = {
            let _untracked = ReactiveContext::untracked();
            factory.instantiate(vnode, &self.backend)
        };

        match instance {
            Ok(instance) => {
                vnode.component = Some(instance.clone());
                vnode.elm = instance.root_elm();
                if let Some(elm) = vnode.elm {
                    self.invoke_create_hooks(vnode);
                    self.insert(parent, elm, reference);
                }
                INSERTED.with(|queue| queue.borrow_mut().push(instance));
            }
            Err(err) => {
                diagnostics::handle_error(&err, &format!("creating component <{}>", factory.name()));
                let elm = self.backend.create_comment("");
                vnode.elm = Some(elm);
                self.insert(parent, elm, reference);
            }
        }
    }

    fn invoke_create_hooks(&self, vnode: &mut VNode) {
        let component = vnode.is_component();
        for module in &self.modules {
            if !component || module.applies_to_components() {
                module.create(&self.backend, vnode);
            }
        }
    }

    fn insert(&self, parent: Option<NodeId>, elm: NodeId, reference: Option<NodeId>) {
        let Some(parent) = parent else { return };
        let reference = reference.filter(|r| self.backend.parent_node(*r) == Some(parent));
        self.backend.insert_before(parent, elm, reference);
    }

    fn add_vnodes(&self, parent: NodeId, reference: Option<NodeId>, vnodes: &mut [VNode]) {
        for vnode in vnodes {
            self.create_elm(vnode, Some(parent), reference);
        }
    }

    // ---- Removal ----

    fn remove_vnodes(&self, vnodes: impl IntoIterator<Item = VNode>) {
        for vnode in vnodes {
            if let Some(elm) = vnode.root_elm() {
                if let Some(parent) = self.backend.parent_node(elm) {
                    self.backend.remove_child(parent, elm);
                }
            }
            if !vnode.is_text() && !vnode.is_comment() {
                self.invoke_destroy_hook(&vnode);
            }
        }
    }

    fn invoke_destroy_hook(&self, vnode: &VNode) {
        // Modules run first: a destroyed component no longer reports a root.
        let is_component = vnode.is_component();
        for module in &self.modules {
            if !is_component || module.applies_to_components() {
                module.destroy(&self.backend, vnode);
            }
        }
        if let Some(component) = &vnode.component {
            component.destroy();
        }
        if !is_component {
            for child in &vnode.children {
                self.invoke_destroy_hook(child);
            }
        }
    }

    // ---- Patching ----

    fn patch_vnode(&self, old: VNode, new: &mut VNode, remove_only: bool) {
        new.elm = old.elm;
        if old.is_async_placeholder() {
            return;
        }

        if new.is_component() {
            new.component = old.component.clone();
            if let Some(component) = new.component.clone() {
                component.prepatch(new);
            }
        }

        let Some(elm) = new.elm else { return };

        let is_component = new.is_component();
        for module in &self.modules {
            if !is_component || module.applies_to_components() {
                module.update(&self.backend, &old, new);
            }
        }

        match &new.kind {
            VNodeKind::Text(text) | VNodeKind::Comment(text) => {
                if old.text_content() != Some(text.as_str()) {
                    self.backend.set_text_content(elm, text);
                }
            }
            VNodeKind::Element(_) => {
                let old_children = old.children;
                match (old_children.is_empty(), new.children.is_empty()) {
                    (false, false) => {
                        self.update_children(elm, old_children, &mut new.children, remove_only)
                    }
                    (true, false) => {
                        check_duplicate_keys(&new.children);
                        self.add_vnodes(elm, None, &mut new.children);
                    }
                    (false, true) => self.remove_vnodes(old_children),
                    (true, true) => {}
                }
            }
            VNodeKind::Component(_) | VNodeKind::AsyncPlaceholder(_) => {}
        }
    }

    /// Four-pointer reconciliation of a child list.
    fn update_children(
        &self,
        parent: NodeId,
        old_children: Vec<VNode>,
        new_children: &mut [VNode],
        remove_only: bool,
    ) {
        let can_move = !remove_only;
        check_duplicate_keys(new_children);

        // Slots are emptied as old nodes get matched out of order.
        let mut old: Vec<Option<VNode>> = old_children.into_iter().map(Some).collect();
        let (mut old_start, mut old_end) = (0, old.len());
        let (mut new_start, mut new_end) = (0, new_children.len());
        let mut key_to_old: Option<HashMap<Key, usize>> = None;

        let elm_at = |old: &[Option<VNode>], i: usize| old[i].as_ref().and_then(VNode::root_elm);
        let same_at = |old: &[Option<VNode>], i: usize, node: &VNode| {
            old[i].as_ref().is_some_and(|o| same_vnode(o, node))
        };

        while old_start < old_end && new_start < new_end {
            if old[old_start].is_none() {
                old_start += 1;
            } else if old[old_end - 1].is_none() {
                old_end -= 1;
            } else if same_at(&old, old_start, &new_children[new_start]) {
                if let Some(node) = old[old_start].take() {
                    self.patch_vnode(node, &mut new_children[new_start], remove_only);
                }
                old_start += 1;
                new_start += 1;
            } else if same_at(&old, old_end - 1, &new_children[new_end - 1]) {
                if let Some(node) = old[old_end - 1].take() {
                    self.patch_vnode(node, &mut new_children[new_end - 1], remove_only);
                }
                old_end -= 1;
                new_end -= 1;
            } else if same_at(&old, old_start, &new_children[new_end - 1]) {
                // Moved right: after the current old tail.
                let anchor = elm_at(&old, old_end - 1).and_then(|e| self.backend.next_sibling(e));
                if let Some(node) = old[old_start].take() {
                    self.patch_vnode(node, &mut new_children[new_end - 1], remove_only);
                }
                if can_move {
                    self.move_before(parent, &new_children[new_end - 1], anchor);
                }
                old_start += 1;
                new_end -= 1;
            } else if same_at(&old, old_end - 1, &new_children[new_start]) {
                // Moved left: before the current old head.
                let anchor = elm_at(&old, old_start);
                if let Some(node) = old[old_end - 1].take() {
                    self.patch_vnode(node, &mut new_children[new_start], remove_only);
                }
                if can_move {
                    self.move_before(parent, &new_children[new_start], anchor);
                }
                old_end -= 1;
                new_start += 1;
            } else {
                let key_map = key_to_old
                    .get_or_insert_with(|| create_key_to_old_idx(&old, old_start, old_end));
                let node = &new_children[new_start];
                let idx_in_old = match &node.key {
                    Some(key) => key_map.get(key).copied(),
                    None => find_idx_in_old(node, &old, old_start, old_end),
                };
                let anchor = elm_at(&old, old_start);

                match idx_in_old {
                    Some(i) if same_at(&old, i, node) => {
                        if let Some(to_move) = old[i].take() {
                            self.patch_vnode(to_move, &mut new_children[new_start], remove_only);
                        }
                        if can_move {
                            self.move_before(parent, &new_children[new_start], anchor);
                        }
                    }
                    // New node, or same key with a different identity.
                    _ => self.create_elm(&mut new_children[new_start], Some(parent), anchor),
                }
                new_start += 1;
            }
        }

        if old_start >= old_end {
            let reference = new_children.get(new_end).and_then(VNode::root_elm);
            self.add_vnodes(parent, reference, &mut new_children[new_start..new_end]);
        } else if new_start >= new_end {
            let leftovers: Vec<VNode> = old[old_start..old_end]
                .iter_mut()
                .filter_map(Option::take)
                .collect();
            self.remove_vnodes(leftovers);
        }
    }

    fn move_before(&self, parent: NodeId, node: &VNode, anchor: Option<NodeId>) {
        if let Some(elm) = node.root_elm() {
            self.backend.insert_before(parent, elm, anchor);
        }
    }
}

fn create_key_to_old_idx(old: &[Option<VNode>], start: usize, end: usize) -> HashMap<Key, usize> {
    let mut map = HashMap::new();
    for (i, node) in old.iter().enumerate().take(end).skip(start) {
        if let Some(key) = node.as_ref().and_then(|n| n.key.clone()) {
            map.entry(key).or_insert(i);
        }
    }
    map
}

fn find_idx_in_old(node: &VNode, old: &[Option<VNode>], start: usize, end: usize) -> Option<usize> {
    (start..end).find(|&i| old[i].as_ref().is_some_and(|o| same_vnode(node, o)))
}

fn check_duplicate_keys(children: &[VNode]) {
    let mut seen = HashSet::new();
    for child in children {
        if let Some(key) = &child.key {
            if !seen.insert(key) {
                diagnostics::warn(format!(
                    "duplicate keys detected: '{key}'. This may cause an update error."
                ));
            }
        }
    }
}
