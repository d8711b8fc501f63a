//! Component Instances
//!
//! A component ties reactive state to a piece of realized output. It owns:
//!
//! - a props object, written by the parent on every re-render;
//! - an observed root data object;
//! - one lazy watcher per computed property;
//! - the user watches declared on its definition or added later;
//! - a render watcher whose evaluation renders and patches.
//!
//! # How Updates Work
//!
//! The render watcher's getter calls the render function and patches the
//! previous tree with the result. Every field the render function reads is
//! tracked, so any later write to one of them queues the render watcher and
//! the next scheduler flush re-renders exactly once, however many writes
//! happened.
//!
//! Child components are created by the patch engine when it meets a
//! component node. They receive props and slot content from that node, and
//! are destroyed when the node is.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::diagnostics;
use crate::error::{Error, Result};
use crate::reactive::{
    self, define_reactive, observe, parse_path, resolve_path, Callback, Getter, Hook, Object,
    ReactiveContext, Value, WatchHandle, WatchOptions, WatchSource, Watcher, WatcherOptions,
};
use crate::vdom::{
    create_element, AsyncComponent, Backend, Child, ComponentFactory, ElementContext, ElementData,
    Handler, MountedComponent, NodeId, Normalization, OldTree, Patcher, RefOwner, RenderOwner,
    ScopedSlot, Tag, VNode,
};

use super::def::{ComponentDef, Lifecycle, WatchHandler, WatchTarget};

#[derive(Default)]
struct ComponentState {
    /// Tree produced by the last render.
    vnode: Option<VNode>,
    /// Realized node the first render replaces.
    target: Option<NodeId>,
    render_watcher: Option<Watcher>,
    watchers: Vec<Watcher>,
    refs: IndexMap<String, NodeId>,
    slots: IndexMap<String, Vec<VNode>>,
    scoped_slots: IndexMap<String, ScopedSlot>,
    listeners: IndexMap<String, Handler>,
    mounted: bool,
    being_destroyed: bool,
    destroyed: bool,
}

struct ComponentInner {
    id: u64,
    def: Arc<ComponentDef>,
    patcher: Patcher,
    props: Object,
    data: Value,
    computed: OnceLock<IndexMap<String, Watcher>>,
    state: Mutex<ComponentState>,
}

/// A live component instance. Cloning yields another handle to it.
#[derive(Clone)]
pub struct Component(Arc<ComponentInner>);

impl Component {
    /// Mount a root instance of `def`. The first render replaces `target`
    /// when given; otherwise the output stays detached (see
    /// [`root_elm`](Self::root_elm)).
    pub fn mount(
        def: Arc<ComponentDef>,
        backend: Backend,
        target: Option<NodeId>,
        props: IndexMap<String, Value>,
    ) -> Result<Component> {
        let component = Self::create(def, backend, &props, target)?;
        component.call_hook(Lifecycle::BeforeMount);
        component.start_render()?;
        component.0.state.lock().mounted = true;
        component.call_hook(Lifecycle::Mounted);
        tracing::debug!(id = component.0.id, name = %component.0.def.name, "component mounted");
        Ok(component)
    }

    /// Instance for a component node met by the patch engine. `mounted`
    /// runs later, once the outermost patch has inserted it.
    pub(crate) fn create_child(
        def: Arc<ComponentDef>,
        backend: Backend,
        placeholder: &VNode,
    ) -> Result<Component> {
        let component = Self::create(def, backend, &placeholder.data.props, None)?;
        component.take_placeholder(placeholder);
        component.call_hook(Lifecycle::BeforeMount);
        component.start_render()?;
        tracing::debug!(id = component.0.id, name = %component.0.def.name, "child component created");
        Ok(component)
    }

    fn create(
        def: Arc<ComponentDef>,
        backend: Backend,
        passed: &IndexMap<String, Value>,
        target: Option<NodeId>,
    ) -> Result<Component> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        let _untracked = ReactiveContext::untracked();

        let props = Object::new();
        for (name, default) in &def.props {
            let value = passed.get(name).cloned().unwrap_or_else(|| default.clone());
            define_reactive(&props, name, value);
        }

        let data = init_data(&def, &props);

        let component = Component(Arc::new(ComponentInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            def,
            patcher: Patcher::new(backend),
            props,
            data,
            computed: OnceLock::new(),
            state: Mutex::new(ComponentState {
                target,
                ..Default::default()
            }),
        }));
        component.init_computed()?;
        component.init_watch()?;
        Ok(component)
    }

    fn init_computed(&self) -> Result<()> {
        let weak = Arc::downgrade(&self.0);
        let mut computed = IndexMap::new();
        for (name, def) in &self.0.def.computed {
            if self.0.props.contains_key(name) || self.data_object().is_some_and(|d| d.contains_key(name)) {
                diagnostics::warn(format!(
                    "The computed property \"{name}\" is already defined as a prop or in data."
                ));
                continue;
            }
            let get = def.get.clone();
            let weak = weak.clone();
            let getter: Getter = Arc::new(move || match weak.upgrade() {
                Some(inner) => get(&RenderContext::new(Component(inner))),
                None => Ok(Value::Null),
            });
            let watcher = Watcher::new(
                getter,
                None,
                WatcherOptions {
                    lazy: true,
                    expression: Some(format!("computed \"{name}\"")),
                    ..Default::default()
                },
            )?;
            computed.insert(name.clone(), watcher);
        }
        let _ = self.0.computed.set(computed);
        Ok(())
    }

    fn init_watch(&self) -> Result<()> {
        for def in self.0.def.watch.clone() {
            match self.watch_handler(def.target, def.handler, def.options) {
                // Already reported as a warning.
                Err(Error::InvalidPath(_)) => {}
                Err(err) => return Err(err),
                Ok(_) => {}
            }
        }
        Ok(())
    }

    fn take_placeholder(&self, placeholder: &VNode) {
        let mut st = self.0.state.lock();
        st.slots = resolve_slots(&placeholder.children);
        st.scoped_slots = placeholder.data.scoped_slots.clone();
        st.listeners = placeholder.data.on.clone();
    }

    fn start_render(&self) -> Result<()> {
        let weak = Arc::downgrade(&self.0);

        let getter: Getter = {
            let weak = weak.clone();
            Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Component(inner).update_component();
                }
                Ok(Value::Null)
            })
        };
        let before: Hook = {
            let weak = weak.clone();
            Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let component = Component(inner);
                    if component.is_mounted() && !component.is_destroyed() {
                        component.call_hook(Lifecycle::BeforeUpdate);
                    }
                }
            })
        };
        let after: Hook = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let component = Component(inner);
                if component.is_mounted() && !component.is_destroyed() {
                    component.call_hook(Lifecycle::Updated);
                }
            }
        });

        let watcher = Watcher::new(
            getter,
            None,
            WatcherOptions {
                before: Some(before),
                after: Some(after),
                expression: Some(format!("render <{}>", self.0.def.name)),
                ..Default::default()
            },
        )?;
        self.0.state.lock().render_watcher = Some(watcher);
        Ok(())
    }

    // ---- Rendering ----

    fn update_component(&self) {
        if let Some(vnode) = self.render() {
            self.update(vnode);
        }
    }

    /// Run the render function. `None` keeps the previous tree.
    fn render(&self) -> Option<VNode> {
        let def = &self.0.def;
        let Some(render) = &def.render else {
            diagnostics::warn(format!(
                "Failed to mount component <{}>: render function not defined.",
                def.name
            ));
            return Some(VNode::empty());
        };

        let ctx = RenderContext::new(self.clone());
        let rendered = match render(&ctx) {
            Ok(vnode) => Some(vnode),
            Err(err) => {
                diagnostics::handle_error(&err, &format!("render of <{}>", def.name));
                match &def.render_error {
                    Some(fallback) => match fallback(&ctx, &err) {
                        Ok(vnode) => Some(vnode),
                        Err(err) => {
                            diagnostics::handle_error(&err, &format!("render_error of <{}>", def.name));
                            None
                        }
                    },
                    None => None,
                }
            }
        };

        match rendered {
            Some(vnode) => Some(vnode),
            None if self.0.state.lock().vnode.is_none() => Some(VNode::empty()),
            None => None,
        }
    }

    fn update(&self, mut vnode: VNode) {
        let (prev, target) = {
            let mut st = self.0.state.lock();
            (st.vnode.take(), st.target.take())
        };
        let old = match prev {
            Some(prev) => Some(OldTree::VNode(prev)),
            None => target.map(OldTree::Realized),
        };
        self.0.patcher.patch(old, Some(&mut vnode), false, false);
        self.0.state.lock().vnode = Some(vnode);
    }

    fn call_hook(&self, point: Lifecycle) {
        let hooks = self.0.def.hooks_for(point).to_vec();
        if hooks.is_empty() {
            return;
        }
        let _untracked = ReactiveContext::untracked();
        for hook in hooks {
            hook(self);
        }
    }

    // ---- State access ----

    fn data_object(&self) -> Option<&Object> {
        self.0.data.as_object()
    }

    /// Read a prop, data field or computed property, in that order. Tracked.
    /// Read a computed, data or prop field. Tracked.
    pub fn get(&self, key: &str) -> Value {
        if self.0.props.contains_key(key) {
            return self.0.props.get(key);
        }
        if let Some(data) = self.data_object().filter(|d| d.contains_key(key)) {
            return data.get(key);
        }
        if let Some(watcher) = self.0.computed.get().and_then(|c| c.get(key)) {
            let value = match watcher.evaluate() {
                Ok(value) => value,
                Err(err) => {
                    diagnostics::handle_error(&err, &format!("computed \"{key}\""));
                    Value::Null
                }
            };
            watcher.depend();
            return value;
        }
        diagnostics::warn(format!(
            "Property \"{key}\" is not defined on <{}> but referenced during render.",
            self.0.def.name
        ));
        Value::Null
    }

    /// Write a data field, a computed property with a setter or (with a
    /// warning) a prop.
    pub fn set(&self, key: &str, value: Value) {
        if let Some(computed) = self.0.def.computed.get(key) {
            match &computed.set {
                Some(setter) => setter(&RenderContext::new(self.clone()), value),
                None => diagnostics::warn(format!(
                    "Computed property \"{key}\" was assigned to but it has no setter."
                )),
            }
            return;
        }
        if self.0.props.contains_key(key) {
            diagnostics::warn(format!(
                "Avoid mutating a prop directly since the value will be overwritten whenever the parent re-renders. Prop being mutated: \"{key}\""
            ));
            self.0.props.assign(key, value);
            return;
        }
        match self.data_object() {
            Some(data) if data.contains_key(key) => data.assign(key, value),
            _ => diagnostics::warn(format!(
                "Property \"{key}\" is not defined on <{}>.",
                self.0.def.name
            )),
        }
    }

    // ---- Public API ----

    /// Watch a path or getter on this instance. The watch is torn down with
    /// the instance.
    pub fn watch<F>(&self, target: impl Into<WatchTarget>, handler: F, options: WatchOptions) -> Result<WatchHandle>
    where
        F: Fn(&Component, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.watch_handler(target.into(), Arc::new(handler), options)
    }

    fn watch_handler(&self, target: WatchTarget, handler: WatchHandler, options: WatchOptions) -> Result<WatchHandle> {
        let weak = Arc::downgrade(&self.0);
        let getter: Getter = match target {
            WatchTarget::Path(path) => {
                let segments = parse_path(&path).inspect_err(|err| diagnostics::warn(err.to_string()))?;
                let weak = weak.clone();
                Arc::new(move || {
                    let (Some(inner), Some((first, rest))) = (weak.upgrade(), segments.split_first()) else {
                        return Ok(Value::Null);
                    };
                    Ok(resolve_path(&Component(inner).get(first), rest))
                })
            }
            WatchTarget::Getter(get) => {
                let weak = weak.clone();
                Arc::new(move || match weak.upgrade() {
                    Some(inner) => get(&RenderContext::new(Component(inner))),
                    None => Ok(Value::Null),
                })
            }
        };
        let callback: Callback = Arc::new(move |new, old| match weak.upgrade() {
            Some(inner) => handler(&Component(inner), new, old),
            None => Ok(()),
        });

        let handle = reactive::watch(WatchSource::Getter(getter), callback, options)?;
        self.0.state.lock().watchers.push(handle.watcher().clone());
        Ok(handle)
    }

    /// Queue a re-render even though no tracked state changed.
    pub fn force_update(&self) {
        let watcher = self.0.state.lock().render_watcher.clone();
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }

    /// Invoke the parent's handler for `event`. Returns whether one was
    /// registered.
    pub fn emit(&self, event: &str, payload: &Value) -> bool {
        let handler = self.0.state.lock().listeners.get(event).cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    /// Tear the instance down: stop every watcher, release the root data and
    /// destroy the rendered tree (child components included). The realized
    /// nodes are left where they are. Idempotent.
    pub fn destroy(&self) {
        {
            let mut st = self.0.state.lock();
            if st.being_destroyed {
                return;
            }
            st.being_destroyed = true;
        }
        self.call_hook(Lifecycle::BeforeDestroy);

        let (render_watcher, watchers, vnode) = {
            let mut st = self.0.state.lock();
            (
                st.render_watcher.take(),
                std::mem::take(&mut st.watchers),
                st.vnode.take(),
            )
        };
        if let Some(watcher) = render_watcher {
            watcher.teardown();
        }
        for watcher in watchers {
            watcher.teardown();
        }
        for watcher in self.0.computed.get().into_iter().flat_map(IndexMap::values) {
            watcher.teardown();
        }
        if let Some(ob) = self.0.data.observer() {
            ob.release_root();
        }

        if let Some(vnode) = vnode {
            self.0.patcher.patch(Some(OldTree::VNode(vnode)), None, false, false);
        }

        self.0.state.lock().destroyed = true;
        self.call_hook(Lifecycle::Destroyed);
        tracing::debug!(id = self.0.id, name = %self.0.def.name, "component destroyed");
    }

    /// Instance id, unique per process.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Name of the definition this instance was created from.
    pub fn name(&self) -> &str {
        &self.0.def.name
    }

    /// The observed props object. Written by the parent on re-render.
    pub fn props(&self) -> &Object {
        &self.0.props
    }

    /// The root data object.
    pub fn data(&self) -> &Value {
        &self.0.data
    }

    /// Realized root of the current tree.
    pub fn root_elm(&self) -> Option<NodeId> {
        let (elm, child) = {
            let st = self.0.state.lock();
            match &st.vnode {
                Some(vnode) => (vnode.elm, vnode.component.clone()),
                None => (None, None),
            }
        };
        match child {
            Some(child) => child.root_elm(),
            None => elm,
        }
    }

    /// Snapshot of the nodes registered under a `ref` name.
    pub fn refs(&self) -> IndexMap<String, NodeId> {
        self.0.state.lock().refs.clone()
    }

    pub fn ref_node(&self, name: &str) -> Option<NodeId> {
        self.0.state.lock().refs.get(name).copied()
    }

    /// The watcher driving re-renders, once mounted.
    pub fn render_watcher(&self) -> Option<Watcher> {
        self.0.state.lock().render_watcher.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.0.state.lock().mounted
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.state.lock().destroyed
    }
}

fn init_data(def: &ComponentDef, props: &Object) -> Value {
    let data = match &def.data {
        Some(factory) => factory(),
        None => Value::Object(Object::new()),
    };
    let data = match data {
        object @ Value::Object(_) => object,
        _ => {
            diagnostics::warn(format!(
                "data functions should return an object (component <{}>)",
                def.name
            ));
            Value::Object(Object::new())
        }
    };
    if let Some(object) = data.as_object() {
        for key in object.keys_untracked() {
            if props.contains_key(&key) {
                diagnostics::warn(format!(
                    "The data property \"{key}\" is already declared as a prop. Use prop default value instead."
                ));
            }
        }
    }
    if let Some(ob) = observe(&data) {
        ob.retain_root();
    }
    data
}

/// Group slot content by the `slot` name of each node.
fn resolve_slots(children: &[VNode]) -> IndexMap<String, Vec<VNode>> {
    let mut slots: IndexMap<String, Vec<VNode>> = IndexMap::new();
    for child in children {
        let name = child.data.slot.clone().unwrap_or_else(|| String::from("default"));
        slots.entry(name).or_default().push(child.clone());
    }
    slots
}

impl MountedComponent for Component {
    fn root_elm(&self) -> Option<NodeId> {
        Component::root_elm(self)
    }

    fn prepatch(&self, placeholder: &VNode) {
        let _untracked = ReactiveContext::untracked();
        for (name, default) in &self.0.def.props {
            let value = placeholder
                .data
                .props
                .get(name)
                .cloned()
                .unwrap_or_else(|| default.clone());
            self.0.props.assign(name, value);
        }

        let needs_update = {
            let mut st = self.0.state.lock();
            let had_slots = !st.slots.is_empty() || !st.scoped_slots.is_empty();
            st.slots = resolve_slots(&placeholder.children);
            st.scoped_slots = placeholder.data.scoped_slots.clone();
            st.listeners = placeholder.data.on.clone();
            had_slots || !st.slots.is_empty() || !st.scoped_slots.is_empty()
        };
        if needs_update {
            self.force_update();
        }
    }

    fn inserted(&self) {
        let first = {
            let mut st = self.0.state.lock();
            !std::mem::replace(&mut st.mounted, true)
        };
        if first {
            self.call_hook(Lifecycle::Mounted);
        }
    }

    fn destroy(&self) {
        Component::destroy(self);
    }
}

impl RefOwner for ComponentInner {
    fn register_ref(&self, name: &str, elm: NodeId) {
        self.state.lock().refs.insert(name.to_string(), elm);
    }

    fn unregister_ref(&self, name: &str, elm: NodeId) {
        let mut st = self.state.lock();
        if st.refs.get(name) == Some(&elm) {
            st.refs.shift_remove(name);
        }
    }
}

impl RenderOwner for ComponentInner {
    fn force_render(&self) {
        let watcher = {
            let st = self.state.lock();
            if st.being_destroyed || st.destroyed {
                return;
            }
            st.render_watcher.clone()
        };
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.0.id)
            .field("name", &self.0.def.name)
            .finish_non_exhaustive()
    }
}

// ---- Render context ----

/// What a render function, computed getter or watch getter sees of its
/// component.
pub struct RenderContext {
    component: Component,
}

impl RenderContext {
    pub(crate) fn new(component: Component) -> Self {
        Self { component }
    }

    /// The component being rendered.
    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn get(&self, key: &str) -> Value {
        self.component.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.component.set(key, value.into());
    }

    /// `create_element` with full normalization, for hand-written renders.
    pub fn h(&self, tag: impl Into<Tag>, data: impl Into<ElementData>, children: Vec<Child>) -> VNode {
        create_element(self, tag, data, children, Normalization::Always)
    }

    pub fn create_element(
        &self,
        tag: impl Into<Tag>,
        data: impl Into<ElementData>,
        children: Vec<Child>,
        normalization: Normalization,
    ) -> VNode {
        create_element(self, tag, data, children, normalization)
    }

    /// Slot content passed by the parent under `name`.
    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.component
            .0
            .state
            .lock()
            .slots
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Render the scoped slot `name` with `props`, falling back to the
    /// plain slot of the same name.
    pub fn scoped_slot(&self, name: &str, props: &Value) -> Vec<VNode> {
        let slot = self.component.0.state.lock().scoped_slots.get(name).cloned();
        match slot {
            Some(slot) => slot(props),
            None => self.slot(name),
        }
    }
}

impl ElementContext for RenderContext {
    fn resolve_component(&self, name: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.component.0.def.components.get(name).cloned()
    }

    fn ref_owner(&self) -> Option<Weak<dyn RefOwner>> {
        let owner: Weak<dyn RefOwner> = Arc::downgrade(&self.component.0) as Weak<ComponentInner>;
        Some(owner)
    }

    fn resolve_async_component(&self, name: &str) -> Option<AsyncComponent> {
        self.component.0.def.async_components.get(name).cloned()
    }

    fn render_owner(&self) -> Option<Weak<dyn RenderOwner>> {
        let owner: Weak<dyn RenderOwner> = Arc::downgrade(&self.component.0) as Weak<ComponentInner>;
        Some(owner)
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::component::factory;
    use crate::scheduler::flush_ticks;
    use crate::vdom::{NodeOps, VNodeData};
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::AtomicUsize;

    fn counter_def() -> Arc<ComponentDef> {
        ComponentDef::new("counter")
            .data(|| Value::object([("count", Value::from(0))]))
            .render(|ctx| {
                Ok(VNode::element("p").child(VNode::text(format!("count: {}", ctx.get("count").to_display_string()))))
            })
            .build()
    }

    fn mount_in_container(def: Arc<ComponentDef>) -> (Arc<PlMutex<MemoryBackend>>, NodeId, Component) {
        let (memory, backend) = MemoryBackend::shared();
        let container = memory.lock().create_element("main");
        let target = memory.lock().create_element("div");
        memory.lock().insert_before(container, target, None);
        let component = Component::mount(def, backend, Some(target), IndexMap::new()).unwrap();
        (memory, container, component)
    }

    #[test]
    fn renders_and_updates_on_flush() {
        let (memory, container, component) = mount_in_container(counter_def());
        assert_eq!(memory.lock().serialize(container), "<main><p>count: 0</p></main>");

        component.set("count", Value::from(1));
        assert_eq!(memory.lock().serialize(container), "<main><p>count: 0</p></main>");

        flush_ticks();
        assert_eq!(memory.lock().serialize(container), "<main><p>count: 1</p></main>");
    }

    #[test]
    fn computed_properties_cache() {
        let evaluations = Arc::new(AtomicUsize::new(0));
        let evals = evaluations.clone();
        let def = ComponentDef::new("doubler")
            .data(|| Value::object([("n", Value::from(2))]))
            .computed("double", move |ctx| {
                evals.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(ctx.get("n").as_f64().unwrap_or(0.0) * 2.0))
            })
            .render(|ctx| Ok(VNode::text(format!("{}/{}", ctx.get("double"), ctx.get("double")))))
            .build();
        let (memory, container, component) = mount_in_container(def);

        assert_eq!(memory.lock().serialize(container), "<main>4/4</main>");
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        component.set("n", Value::from(5));
        flush_ticks();
        assert_eq!(memory.lock().serialize(container), "<main>10/10</main>");
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lifecycle_hooks_run_in_order() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let hook = |name: &'static str| {
            let log = log.clone();
            move |_: &Component| log.lock().push(name)
        };
        let def = ComponentDef::new("hooks")
            .data(|| Value::object([("v", Value::from(0))]))
            .render(|ctx| Ok(VNode::text(ctx.get("v").to_display_string())))
            .hook(Lifecycle::BeforeMount, hook("before_mount"))
            .hook(Lifecycle::Mounted, hook("mounted"))
            .hook(Lifecycle::BeforeUpdate, hook("before_update"))
            .hook(Lifecycle::Updated, hook("updated"))
            .hook(Lifecycle::BeforeDestroy, hook("before_destroy"))
            .hook(Lifecycle::Destroyed, hook("destroyed"))
            .build();
        let (_memory, _container, component) = mount_in_container(def);

        component.set("v", Value::from(1));
        flush_ticks();
        component.destroy();
        component.destroy();

        assert_eq!(
            log.lock().as_slice(),
            [
                "before_mount",
                "mounted",
                "before_update",
                "updated",
                "before_destroy",
                "destroyed"
            ]
        );
        assert!(component.is_destroyed());
    }

    #[test]
    fn render_errors_keep_the_previous_tree() {
        crate::config::update(|c| c.silent = true);
        let def = ComponentDef::new("fragile")
            .data(|| Value::object([("ok", Value::from(true))]))
            .render(|ctx| {
                if ctx.get("ok").truthy() {
                    Ok(VNode::element("span").child(VNode::text("fine")))
                } else {
                    Err(Error::eval("broken"))
                }
            })
            .build();
        let (memory, container, component) = mount_in_container(def);

        component.set("ok", Value::from(false));
        flush_ticks();
        assert_eq!(memory.lock().serialize(container), "<main><span>fine</span></main>");
        crate::config::install(crate::config::Config::default());
    }

    #[test]
    fn render_error_fallback_is_used() {
        crate::config::update(|c| c.silent = true);
        let def = ComponentDef::new("fallback")
            .render(|_| Err(Error::eval("nope")))
            .render_error(|_, err| Ok(VNode::element("pre").child(VNode::text(err.to_string()))))
            .build();
        let (memory, container, _component) = mount_in_container(def);
        assert_eq!(
            memory.lock().serialize(container),
            "<main><pre>evaluation failed: nope</pre></main>"
        );
        crate::config::install(crate::config::Config::default());
    }

    #[test]
    fn child_components_receive_props_and_slots() {
        let mounted = Arc::new(AtomicUsize::new(0));
        let m = mounted.clone();
        let child = ComponentDef::new("badge")
            .prop("label", "?")
            .render(|ctx| {
                let mut children = vec![Child::from(ctx.get("label").to_display_string())];
                children.extend(ctx.slot("default").into_iter().map(Child::from));
                Ok(ctx.h("span", (), children))
            })
            .hook(Lifecycle::Mounted, move |_| {
                m.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let parent = ComponentDef::new("app")
            .data(|| Value::object([("label", Value::from("new"))]))
            .component(child)
            .render(|ctx| {
                let badge = ctx.h(
                    "badge",
                    VNodeData {
                        props: [("label".to_string(), ctx.get("label"))].into_iter().collect(),
                        ..Default::default()
                    },
                    vec![Child::from("!")],
                );
                Ok(ctx.h("div", (), vec![Child::from(badge)]))
            })
            .build();

        let (memory, container, app) = mount_in_container(parent);
        assert_eq!(
            memory.lock().serialize(container),
            "<main><div><span>new!</span></div></main>"
        );
        assert_eq!(mounted.load(Ordering::SeqCst), 1);

        app.set("label", Value::from("old"));
        flush_ticks();
        assert_eq!(
            memory.lock().serialize(container),
            "<main><div><span>old!</span></div></main>"
        );
        assert_eq!(mounted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn async_children_render_once_resolved() {
        let resolver = Arc::new(PlMutex::new(None));
        let keep = resolver.clone();
        let lazy = crate::vdom::AsyncComponent::new("lazy", move |r| {
            *keep.lock() = Some(r);
        });
        let child = ComponentDef::new("lazy")
            .render(|ctx| Ok(ctx.h("em", (), vec![Child::from("loaded")])))
            .build();
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();
        let parent = ComponentDef::new("app")
            .async_component("lazy", lazy.clone())
            .render(move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ctx.h("div", (), vec![Child::from(ctx.h("lazy", (), Vec::new()))]))
            })
            .build();

        let (memory, container, _app) = mount_in_container(parent);
        assert_eq!(memory.lock().serialize(container), "<main><div><!----></div></main>");
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        let r = resolver.lock().take().unwrap();
        r.resolve(factory(&child));
        assert!(lazy.is_resolved());
        flush_ticks();

        assert_eq!(renders.load(Ordering::SeqCst), 2);
        assert_eq!(
            memory.lock().serialize(container),
            "<main><div><em>loaded</em></div></main>"
        );
    }

    #[test]
    fn refs_and_emitted_events() {
        let ready = Arc::new(AtomicUsize::new(0));
        let child = ComponentDef::new("clicker")
            .render(|_| Ok(VNode::element("button")))
            .hook(Lifecycle::Mounted, |c| {
                c.emit("ready", &Value::Null);
            })
            .build();
        let child_factory = factory(&child);

        let r = ready.clone();
        let parent = ComponentDef::new("host")
            .render(move |ctx| {
                let r = r.clone();
                let node = VNode {
                    context: ctx.ref_owner(),
                    ..VNode::component(child_factory.clone())
                        .ref_name("button")
                        .on("ready", move |_| {
                            r.fetch_add(1, Ordering::SeqCst);
                        })
                };
                Ok(VNode::element("div").child(node))
            })
            .build();

        let (memory, _container, host) = mount_in_container(parent);
        assert_eq!(ready.load(Ordering::SeqCst), 1);

        let button = host.ref_node("button").unwrap();
        assert_eq!(memory.lock().tag_name(button).as_deref(), Some("BUTTON"));
        let root = host.root_elm().unwrap();
        assert_eq!(memory.lock().children(root), vec![button]);

        host.destroy();
        assert!(host.refs().is_empty());
    }

    #[test]
    fn watch_paths_resolve_against_the_instance() {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let s = seen.clone();
        let def = ComponentDef::new("watcher")
            .data(|| Value::from_json(serde_json::json!({ "user": { "name": "ada" } })))
            .watch("user.name", move |_, new, old| {
                s.lock().push(format!("{old} -> {new}"));
                Ok(())
            })
            .render(|_| Ok(VNode::empty()))
            .build();
        let (_memory, _container, component) = mount_in_container(def);

        let user = component.get("user");
        user.as_object().unwrap().assign("name", Value::from("grace"));
        flush_ticks();
        assert_eq!(seen.lock().as_slice(), ["ada -> grace"]);
    }
}
