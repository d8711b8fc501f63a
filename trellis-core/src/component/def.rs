//! Component definitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::reactive::{Value, WatchOptions};
use crate::vdom::{AsyncComponent, Backend, ComponentFactory, MountedComponent, VNode};

use super::instance::{Component, RenderContext};

/// Render function: produces the component's tree from its current state.
pub type RenderFn = Arc<dyn Fn(&RenderContext) -> Result<VNode> + Send + Sync>;

/// Fallback render used when the render function fails.
pub type RenderErrorFn = Arc<dyn Fn(&RenderContext, &Error) -> Result<VNode> + Send + Sync>;

/// Produces a fresh data object for each instance.
pub type DataFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Computed property getter, and getter-style watch source.
pub type ComputedGetter = Arc<dyn Fn(&RenderContext) -> Result<Value> + Send + Sync>;

pub type ComputedSetter = Arc<dyn Fn(&RenderContext, Value) + Send + Sync>;

pub type LifecycleHook = Arc<dyn Fn(&Component) + Send + Sync>;

/// Watch handler, receiving `(component, new, old)`.
pub type WatchHandler = Arc<dyn Fn(&Component, &Value, &Value) -> Result<()> + Send + Sync>;

/// Lifecycle points a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeDestroy,
    Destroyed,
}

#[derive(Clone)]
pub(crate) struct ComputedDef {
    pub(crate) get: ComputedGetter,
    pub(crate) set: Option<ComputedSetter>,
}

/// What a component-level watch observes.
#[derive(Clone)]
pub enum WatchTarget {
    /// A dot-delimited path whose first segment names a prop, data field or
    /// computed property.
    Path(String),
    Getter(ComputedGetter),
}

impl From<&str> for WatchTarget {
    fn from(path: &str) -> Self {
        WatchTarget::Path(path.to_string())
    }
}

impl From<String> for WatchTarget {
    fn from(path: String) -> Self {
        WatchTarget::Path(path)
    }
}

#[derive(Clone)]
pub(crate) struct WatchDef {
    pub(crate) target: WatchTarget,
    pub(crate) handler: WatchHandler,
    pub(crate) options: WatchOptions,
}

/// Blueprint for component instances.
///
/// ```rust,ignore
/// let counter = ComponentDef::new("counter")
///     .data(|| Value::object([("count", Value::from(0))]))
///     .render(|ctx| Ok(VNode::element("p").child(VNode::text(format!("count: {}", ctx.get("count"))))))
///     .build();
/// ```
#[derive(Clone, Default)]
pub struct ComponentDef {
    pub(crate) name: String,
    pub(crate) props: IndexMap<String, Value>,
    pub(crate) data: Option<DataFn>,
    pub(crate) computed: IndexMap<String, ComputedDef>,
    pub(crate) watch: Vec<WatchDef>,
    pub(crate) render: Option<RenderFn>,
    pub(crate) render_error: Option<RenderErrorFn>,
    pub(crate) hooks: HashMap<Lifecycle, Vec<LifecycleHook>>,
    pub(crate) components: IndexMap<String, Arc<dyn ComponentFactory>>,
    pub(crate) async_components: IndexMap<String, AsyncComponent>,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a prop and its default.
    pub fn prop(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.props.insert(name.into(), default.into());
        self
    }

    pub fn data<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(factory));
        self
    }

    pub fn computed<F>(mut self, name: impl Into<String>, get: F) -> Self
    where
        F: Fn(&RenderContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.computed.insert(
            name.into(),
            ComputedDef {
                get: Arc::new(get),
                set: None,
            },
        );
        self
    }

    pub fn computed_with_setter<F, S>(mut self, name: impl Into<String>, get: F, set: S) -> Self
    where
        F: Fn(&RenderContext) -> Result<Value> + Send + Sync + 'static,
        S: Fn(&RenderContext, Value) + Send + Sync + 'static,
    {
        self.computed.insert(
            name.into(),
            ComputedDef {
                get: Arc::new(get),
                set: Some(Arc::new(set)),
            },
        );
        self
    }

    pub fn watch<F>(self, target: impl Into<WatchTarget>, handler: F) -> Self
    where
        F: Fn(&Component, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.watch_with(target, handler, WatchOptions::default())
    }

    pub fn watch_with<F>(mut self, target: impl Into<WatchTarget>, handler: F, options: WatchOptions) -> Self
    where
        F: Fn(&Component, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.watch.push(WatchDef {
            target: target.into(),
            handler: Arc::new(handler),
            options,
        });
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderContext) -> Result<VNode> + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn render_error<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderContext, &Error) -> Result<VNode> + Send + Sync + 'static,
    {
        self.render_error = Some(Arc::new(render));
        self
    }

    pub fn hook<F>(mut self, point: Lifecycle, hook: F) -> Self
    where
        F: Fn(&Component) + Send + Sync + 'static,
    {
        self.hooks.entry(point).or_default().push(Arc::new(hook));
        self
    }

    /// Register a child component under its name, for tags in this
    /// component's render.
    pub fn component(mut self, def: Arc<ComponentDef>) -> Self {
        self.components.insert(def.name.clone(), factory(&def));
        self
    }

    /// Register a lazily loaded child component under `name`. Every
    /// instance of this definition shares the one load.
    pub fn async_component(mut self, name: impl Into<String>, component: AsyncComponent) -> Self {
        self.async_components.insert(name.into(), component);
        self
    }

    /// Finish the definition. It is shared by every instance.
    pub fn build(self) -> Arc<ComponentDef> {
        Arc::new(self)
    }

    pub(crate) fn hooks_for(&self, point: Lifecycle) -> &[LifecycleHook] {
        self.hooks.get(&point).map(Vec::as_slice).unwrap_or_default()
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("async_components", &self.async_components.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

struct DefFactory {
    def: Arc<ComponentDef>,
}

impl ComponentFactory for DefFactory {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn instantiate(&self, placeholder: &VNode, backend: &Backend) -> Result<Arc<dyn MountedComponent>> {
        let child = Component::create_child(self.def.clone(), backend.clone(), placeholder)?;
        Ok(Arc::new(child))
    }
}

/// A factory for `def`, for use as a component tag.
///
/// Nodes are only patched in place when their factories are the same
/// allocation, so create the factory once and reuse it across renders.
pub fn factory(def: &Arc<ComponentDef>) -> Arc<dyn ComponentFactory> {
    Arc::new(DefFactory { def: def.clone() })
}
