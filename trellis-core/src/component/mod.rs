//! Components: definitions, live instances and the render context.

mod def;
mod instance;

pub use def::{
    factory, ComponentDef, ComputedGetter, ComputedSetter, DataFn, Lifecycle, LifecycleHook,
    RenderErrorFn, RenderFn, WatchHandler, WatchTarget,
};
pub use instance::{Component, RenderContext};
