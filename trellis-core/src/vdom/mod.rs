//! Virtual tree layer: nodes, the `h` function, patch modules and the patch
//! engine that reconciles renders against a realized tree.

mod async_component;
mod create_element;
mod modules;
mod ops;
mod patch;
mod vnode;

pub use async_component::{AsyncComponent, AsyncResolver, Loader};
pub use create_element::{
    create_element, normalize_children, simple_normalize_children, Child, ElementContext,
    ElementData, Normalization, Tag,
};
pub use modules::{
    default_modules, stringify_class, AttrsModule, ClassModule, DomPropsModule, EventsModule,
    Module, RefModule, StyleModule,
};
pub use ops::{Backend, Handler, Invoker, NodeId, NodeOps};
pub use patch::{OldTree, Patcher};
pub use vnode::{
    same_vnode, ComponentFactory, Key, MountedComponent, RefOwner, RenderOwner, ScopedSlot, VNode,
    VNodeData, VNodeKind,
};
