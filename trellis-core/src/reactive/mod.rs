//! Reactive Primitives
//!
//! This module implements the dependency-tracking core: dependency nodes,
//! observable data, and watchers.
//!
//! # Concepts
//!
//! ## Dependency Nodes
//!
//! A [`Dep`] is attached to every observable location. Reading the location
//! while a watcher evaluates makes that watcher a subscriber; writing it
//! notifies the subscribers.
//!
//! ## Observable Data
//!
//! State is plain dynamic data ([`Value`], [`Object`], [`Array`]).
//! [`observe`] walks a value and makes every field reactive, so no manual
//! wiring is needed: whatever a watcher reads, it depends on.
//!
//! ## Watchers
//!
//! A [`Watcher`] re-evaluates when something it read changes. Render
//! effects, computed properties and user watches ([`watch`]) are all
//! watchers with different options.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies. When a field is read, its node checks whether a watcher is
//! evaluating and, if so, registers it. Each evaluation re-collects the
//! dependency set from scratch.

mod array;
mod context;
mod dep;
mod object;
mod observer;
mod signal;
mod subscriber;
mod traverse;
mod value;
mod watcher;

pub use array::Array;
pub use context::ReactiveContext;
pub use dep::{Dep, DepId};
pub use object::{Getter as AccessorGetter, Object, Setter as AccessorSetter};
pub use observer::{define_reactive, del, observe, parse_path, resolve_path, set, Observer};
pub use signal::Signal;
pub use subscriber::{Subscriber, WatcherId};
pub use traverse::traverse;
pub use value::Value;
pub use watcher::{
    watch, Callback, Getter, Hook, WatchHandle, WatchOptions, WatchSource, Watcher,
    WatcherOptions,
};
