//! Trellis Core
//!
//! This crate provides the core runtime of the Trellis UI library:
//!
//! - Observable state with automatic, field-level dependency tracking
//! - Watchers (render, computed and user watches) and a batching scheduler
//! - Virtual nodes, the `h` function and child normalization
//! - A patch engine that reconciles renders against a realized tree through
//!   a pluggable backend
//! - Components tying all of the above together
//!
//! # Architecture
//!
//! - `reactive`: values, observation, dependency nodes and watchers
//! - `scheduler`: the watcher queue and the tick batch
//! - `vdom`: virtual nodes, patch modules and the patch engine
//! - `backend`: the in-memory backend
//! - `component`: component definitions and instances
//! - `config` / `diagnostics`: runtime settings, error and warning routing
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::backend::MemoryBackend;
//! use trellis_core::component::{Component, ComponentDef};
//! use trellis_core::reactive::Value;
//! use trellis_core::scheduler::flush_ticks;
//! use trellis_core::vdom::VNode;
//!
//! let counter = ComponentDef::new("counter")
//!     .data(|| Value::object([("count", Value::from(0))]))
//!     .render(|ctx| {
//!         Ok(VNode::element("p").child(VNode::text(format!("count: {}", ctx.get("count")))))
//!     })
//!     .build();
//!
//! let (memory, backend) = MemoryBackend::shared();
//! let app = Component::mount(counter, backend, None, Default::default())?;
//!
//! app.set("count", Value::from(1));
//! flush_ticks();
//! // <p>count: 1</p>
//! if let Some(root) = app.root_elm() {
//!     println!("{}", memory.lock().serialize(root));
//! }
//! ```

pub mod backend;
pub mod component;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod vdom;

pub use config::Config;
pub use error::{Error, Result};
pub use reactive::{del, observe, set, watch, Signal, Value};
pub use scheduler::next_tick;
pub use vdom::{create_element, Patcher, VNode};
