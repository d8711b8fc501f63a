//! Update Scheduling
//!
//! Mutations notify watchers synchronously, but most watchers do not run
//! synchronously: they are queued and flushed once per tick. Three writes in
//! a row therefore cause one re-render, not three.
//!
//! - [`queue`]: the deduplicated, id-ordered watcher queue.
//! - [`tick`]: the per-thread callback batch behind [`next_tick`].

pub mod queue;
pub mod tick;

pub use queue::{flush_scheduler_queue, pending_watchers, queue_watcher};
pub use tick::{flush_ticks, next_tick, set_driver, NextTick, TickDriver, TokioTicker};
