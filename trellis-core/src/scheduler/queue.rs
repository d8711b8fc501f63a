//! Watcher Queue
//!
//! Watchers notified outside a flush are collected here, deduplicated by id,
//! and run together on the next tick.
//!
//! # Ordering
//!
//! The queue is sorted by watcher id before it is flushed. Ids grow in
//! creation order, so:
//!
//! 1. a parent component's render watcher runs before its children's;
//! 2. a component's user watchers run before its render watcher;
//! 3. a child destroyed by its parent's re-render is already inactive when
//!    its turn comes, and its run is a no-op.
//!
//! Watchers queued *during* a flush are inserted at their id position, but
//! never before the cursor: a watcher whose slot has already been passed
//! runs next.
//!
//! # Circular Updates
//!
//! A watcher that re-queues itself more than `max_update_count` times in one
//! flush is reported with [`Error::CircularUpdate`] and skipped for the rest
//! of that flush.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::config;
use crate::diagnostics;
use crate::error::Error;
use crate::reactive::{Watcher, WatcherId};

use super::tick::next_tick;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, usize>,
    skipped: HashSet<WatcherId>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Queue `watcher` for the next flush. Already-queued watchers are ignored.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let start_flush = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        if s.flushing && s.skipped.contains(&id) {
            return false;
        }
        if !s.has.insert(id) {
            return false;
        }

        if s.flushing {
            let mut at = s.queue.len();
            while at > s.index + 1 && s.queue[at - 1].id() > id {
                at -= 1;
            }
            s.queue.insert(at, watcher);
        } else {
            s.queue.push(watcher);
        }
        tracing::trace!(watcher = id.raw(), queued = s.queue.len(), "watcher queued");

        !std::mem::replace(&mut s.waiting, true)
    });

    if start_flush {
        if config::current().async_flush {
            let _ = next_tick(flush_scheduler_queue);
        } else {
            flush_scheduler_queue();
        }
    }
}

/// Run every queued watcher in id order, then the post-flush hooks.
pub fn flush_scheduler_queue() {
    let max_updates = config::current().max_update_count;
    let queued = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        s.flushing = true;
        s.index = 0;
        s.queue.sort_by_key(Watcher::id);
        s.queue.len()
    });
    tracing::debug!(queued, "flushing scheduler queue");

    while let Some(watcher) = SCHEDULER.with(|s| {
        let s = s.borrow();
        s.queue.get(s.index).cloned()
    }) {
        let id = watcher.id();
        let skipped = SCHEDULER.with(|s| s.borrow().skipped.contains(&id));

        if skipped {
            SCHEDULER.with(|s| s.borrow_mut().has.remove(&id));
        } else {
            watcher.run_before();
            SCHEDULER.with(|s| s.borrow_mut().has.remove(&id));

            if let Err(err) = watcher.run() {
                diagnostics::handle_error(
                    &err,
                    &format!("watcher \"{}\"", watcher.expression()),
                );
            }

            let runaway = SCHEDULER.with(|s| {
                let mut s = s.borrow_mut();
                if !s.has.contains(&id) {
                    return None;
                }
                let count = s.circular.entry(id).or_insert(0);
                *count += 1;
                let count = *count;
                if count > max_updates {
                    s.skipped.insert(id);
                    Some(count)
                } else {
                    None
                }
            });
            if let Some(count) = runaway {
                diagnostics::handle_error(
                    &Error::CircularUpdate {
                        expression: watcher.expression().to_string(),
                        count,
                    },
                    "scheduler",
                );
            }
        }

        SCHEDULER.with(|s| s.borrow_mut().index += 1);
    }

    let ran = SCHEDULER.with(|s| std::mem::take(&mut *s.borrow_mut()).queue);
    tracing::debug!(ran = ran.len(), "scheduler queue flushed");

    for watcher in ran.iter().rev() {
        if watcher.is_active() {
            watcher.run_after();
        }
    }
}

/// Number of watchers waiting in the queue.
pub fn pending_watchers() -> usize {
    SCHEDULER.with(|s| {
        let s = s.borrow();
        s.queue.len().saturating_sub(s.index)
    })
}
