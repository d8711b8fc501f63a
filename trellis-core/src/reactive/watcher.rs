//! Watcher Implementation
//!
//! A Watcher owns an evaluation function, remembers which dependency nodes
//! that function read, and reacts when any of them changes. Render effects,
//! computed properties and user watches are all watchers; they differ only
//! in their options.
//!
//! # How Watchers Work
//!
//! 1. `get()` pushes the watcher onto the evaluation-context stack and runs
//!    the getter. Every [`Dep`] read during the call lands in the watcher's
//!    scratch set.
//!
//! 2. After the getter returns, the scratch set replaces the current set.
//!    Nodes that were read last time but not this time lose the watcher as a
//!    subscriber, so conditional reads never leave stale subscriptions.
//!
//! 3. When a node notifies, `update()` decides what to do:
//!    - a lazy (computed) watcher just marks itself dirty, unless another
//!      watcher depends on it, in which case it recomputes and passes the
//!      notification on only if its value changed;
//!    - a `sync` watcher runs immediately;
//!    - everything else is queued in the scheduler.
//!
//! 4. `run()` re-evaluates and fires the callback when the value changed.
//!    Composite values always count as changed, since they may have been
//!    mutated in place.
//!
//! # Computed Watchers
//!
//! ```text
//!   data.a ──┐
//!            ├──▶ computed "total" (lazy, own Dep) ──▶ render watcher
//!   data.b ──┘
//! ```
//!
//! The render watcher subscribes to the computed watcher's own node (via
//! [`Watcher::depend`]), not to `a` and `b` directly.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::diagnostics;
use crate::error::Result;
use crate::scheduler;

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::observer::{parse_path, resolve_path};
use super::subscriber::{Subscriber, WatcherId};
use super::traverse::traverse;
use super::value::Value;

/// Evaluation function of a watcher.
pub type Getter = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// Change callback, receiving `(new, old)`.
pub type Callback = Arc<dyn Fn(&Value, &Value) -> Result<()> + Send + Sync>;

/// Hook run by the scheduler around a watcher's run.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Options controlling how a watcher reacts to change.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Touch every nested field of the value so nested writes trigger too.
    pub deep: bool,
    /// Errors in the getter and callback are reported instead of propagated.
    pub user: bool,
    /// Computed: evaluate on demand and cache until a dependency changes.
    pub lazy: bool,
    /// Run on notification instead of queueing.
    pub sync: bool,
    /// Run by the scheduler right before `run()`.
    pub before: Option<Hook>,
    /// Run by the scheduler after the flush that ran this watcher.
    pub after: Option<Hook>,
    /// Label used in diagnostics.
    pub expression: Option<String>,
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

struct WatcherState {
    value: Value,
    dirty: bool,
    active: bool,
    deps: SmallVec<[Dep; 4]>,
    dep_ids: HashSet<DepId>,
    new_deps: SmallVec<[Dep; 4]>,
    new_dep_ids: HashSet<DepId>,
}

struct WatcherInner {
    id: WatcherId,
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    before: Option<Hook>,
    after: Option<Hook>,
    /// Node other watchers subscribe to when they read a computed value.
    own_dep: Option<Dep>,
    state: Mutex<WatcherState>,
    weak_self: Weak<WatcherInner>,
}

/// A subscriber that re-evaluates when the state it read changes.
///
/// Cloning yields another handle to the same watcher.
#[derive(Clone)]
pub struct Watcher(Arc<WatcherInner>);

impl Watcher {
    /// Create a watcher. Non-lazy watchers evaluate immediately to collect
    /// their initial dependencies; an error from that first evaluation is
    /// returned (user watchers report it and start from `Null`).
    pub fn new(getter: Getter, callback: Option<Callback>, options: WatcherOptions) -> Result<Self> {
        let WatcherOptions {
            deep,
            user,
            lazy,
            sync,
            before,
            after,
            expression,
        } = options;

        let inner = Arc::new_cyclic(|weak_self| WatcherInner {
            id: WatcherId::new(),
            expression: expression.unwrap_or_else(|| String::from("<function>")),
            getter,
            callback,
            deep,
            user,
            lazy,
            sync,
            before,
            after,
            own_dep: lazy.then(Dep::new),
            state: Mutex::new(WatcherState {
                value: Value::Null,
                dirty: lazy,
                active: true,
                deps: SmallVec::new(),
                dep_ids: HashSet::new(),
                new_deps: SmallVec::new(),
                new_dep_ids: HashSet::new(),
            }),
            weak_self: weak_self.clone(),
        });

        let watcher = Watcher(inner);
        tracing::trace!(id = watcher.id().raw(), expression = %watcher.0.expression, lazy, "watcher created");
        if !lazy {
            let value = watcher.get()?;
            watcher.0.state.lock().value = value;
        }
        Ok(watcher)
    }

    /// Creation-order id. Parents are created before their children, and
    /// the scheduler flushes in this order.
    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    /// Human-readable description used in warnings and error reports.
    pub fn expression(&self) -> &str {
        &self.0.expression
    }

    /// The last computed value.
    pub fn value(&self) -> Value {
        self.0.state.lock().value.clone()
    }

    /// Whether a lazy watcher must re-evaluate before its value is read.
    pub fn is_dirty(&self) -> bool {
        self.0.state.lock().dirty
    }

    /// False once the watcher has been torn down.
    pub fn is_active(&self) -> bool {
        self.0.state.lock().active
    }

    pub fn is_lazy(&self) -> bool {
        self.0.lazy
    }

    /// Ids of the nodes read during the last evaluation.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.0.state.lock().deps.iter().map(Dep::id).collect()
    }

    /// Evaluate the getter with this watcher active and re-collect its
    /// dependencies.
    pub fn get(&self) -> Result<Value> {
        let inner = &self.0;
        let result = {
            let me: Arc<dyn Subscriber> = inner.clone();
            let _ctx = ReactiveContext::enter(me);
            let result = match (inner.getter)() {
                Err(err) if inner.user => {
                    diagnostics::handle_error(
                        &err,
                        &format!("getter for watcher \"{}\"", inner.expression),
                    );
                    Ok(Value::Null)
                }
                other => other,
            };
            if inner.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();
        result
    }

    /// Swap the scratch dependency set in, unsubscribing from nodes that
    /// were not read this time.
    fn cleanup_deps(&self) {
        let stale: Vec<Dep> = {
            let mut guard = self.0.state.lock();
            let st = &mut *guard;
            let stale = st
                .deps
                .iter()
                .filter(|dep| !st.new_dep_ids.contains(&dep.id()))
                .cloned()
                .collect();
            st.deps = std::mem::take(&mut st.new_deps);
            st.dep_ids = std::mem::take(&mut st.new_dep_ids);
            stale
        };
        for dep in stale {
            dep.remove_sub(self.0.id);
        }
    }

    /// React to a dependency change.
    pub fn update(&self) {
        let inner = &self.0;
        if inner.lazy {
            match &inner.own_dep {
                Some(dep) if dep.subscriber_count() > 0 => {
                    let dep = dep.clone();
                    if let Err(err) = self.get_and_invoke(|_, _| {
                        dep.notify();
                        Ok(())
                    }) {
                        self.report(&err, "computed");
                    }
                }
                _ => inner.state.lock().dirty = true,
            }
        } else if inner.sync {
            if let Err(err) = self.run() {
                self.report(&err, "watcher");
            }
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and fire the callback if the value changed.
    ///
    /// Does nothing once the watcher has been torn down.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let Some(callback) = self.0.callback.clone() else {
            self.get_and_invoke(|_, _| Ok(()))?;
            return Ok(());
        };
        self.get_and_invoke(|new, old| match callback(new, old) {
            Err(err) if self.0.user => {
                self.report(&err, "callback");
                Ok(())
            }
            other => other,
        })
    }

    fn get_and_invoke<F>(&self, invoke: F) -> Result<()>
    where
        F: FnOnce(&Value, &Value) -> Result<()>,
    {
        let value = self.get()?;
        let old = {
            let mut st = self.0.state.lock();
            st.dirty = false;
            let changed = !value.same(&st.value) || value.is_composite() || self.0.deep;
            if !changed {
                return Ok(());
            }
            std::mem::replace(&mut st.value, value.clone())
        };
        invoke(&value, &old)
    }

    /// Computed read: recompute if dirty, then return the cached value.
    pub fn evaluate(&self) -> Result<Value> {
        if self.is_dirty() {
            let value = self.get()?;
            let mut st = self.0.state.lock();
            st.value = value;
            st.dirty = false;
        }
        Ok(self.value())
    }

    /// Subscribe the currently evaluating watcher to this computed watcher.
    pub fn depend(&self) {
        if let Some(dep) = &self.0.own_dep {
            if ReactiveContext::is_active() {
                dep.depend();
            }
        }
    }

    /// Unsubscribe from every dependency and stop reacting. Idempotent.
    pub fn teardown(&self) {
        let deps = {
            let mut st = self.0.state.lock();
            if !st.active {
                return;
            }
            st.active = false;
            st.dep_ids.clear();
            std::mem::take(&mut st.deps)
        };
        for dep in deps {
            dep.remove_sub(self.0.id);
        }
        tracing::trace!(id = self.0.id.raw(), "watcher torn down");
    }

    pub(crate) fn run_before(&self) {
        if let Some(before) = &self.0.before {
            before();
        }
    }

    pub(crate) fn run_after(&self) {
        if let Some(after) = &self.0.after {
            after();
        }
    }

    fn report(&self, err: &crate::Error, what: &str) {
        diagnostics::handle_error(
            err,
            &format!("{what} for watcher \"{}\"", self.0.expression),
        );
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> WatcherId {
        self.id
    }

    fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let subscribe = {
            let mut st = self.state.lock();
            if st.new_dep_ids.insert(id) {
                st.new_deps.push(dep.clone());
                !st.dep_ids.contains(&id)
            } else {
                false
            }
        };
        if subscribe {
            dep.add_sub(self.weak_self.clone(), self.id);
        }
    }

    fn update(&self) {
        if let Some(inner) = self.weak_self.upgrade() {
            Watcher(inner).update();
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.0.state.lock();
        f.debug_struct("Watcher")
            .field("id", &self.0.id.raw())
            .field("expression", &self.0.expression)
            .field("dirty", &st.dirty)
            .field("active", &st.active)
            .field("deps", &st.deps.len())
            .finish()
    }
}

// ---- User watches ----

/// What a user watch observes.
#[derive(Clone)]
pub enum WatchSource {
    /// A dot-delimited path such as `"user.name"`, resolved against `root`.
    Path { root: Value, path: String },
    /// An arbitrary evaluation function.
    Getter(Getter),
}

impl WatchSource {
    /// Watch the dot-delimited `path` below `root`.
    pub fn path(root: &Value, path: impl Into<String>) -> Self {
        Self::Path {
            root: root.clone(),
            path: path.into(),
        }
    }

    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self::Getter(Arc::new(f))
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    pub deep: bool,
    /// Invoke the callback right away with `(value, Null)`.
    pub immediate: bool,
    pub sync: bool,
}

/// Handle returned by [`watch`].
#[derive(Debug, Clone)]
pub struct WatchHandle {
    watcher: Watcher,
}

impl WatchHandle {
    /// Stop watching.
    pub fn unwatch(&self) {
        self.watcher.teardown();
    }

    /// The watcher backing this watch.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

/// Watch `source` and call `callback(new, old)` whenever it changes.
///
/// An unparseable path is reported as a warning and returned as
/// [`Error::InvalidPath`](crate::Error::InvalidPath).
pub fn watch(source: WatchSource, callback: Callback, options: WatchOptions) -> Result<WatchHandle> {
    let (getter, expression): (Getter, String) = match source {
        WatchSource::Path { root, path } => {
            let segments = parse_path(&path).inspect_err(|err| diagnostics::warn(err.to_string()))?;
            let getter = Arc::new(move || Ok(resolve_path(&root, &segments)));
            (getter, path)
        }
        WatchSource::Getter(getter) => (getter, String::from("<function>")),
    };

    let watcher = Watcher::new(
        getter,
        Some(callback.clone()),
        WatcherOptions {
            deep: options.deep,
            user: true,
            sync: options.sync,
            expression: Some(expression),
            ..Default::default()
        },
    )?;

    if options.immediate {
        if let Err(err) = callback(&watcher.value(), &Value::Null) {
            watcher.report(&err, "callback");
        }
    }

    Ok(WatchHandle { watcher })
}
