//! Async Components
//!
//! An [`AsyncComponent`] stands in for a component whose definition is not
//! available yet. Its loader runs the first time a render asks for it and
//! hands the definition back through an [`AsyncResolver`], either right away
//! or later.
//!
//! Until the definition arrives a render gets the loading component, if one
//! was given, or an empty placeholder node. Every component that rendered
//! while the load was in flight is re-rendered once it resolves. A failed
//! load renders the error component, if any, and re-renders the same way.
//!
//! Resolution re-renders through the scheduler, so the resolver must be
//! called on the thread that renders.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::diagnostics;
use crate::reactive::ReactiveContext;

use super::vnode::{ComponentFactory, RenderOwner};

/// Starts loading the definition. Runs at most once.
pub type Loader = Box<dyn FnOnce(AsyncResolver) + Send>;

#[derive(Default)]
struct AsyncState {
    resolved: Option<Arc<dyn ComponentFactory>>,
    failed: bool,
    started: bool,
    /// The loader is running inside a render.
    in_loader: bool,
    loading: Option<Arc<dyn ComponentFactory>>,
    error: Option<Arc<dyn ComponentFactory>>,
    /// Components waiting for the definition.
    owners: Vec<Weak<dyn RenderOwner>>,
}

struct AsyncInner {
    name: String,
    loader: Mutex<Option<Loader>>,
    state: Mutex<AsyncState>,
}

/// A lazily loaded component. Cloning yields another handle to the same
/// load; placeholders are only patched in place when they share it.
#[derive(Clone)]
pub struct AsyncComponent(Arc<AsyncInner>);

impl AsyncComponent {
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: FnOnce(AsyncResolver) + Send + 'static,
    {
        Self(Arc::new(AsyncInner {
            name: name.into(),
            loader: Mutex::new(Some(Box::new(loader))),
            state: Mutex::new(AsyncState::default()),
        }))
    }

    /// Rendered while the load is in flight.
    pub fn loading(self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.0.state.lock().loading = Some(factory);
        self
    }

    /// Rendered after the load failed.
    pub fn error(self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.0.state.lock().error = Some(factory);
        self
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_resolved(&self) -> bool {
        self.0.state.lock().resolved.is_some()
    }

    pub fn has_failed(&self) -> bool {
        self.0.state.lock().failed
    }

    pub fn ptr_eq(&self, other: &AsyncComponent) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The factory a render should use right now, starting the load on first
    /// use. `None` means "render a placeholder". `owner` is re-rendered when
    /// the outcome changes.
    pub(crate) fn resolve(&self, owner: Option<Weak<dyn RenderOwner>>) -> Option<Arc<dyn ComponentFactory>> {
        {
            let mut st = self.0.state.lock();
            if st.failed && st.error.is_some() {
                return st.error.clone();
            }
            if st.resolved.is_some() {
                return st.resolved.clone();
            }
            if let Some(owner) = owner {
                if !st.owners.iter().any(|o| o.ptr_eq(&owner)) {
                    st.owners.push(owner);
                }
            }
            if st.started {
                return if st.failed { None } else { st.loading.clone() };
            }
            st.started = true;
            st.in_loader = true;
        }

        let loader = self.0.loader.lock().take();
        if let Some(loader) = loader {
            tracing::debug!(component = %self.0.name, "loading async component");
            let _untracked = ReactiveContext::untracked();
            loader(AsyncResolver(self.0.clone()));
        }

        let mut st = self.0.state.lock();
        st.in_loader = false;
        if st.failed {
            st.error.clone()
        } else if st.resolved.is_some() {
            st.resolved.clone()
        } else {
            st.loading.clone()
        }
    }
}

impl fmt::Debug for AsyncComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.0.state.lock();
        f.debug_struct("AsyncComponent")
            .field("name", &self.0.name)
            .field("resolved", &st.resolved.is_some())
            .field("failed", &st.failed)
            .field("owners", &st.owners.len())
            .finish()
    }
}

/// Completes an [`AsyncComponent`]'s load. Only the first call to either
/// method counts.
#[derive(Clone)]
pub struct AsyncResolver(Arc<AsyncInner>);

impl AsyncResolver {
    /// The definition is available.
    pub fn resolve(&self, factory: Arc<dyn ComponentFactory>) {
        let owners = {
            let mut st = self.0.state.lock();
            if st.resolved.is_some() || st.failed {
                return;
            }
            st.resolved = Some(factory);
            let owners = std::mem::take(&mut st.owners);
            if st.in_loader {
                // The render that started the load picks it up directly.
                return;
            }
            owners
        };
        tracing::debug!(component = %self.0.name, owners = owners.len(), "async component resolved");
        force_render(owners);
    }

    /// The load failed.
    pub fn reject(&self, reason: impl fmt::Display) {
        let owners = {
            let mut st = self.0.state.lock();
            if st.resolved.is_some() || st.failed {
                return;
            }
            st.failed = true;
            if st.error.is_none() || st.in_loader {
                st.owners.clear();
                None
            } else {
                Some(std::mem::take(&mut st.owners))
            }
        };
        diagnostics::warn(format!(
            "Failed to resolve async component \"{}\": {reason}",
            self.0.name
        ));
        if let Some(owners) = owners {
            force_render(owners);
        }
    }
}

impl fmt::Debug for AsyncResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsyncResolver").field(&self.0.name).finish()
    }
}

fn force_render(owners: Vec<Weak<dyn RenderOwner>>) {
    for owner in owners.iter().filter_map(Weak::upgrade) {
        owner.force_render();
    }
}

// ---- Tests ----
