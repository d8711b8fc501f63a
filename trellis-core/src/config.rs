//! Runtime Configuration
//!
//! Knobs for the reactive runtime. Like the evaluation-context stack and the
//! scheduler queue, settings are confined to the thread that drives the UI:
//! each such thread owns its own copy, seeded from [`Config::default`].
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::config::{self, Config};
//!
//! let cfg = Config::from_json(r#"{ "async_flush": false }"#)?;
//! config::install(cfg);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Re-entries of a single watcher within one flush before it is reported as
/// a probable circular update.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defer watcher re-evaluation to the next tick. When false, every
    /// queued watcher flushes synchronously (useful for tests).
    pub async_flush: bool,

    /// Re-entry threshold used by the scheduler's circular-update guard.
    pub max_update_count: usize,

    /// Emit developer warnings (duplicate keys, invalid paths, ...).
    pub dev_warnings: bool,

    /// Suppress all warnings and reported errors.
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_flush: true,
            max_update_count: MAX_UPDATE_COUNT,
            dev_warnings: cfg!(debug_assertions),
            silent: false,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }
}

/// Callback receiving reported errors together with a short description of
/// where they happened (e.g. `"callback for watcher \"user.name\""`).
pub type ErrorHandler = Rc<dyn Fn(&Error, &str)>;

/// Callback receiving developer warnings.
pub type WarnHandler = Rc<dyn Fn(&str)>;

struct Settings {
    config: Config,
    error_handler: Option<ErrorHandler>,
    warn_handler: Option<WarnHandler>,
}

thread_local! {
    static SETTINGS: RefCell<Settings> = RefCell::new(Settings {
        config: Config::default(),
        error_handler: None,
        warn_handler: None,
    });
}

/// Replace the active configuration.
pub fn install(config: Config) {
    SETTINGS.with(|s| s.borrow_mut().config = config);
}

/// Snapshot of the active configuration.
pub fn current() -> Config {
    SETTINGS.with(|s| s.borrow().config.clone())
}

/// Modify the active configuration in place.
pub fn update<F>(f: F)
where
    F: FnOnce(&mut Config),
{
    SETTINGS.with(|s| f(&mut s.borrow_mut().config));
}

/// Install (or clear) the handler for reported errors.
pub fn set_error_handler(handler: Option<ErrorHandler>) {
    SETTINGS.with(|s| s.borrow_mut().error_handler = handler);
}

/// Install (or clear) the handler for developer warnings.
pub fn set_warn_handler(handler: Option<WarnHandler>) {
    SETTINGS.with(|s| s.borrow_mut().warn_handler = handler);
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    SETTINGS.with(|s| s.borrow().error_handler.clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    SETTINGS.with(|s| s.borrow().warn_handler.clone())
}
