//! Error reporting and developer warnings.
//!
//! Failures inside watchers, callbacks and render functions never unwind
//! through the runtime. They are handed to [`handle_error`], which forwards
//! them to the installed error handler or logs them with `tracing`.

use crate::config;
use crate::error::Error;

/// Report an error that the runtime recovered from.
///
/// `info` names the place the error came from, e.g. `"render"` or
/// `"callback for watcher \"count\""`.
pub fn handle_error(err: &Error, info: &str) {
    let cfg = config::current();
    if cfg.silent {
        return;
    }
    match config::error_handler() {
        Some(handler) => handler(err, info),
        None => tracing::error!(%err, info, "error in {info}"),
    }
}

/// Emit a developer warning. Warnings are dropped unless development
/// warnings are enabled.
pub fn warn(message: impl AsRef<str>) {
    let cfg = config::current();
    if cfg.silent || !cfg.dev_warnings {
        return;
    }
    let message = message.as_ref();
    match config::warn_handler() {
        Some(handler) => handler(message),
        None => tracing::warn!("{message}"),
    }
}
