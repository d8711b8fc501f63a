//! Tick Deferral
//!
//! [`next_tick`] collects callbacks into a per-thread batch. The first
//! callback of a batch asks the installed [`TickDriver`] to schedule a flush;
//! the flush runs the whole batch in order. Callbacks queued while a batch is
//! running land in the next batch.
//!
//! # Drivers
//!
//! - [`TokioTicker`]: wakes a local loop on the tokio runtime. The loop must
//!   be spawned on a `LocalSet` on the UI thread, since batches are
//!   thread-local.
//! - No driver: batches are flushed when a [`NextTick`] is awaited, or
//!   explicitly with [`flush_ticks`]. The first such batch on a thread logs
//!   a development warning.
//!
//! ```rust,ignore
//! let local = tokio::task::LocalSet::new();
//! local.spawn_local(TokioTicker::install().run());
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{oneshot, Notify};

/// Something able to run [`flush_ticks`] "soon" on the UI thread.
pub trait TickDriver {
    /// A batch became pending.
    fn schedule(&self);
}

type Callback = Box<dyn FnOnce()>;

#[derive(Default)]
struct TickQueue {
    callbacks: Vec<Callback>,
    pending: bool,
    driver: Option<Rc<dyn TickDriver>>,
    warned_driverless: bool,
}

thread_local! {
    static TICKS: RefCell<TickQueue> = RefCell::new(TickQueue::default());
}

/// Install (or remove) this thread's tick driver.
pub fn set_driver(driver: Option<Rc<dyn TickDriver>>) {
    TICKS.with(|t| t.borrow_mut().driver = driver);
}

/// Whether this thread has a tick driver.
pub fn has_driver() -> bool {
    TICKS.with(|t| t.borrow().driver.is_some())
}

/// Whether callbacks are waiting for the next flush.
pub fn is_pending() -> bool {
    TICKS.with(|t| t.borrow().pending)
}

/// Defer `callback` to the next tick.
///
/// The returned future resolves once the callback has run. Dropping it does
/// not cancel the callback.
pub fn next_tick<F>(callback: F) -> NextTick
where
    F: FnOnce() + 'static,
{
    let (tx, rx) = oneshot::channel();
    let wrapped: Callback = Box::new(move || {
        callback();
        let _ = tx.send(());
    });

    let (driver, warn_driverless) = TICKS.with(|t| {
        let mut t = t.borrow_mut();
        t.callbacks.push(wrapped);
        if t.pending {
            return (None, false);
        }
        t.pending = true;
        let warn = t.driver.is_none() && !std::mem::replace(&mut t.warned_driverless, true);
        (t.driver.clone(), warn)
    });
    if let Some(driver) = driver {
        driver.schedule();
    }
    if warn_driverless {
        crate::diagnostics::warn(
            "a tick was scheduled but no tick driver is installed on this thread; \
             deferred updates only run when a NextTick is awaited or flush_ticks() is called \
             (install a TokioTicker to flush automatically)",
        );
    }

    NextTick { rx }
}

/// Run the pending batch now. Returns the number of callbacks run.
pub fn flush_ticks() -> usize {
    let batch = TICKS.with(|t| {
        let mut t = t.borrow_mut();
        t.pending = false;
        std::mem::take(&mut t.callbacks)
    });
    let count = batch.len();
    if count > 0 {
        tracing::trace!(callbacks = count, "tick flush");
    }
    for callback in batch {
        callback();
    }
    count
}

/// Resolves once the callback passed to [`next_tick`] has run.
#[must_use = "futures do nothing unless awaited"]
pub struct NextTick {
    rx: oneshot::Receiver<()>,
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if !has_driver() && is_pending() {
            flush_ticks();
        }
        // A dropped sender means the batch was discarded; nothing left to wait for.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

/// Tick driver backed by a tokio task.
#[derive(Clone, Default)]
pub struct TokioTicker {
    notify: Arc<Notify>,
}

impl TokioTicker {
    /// Install a new ticker as this thread's driver and return it.
    pub fn install() -> Self {
        let ticker = Self::default();
        set_driver(Some(Rc::new(ticker.clone())));
        ticker
    }

    /// The flush loop. Spawn it with `spawn_local` on the UI thread.
    pub async fn run(self) {
        loop {
            self.notify.notified().await;
            flush_ticks();
        }
    }
}

impl TickDriver for TokioTicker {
    fn schedule(&self) {
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn callbacks_run_in_order_as_one_batch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            let _ = next_tick(move || log.borrow_mut().push(i));
        }
        assert!(is_pending());
        assert!(log.borrow().is_empty());

        assert_eq!(flush_ticks(), 3);
        assert_eq!(*log.borrow(), [0, 1, 2]);
        assert!(!is_pending());
    }

    #[test]
    fn callbacks_queued_during_a_flush_wait_for_the_next_one() {
        let ran = Rc::new(Cell::new(0));
        let inner = ran.clone();
        let _ = next_tick(move || {
            let again = inner.clone();
            let _ = next_tick(move || again.set(again.get() + 1));
            inner.set(inner.get() + 1);
        });

        flush_ticks();
        assert_eq!(ran.get(), 1);
        flush_ticks();
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn driverless_ticks_warn_once_per_thread() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        crate::config::update(|c| c.dev_warnings = true);
        crate::config::set_warn_handler(Some(Rc::new(move |m: &str| {
            sink.borrow_mut().push(m.to_string())
        })));

        let _ = next_tick(|| {});
        let _ = next_tick(|| {});
        flush_ticks();
        let _ = next_tick(|| {});
        flush_ticks();

        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].contains("no tick driver is installed"));

        crate::config::set_warn_handler(None);
        crate::config::install(crate::config::Config::default());
    }

    #[tokio::test]
    async fn awaiting_without_a_driver_flushes() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        next_tick(move || flag.set(true)).await;
        assert!(ran.get());
    }

    #[tokio::test]
    async fn tokio_ticker_flushes_on_the_local_set() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let ticker = TokioTicker::install();
                let loop_task = tokio::task::spawn_local(ticker.run());

                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                next_tick(move || flag.set(true)).await;
                assert!(ran.get());

                loop_task.abort();
                set_driver(None);
            })
            .await;
    }
}
