use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::scheduler::Shared;
use crate::error::panic_message;
use crate::exec::Executors;

/// Periodic scheduling worker, running as a task on the event loop.
/// - runs one tick every `check_interval`
/// - a fault inside a tick is logged and the loop keeps going
/// - `stop()` wakes the task immediately and waits for it
pub struct Ticker {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Ticker {
    pub(crate) fn spawn(shared: Arc<Shared>, executors: Arc<Executors>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = executors.event_loop().handle().clone();
        let join = handle.spawn(ticker_loop(shared, executors, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn stop(self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
        match futures::executor::block_on(self.join) {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("scheduler loop cancelled"),
            Err(e) => error!(error = %e, "scheduler loop panicked"),
        }
    }
}

async fn ticker_loop(
    shared: Arc<Shared>,
    executors: Arc<Executors>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let interval = shared.check_interval;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| shared.tick(&executors))) {
            Ok(report) if report.dispatched > 0 => {
                debug!(dispatched = report.dispatched, "scheduling cycle")
            }
            Ok(_) => {}
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(error = %detail, "error in scheduling cycle");
            }
        }

        // wait for the next tick; a stop signal or a dropped sender ends the loop
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("scheduler loop exiting");
}
