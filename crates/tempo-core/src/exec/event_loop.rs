use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::{Result, SchedulerError};

/// A single-threaded runtime on its own thread.
///
/// - cooperative jobs are spawned onto it and interleave at their await
///   points; no thread is created per job
/// - blocking jobs go to its blocking pool, capped at `blocking_threads`
/// - `close()` stops the loop and drops whatever cooperative work is still
///   in flight; blocking jobs already running finish on their own threads
pub struct EventLoop {
    handle: Handle,
    closed: AtomicBool,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    pub fn spawn(blocking_threads: usize) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(blocking_threads.max(1))
            .thread_name("tempo-worker")
            .build()
            .map_err(SchedulerError::Runtime)?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("tempo-event-loop".to_string())
            .spawn(move || {
                // spawned jobs make progress while this block_on is parked
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                runtime.shutdown_background();
                debug!("event loop stopped");
            })
            .map_err(SchedulerError::Runtime)?;

        Ok(Self {
            handle,
            closed: AtomicBool::new(false),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the loop. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(());
        }
        let thread = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(thread) = thread {
            // closed from one of its own tasks: the loop exits on its own
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                error!("event loop thread panicked");
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.close();
    }
}
