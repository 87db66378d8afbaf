// ============================================================================
// File: src/event.rs
// ----------------------------------------------------------------------------
// Asynchronous execution context for out-of-band event delivery.
//
// Death notifications and access-point events must never run on the thread
// that issued a control operation. EventContext queues closures onto a
// single consumer task, so deliveries are ordered and serialized with
// respect to each other.
// ============================================================================

use log::warn;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the event delivery context.
///
/// Cloning is cheap; all clones feed the same consumer task. The task exits
/// once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct EventContext {
    tx: mpsc::UnboundedSender<Job>,
    handle: Handle,
}

impl EventContext {
    /// Create an event context whose consumer task runs on `handle`.
    pub fn new(handle: Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Self { tx, handle }
    }

    /// Create an event context on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime, same as `Handle::current`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Queue a closure for execution on the event task.
    ///
    /// Posting never blocks. If the runtime has already shut down the job is
    /// dropped with a warning; there is nothing useful left to deliver to.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            warn!("event context is gone; dropping posted event");
        }
    }

    /// Runtime handle backing this context.
    ///
    /// Backends use it to drive their channel I/O from synchronous call
    /// sites (`Handle::block_on`) and to spawn watcher tasks.
    pub fn runtime(&self) -> &Handle {
        &self.handle
    }
}
