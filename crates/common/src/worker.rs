//! Isolated workers and cooperative cancellation.
//!
//! A [`Worker`] runs one job on a dedicated, named OS thread and reports
//! back over an unbounded channel, so messages arrive in send order. The
//! job owns everything it was given. Termination is cooperative: the job
//! polls [`WorkerContext::is_terminated`] and the host stops listening
//! immediately. A panicking job closes the channel without a terminal
//! message; the host sees that as a crash.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::error::{ReelcapError, ReelcapResult};

/// The job's side of a worker.
pub struct WorkerContext<M> {
    tx: UnboundedSender<M>,
    terminate: Arc<AtomicBool>,
}

impl<M> Clone for WorkerContext<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            terminate: Arc::clone(&self.terminate),
        }
    }
}

impl<M> WorkerContext<M> {
    /// Send a message to the host. Returns `false` once the host is gone.
    pub fn send(&self, message: M) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Whether the host asked the job to stop.
    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}

/// The host's handle on a running job.
pub struct Worker<M> {
    name: String,
    rx: UnboundedReceiver<M>,
    terminate: Arc<AtomicBool>,
    crash: Arc<Mutex<Option<String>>>,
}

impl<M: Send + 'static> Worker<M> {
    /// Start `job` on a new thread named `name`.
    pub fn spawn<F>(name: &str, job: F) -> ReelcapResult<Self>
    where
        F: FnOnce(WorkerContext<M>) + Send + 'static,
    {
        let (tx, rx) = unbounded_channel();
        let terminate = Arc::new(AtomicBool::new(false));
        let crash = Arc::new(Mutex::new(None));

        let ctx = WorkerContext {
            tx: tx.clone(),
            terminate: Arc::clone(&terminate),
        };
        let crash_slot = Arc::clone(&crash);
        let thread_name = name.to_string();

        std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                // Held until the crash detail is recorded, so the host never
                // observes a closed channel with an empty detail.
                let keepalive = tx;
                let result = std::panic::catch_unwind(AssertUnwindSafe(move || job(ctx)));
                if let Err(payload) = result {
                    let detail = panic_message(payload.as_ref());
                    tracing::error!(worker = %thread_name, detail = %detail, "Worker panicked");
                    if let Ok(mut slot) = crash_slot.lock() {
                        *slot = Some(detail);
                    }
                }
                drop(keepalive);
            })
            .map_err(|e| {
                ReelcapError::resource_exhaustion(format!("Failed to start {name} worker: {e}"))
            })?;

        tracing::debug!(worker = name, "Worker started");

        Ok(Self {
            name: name.to_string(),
            rx,
            terminate,
            crash,
        })
    }
}

impl<M> Worker<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next message, or `None` once the job has exited.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// Ask the job to stop. Further messages are discarded.
    pub fn terminate(&mut self) {
        if !self.terminate.swap(true, Ordering::SeqCst) {
            tracing::debug!(worker = %self.name, "Worker terminated");
        }
        self.rx.close();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Panic message of a crashed job; empty if it did not panic.
    pub fn crash_detail(&self) -> String {
        self.crash
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_default()
    }
}

impl<M> Drop for Worker<M> {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Cloneable cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag before reusing the handle for a new run.
    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::SeqCst);
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
