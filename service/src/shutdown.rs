//! Primitives that coordinate stopping the background worker.

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

struct SignalInner {
    fired: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<()>>>,
    rx: Shared<oneshot::Receiver<()>>,
}

/// A signal that is fired at most once and can be awaited by any number of clones.
///
/// Dropping every clone that could fire it counts as firing: the waiters resolve either way.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            inner: Arc::new(SignalInner {
                fired: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
                rx: rx.shared(),
            }),
        }
    }

    /// Fire the signal. Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        let tx = self
            .inner
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match tx {
            Some(tx) => {
                self.inner.fired.store(true, Ordering::SeqCst);
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is fired.
    pub async fn wait(&self) {
        let _ = self.inner.rx.clone().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts the background workers that have not exited yet.
#[derive(Default)]
pub struct WorkerGroup {
    outstanding: Mutex<usize>,
    all_done: Condvar,
}

impl WorkerGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a worker. The worker is accounted as done when the guard is dropped, which also
    /// covers a worker that panics.
    pub fn add(self: &Arc<Self>) -> WorkerGuard {
        *self.outstanding.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        WorkerGuard {
            group: Arc::clone(self),
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block the calling thread until every registered worker is done.
    pub fn wait(&self) {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        while *outstanding > 0 {
            outstanding = self
                .all_done
                .wait(outstanding)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn done(&self) {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        *outstanding -= 1;
        if *outstanding == 0 {
            self.all_done.notify_all();
        }
    }
}

pub struct WorkerGuard {
    group: Arc<WorkerGroup>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.group.done();
    }
}
