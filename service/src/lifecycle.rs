//! Starting and stopping the observer worker.

use crate::comm::Connection;
use crate::error::AlreadyStarted;
use crate::logging::Logger;
use crate::observer::Observer;
use crate::shutdown::{ShutdownSignal, WorkerGroup};
use async_std::task;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Lifecycle {
    shutdown: ShutdownSignal,
    workers: Arc<WorkerGroup>,
    started: AtomicBool,
    logger: Logger,
}

impl Lifecycle {
    pub fn new(logger: Logger) -> Self {
        Self {
            shutdown: ShutdownSignal::new(),
            workers: WorkerGroup::new(),
            started: AtomicBool::new(false),
            logger,
        }
    }

    /// A lifecycle with the observer already running. `observer` builds it around the shutdown
    /// signal it has to watch.
    pub fn started(logger: Logger, observer: impl FnOnce(ShutdownSignal) -> Observer) -> Self {
        let lifecycle = Self::new(logger);
        lifecycle.started.store(true, Ordering::SeqCst);
        lifecycle.spawn(observer(lifecycle.signal()));
        lifecycle
    }

    /// The signal the observer has to watch.
    pub fn signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Spawn the observer. Only one may ever run per lifecycle since it is the sole owner of the
    /// subscription.
    pub fn start(&self, observer: Observer) -> Result<(), AlreadyStarted> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AlreadyStarted);
        }
        self.spawn(observer);
        Ok(())
    }

    fn spawn(&self, observer: Observer) {
        let guard = self.workers.add();
        let _ = task::spawn(observer.run(guard));
        self.logger.debug(format_args!("header observer started"));
    }

    pub fn outstanding(&self) -> usize {
        self.workers.outstanding()
    }

    /// Signal the observer, block until it has exited, then close the connection.
    ///
    /// Any number of calls, including overlapping ones, are fine: the signal fires once, waiting
    /// on an exhausted worker group returns immediately and the connection closes once.
    pub fn shutdown(&self, conn: &Connection) {
        if self.shutdown.fire() {
            self.logger.info(format_args!("shutting down"));
        }
        self.workers.wait();
        conn.close();
    }
}
