//! The background worker that keeps a header subscription alive and relays the headers.
//!
//! The worker is a small state machine:
//!
//! - `Unsubscribed`: try to subscribe. On failure wait for the retry interval or for shutdown,
//!   whichever comes first, then try again. Failures are never fatal.
//! - `Subscribed`: wait for the next header, a stream error or shutdown. Headers go to the relay
//!   buffer in the order they arrive. A stream error drops the subscription and goes back to
//!   `Unsubscribed`. Shutdown unsubscribes first.
//! - `Terminated`: the worker exits.
//!
//! The subscription lives in the state and nowhere else.

use crate::chain_data::Header;
use crate::comm::{Connection, HeaderSubscription};
use crate::logging::Logger;
use crate::shutdown::{ShutdownSignal, WorkerGuard};
use async_std::channel::Sender;
use async_std::sync::Arc;
use async_std::task;
use atomic::Atomic;
use futures::{future::FutureExt, pin_mut, select};
use std::time::Duration;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObserverState {
    Unsubscribed,
    Subscribed,
    Terminated,
}

/// A snapshot of what the observer is doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub state: ObserverState,
    pub subscribe_attempts: u64,
    pub subscribe_failures: u64,
    pub stream_failures: u64,
    pub headers_relayed: u64,
    pub last_block: Option<u64>,
}

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            state: ObserverState::Unsubscribed,
            subscribe_attempts: 0,
            subscribe_failures: 0,
            stream_failures: 0,
            headers_relayed: 0,
            last_block: None,
        }
    }
}

enum State {
    Unsubscribed,
    Subscribed(Box<dyn HeaderSubscription>),
    Terminated,
}

impl State {
    fn kind(&self) -> ObserverState {
        match self {
            State::Unsubscribed => ObserverState::Unsubscribed,
            State::Subscribed(_) => ObserverState::Subscribed,
            State::Terminated => ObserverState::Terminated,
        }
    }
}

enum Event {
    Shutdown,
    Header(Header),
    StreamFailed(crate::error::SubscriptionError),
}

pub struct Observer {
    pub(crate) conn: Arc<Connection>,
    pub(crate) relay: Sender<Header>,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) retry_interval: Duration,
    pub(crate) logger: Logger,
    // Unfortunately, the struct is bigger than the modern hardware can atomically read or write so
    // we rely on the fallback mode.
    pub(crate) status: Arc<Atomic<StatusReport>>,
}

impl Observer {
    /// Drive the state machine until shutdown. `_guard` marks the worker as done when dropped.
    pub async fn run(self, _guard: WorkerGuard) {
        let mut report = self.status.load(atomic::Ordering::SeqCst);
        let mut state = State::Unsubscribed;
        loop {
            report.state = state.kind();
            self.status.store(report, atomic::Ordering::SeqCst);

            state = match state {
                State::Unsubscribed => self.subscribe(&mut report).await,
                State::Subscribed(subs) => self.relay_next(subs, &mut report).await,
                State::Terminated => break,
            };
        }
        self.logger.debug(format_args!("header observer exited"));
    }

    async fn subscribe(&self, report: &mut StatusReport) -> State {
        if self.shutdown.is_fired() {
            return State::Terminated;
        }

        report.subscribe_attempts += 1;
        match self.conn.subscribe_new_heads().await {
            Ok(subs) => {
                self.logger.info(format_args!(
                    "subscribed to new heads on {}",
                    self.conn.endpoint()
                ));
                State::Subscribed(subs)
            }
            Err(err) => {
                report.subscribe_failures += 1;
                self.status.store(*report, atomic::Ordering::SeqCst);
                self.logger.error(format_args!(
                    "failed to subscribe to new heads: {}. Retrying in {:?}",
                    err, self.retry_interval
                ));

                let retry = task::sleep(self.retry_interval).fuse();
                let stop = self.shutdown.wait().fuse();
                pin_mut!(retry, stop);
                select! {
                    _ = retry => State::Unsubscribed,
                    _ = stop => State::Terminated,
                }
            }
        }
    }

    async fn relay_next(
        &self,
        mut subs: Box<dyn HeaderSubscription>,
        report: &mut StatusReport,
    ) -> State {
        let event = {
            let next = subs.next().fuse();
            let stop = self.shutdown.wait().fuse();
            pin_mut!(next, stop);
            select! {
                _ = stop => Event::Shutdown,
                header = next => match header {
                    Ok(header) => Event::Header(header),
                    Err(err) => Event::StreamFailed(err),
                },
            }
        };

        match event {
            Event::Shutdown => self.unsubscribe(subs).await,
            Event::StreamFailed(err) => {
                report.stream_failures += 1;
                self.logger
                    .error(format_args!("new heads subscription failed: {}", err));
                drop(subs);
                State::Unsubscribed
            }
            Event::Header(header) => {
                let block = header.block_number().ok();
                let sent = {
                    let send = self.relay.send(header).fuse();
                    let stop = self.shutdown.wait().fuse();
                    pin_mut!(send, stop);
                    select! {
                        res = send => Some(res.is_ok()),
                        _ = stop => None,
                    }
                };
                match sent {
                    Some(true) => {
                        report.headers_relayed += 1;
                        report.last_block = block.or(report.last_block);
                        State::Subscribed(subs)
                    }
                    Some(false) => {
                        self.logger
                            .warn(format_args!("the relay buffer is closed, stopping"));
                        self.unsubscribe(subs).await
                    }
                    None => self.unsubscribe(subs).await,
                }
            }
        }
    }

    async fn unsubscribe(&self, subs: Box<dyn HeaderSubscription>) -> State {
        if let Err(err) = subs.unsubscribe().await {
            self.logger
                .warn(format_args!("failed to unsubscribe from new heads: {}", err));
        }
        State::Terminated
    }
}
