//! A scripted in-process node used by the tests in place of a real endpoint.

use crate::chain_data::{BlockTag, Bytes, CallRequest, Header};
use crate::comm::{ChainHandle, Dialer, HeaderSubscription, RpcHandle};
use crate::error::{CallError, ConnectionError, Error, SubscriptionError};
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::prelude::*;
use log::{Level, Log, Metadata, Record};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type Feed = mpsc::UnboundedSender<Result<Header, SubscriptionError>>;

#[derive(Default)]
struct State {
    dials: usize,
    // Handles dialed in an earlier generation report themselves disconnected.
    generation: u64,
    down: bool,
    fail_rpc_dial: bool,
    fail_chain_dial: bool,
    open_handles: usize,
    closed_handles: usize,
    failing_methods: HashSet<String>,
    responses: HashMap<String, Value>,
    requests: HashMap<String, usize>,
    contract_calls: Vec<(CallRequest, BlockTag)>,
    subscribe_failures_left: usize,
    subscribe_attempts: Vec<Instant>,
    subscriptions: usize,
    unsubscribes: usize,
    feed: Option<Feed>,
    pending: Vec<Header>,
    pulled: usize,
}

pub fn header(number: u64) -> Header {
    Header {
        number: format!("{:#x}", number),
        hash: format!("0x{:064x}", number + 1),
        parent_hash: format!("0x{:064x}", number),
        timestamp: None,
    }
}

#[derive(Clone, Default)]
pub struct StubNode {
    state: Arc<Mutex<State>>,
}

impl StubNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<State> {
        self.state.lock().unwrap()
    }

    pub fn dialer(&self) -> Arc<dyn Dialer> {
        Arc::new(StubDialer { node: self.clone() })
    }

    pub fn fail_rpc_dial(&self) {
        self.state().fail_rpc_dial = true;
    }

    pub fn fail_chain_dial(&self) {
        self.state().fail_chain_dial = true;
    }

    pub fn fail_calls_to(&self, method: &str) {
        self.state().failing_methods.insert(method.to_string());
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.state().responses.insert(method.to_string(), value);
    }

    /// The next `n` subscribe requests are refused.
    pub fn fail_subscribes(&self, n: usize) {
        self.state().subscribe_failures_left = n;
    }

    /// Deliver a header on the live subscription, or on the next one if there is none.
    pub fn send_header(&self, header: Header) {
        let mut state = self.state();
        let header = match state.feed.as_ref() {
            Some(feed) => match feed.unbounded_send(Ok(header)) {
                Ok(()) => return,
                Err(err) => match err.into_inner() {
                    Ok(header) => header,
                    Err(_) => return,
                },
            },
            None => header,
        };
        state.pending.push(header);
    }

    /// Terminate the live subscription with the given error.
    pub fn break_stream(&self, err: SubscriptionError) {
        if let Some(feed) = self.state().feed.take() {
            let _ = feed.unbounded_send(Err(err));
        }
    }

    /// Drop the transport like a node restart would: live streams end, every handle dialed so
    /// far is dead and dials are refused until [`StubNode::come_back`].
    pub fn go_down(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.down = true;
        state.feed = None;
    }

    pub fn come_back(&self) {
        self.state().down = false;
    }

    pub fn dials(&self) -> usize {
        self.state().dials
    }

    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    pub fn closed_handles(&self) -> usize {
        self.state().closed_handles
    }

    pub fn requests(&self, method: &str) -> usize {
        self.state().requests.get(method).copied().unwrap_or(0)
    }

    pub fn contract_calls(&self) -> Vec<(CallRequest, BlockTag)> {
        self.state().contract_calls.clone()
    }

    pub fn subscribe_attempts(&self) -> Vec<Instant> {
        self.state().subscribe_attempts.clone()
    }

    pub fn subscriptions(&self) -> usize {
        self.state().subscriptions
    }

    pub fn unsubscribes(&self) -> usize {
        self.state().unsubscribes
    }

    /// How many headers the subscriber has taken off the live streams.
    pub fn pulled(&self) -> usize {
        self.state().pulled
    }
}

pub struct StubDialer {
    node: StubNode,
}

impl Dialer for StubDialer {
    fn dial_rpc<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RpcHandle>, ConnectionError>> {
        let mut state = self.node.state();
        state.dials += 1;
        let result = if state.fail_rpc_dial || state.down {
            Err(ConnectionError::new(endpoint, "connection refused"))
        } else {
            state.open_handles += 1;
            let handle: Arc<dyn RpcHandle> = Arc::new(StubRpc {
                node: self.node.clone(),
                generation: state.generation,
            });
            Ok(handle)
        };
        future::ready(result).boxed()
    }

    fn dial_chain<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn ChainHandle>, ConnectionError>> {
        let mut state = self.node.state();
        state.dials += 1;
        let result = if state.fail_chain_dial || state.down {
            Err(ConnectionError::new(endpoint, "connection refused"))
        } else {
            state.open_handles += 1;
            let handle: Arc<dyn ChainHandle> = Arc::new(StubChain {
                node: self.node.clone(),
                generation: state.generation,
            });
            Ok(handle)
        };
        future::ready(result).boxed()
    }
}

fn restart_required(method: &str) -> CallError {
    CallError::Rpc {
        method: method.to_string(),
        message: "connection closed; restart required".to_string(),
    }
}

fn close_handle(node: &StubNode) {
    let mut state = node.state();
    state.open_handles -= 1;
    state.closed_handles += 1;
}

struct StubRpc {
    node: StubNode,
    generation: u64,
}

impl Drop for StubRpc {
    fn drop(&mut self) {
        close_handle(&self.node);
    }
}

impl RpcHandle for StubRpc {
    fn request<'a>(
        &'a self,
        method: &'a str,
        _params: Vec<Value>,
    ) -> BoxFuture<'a, Result<Value, CallError>> {
        let mut state = self.node.state();
        *state.requests.entry(method.to_string()).or_insert(0) += 1;
        let result = if state.generation != self.generation {
            Err(restart_required(method))
        } else if state.failing_methods.contains(method) {
            Err(CallError::Rpc {
                method: method.to_string(),
                message: "stub failure".to_string(),
            })
        } else {
            Ok(state.responses.get(method).cloned().unwrap_or(Value::Null))
        };
        future::ready(result).boxed()
    }

    fn is_connected(&self) -> bool {
        self.node.state().generation == self.generation
    }
}

struct StubChain {
    node: StubNode,
    generation: u64,
}

impl Drop for StubChain {
    fn drop(&mut self) {
        close_handle(&self.node);
    }
}

impl ChainHandle for StubChain {
    fn subscribe_new_heads(
        &self,
    ) -> BoxFuture<'_, Result<Box<dyn HeaderSubscription>, SubscriptionError>> {
        let mut state = self.node.state();
        state.subscribe_attempts.push(Instant::now());
        let result = if state.generation != self.generation {
            Err(SubscriptionError::Subscribe(
                restart_required("eth_subscribe").to_string(),
            ))
        } else if state.subscribe_failures_left > 0 {
            state.subscribe_failures_left -= 1;
            Err(SubscriptionError::Subscribe("stub refused".to_string()))
        } else {
            let (feed, rx) = mpsc::unbounded();
            for header in state.pending.drain(..) {
                let _ = feed.unbounded_send(Ok(header));
            }
            state.feed = Some(feed);
            state.subscriptions += 1;
            let subs: Box<dyn HeaderSubscription> = Box::new(StubHeads {
                node: self.node.clone(),
                rx,
            });
            Ok(subs)
        };
        future::ready(result).boxed()
    }

    fn call_contract<'a>(
        &'a self,
        call: &'a CallRequest,
        block: BlockTag,
    ) -> BoxFuture<'a, Result<Bytes, Error>> {
        let mut state = self.node.state();
        state.contract_calls.push((call.clone(), block));
        let result = if state.failing_methods.contains("eth_call") {
            Err(CallError::Rpc {
                method: "eth_call".to_string(),
                message: "stub failure".to_string(),
            }
            .into())
        } else {
            Ok(Bytes(vec![0x2a]))
        };
        future::ready(result).boxed()
    }

    fn block_number(&self) -> BoxFuture<'_, Result<u64, Error>> {
        let result = if self.is_connected() {
            Ok(0x10)
        } else {
            Err(restart_required("eth_blockNumber").into())
        };
        future::ready(result).boxed()
    }

    fn is_connected(&self) -> bool {
        self.node.state().generation == self.generation
    }
}

struct StubHeads {
    node: StubNode,
    rx: mpsc::UnboundedReceiver<Result<Header, SubscriptionError>>,
}

impl HeaderSubscription for StubHeads {
    fn next(&mut self) -> BoxFuture<'_, Result<Header, SubscriptionError>> {
        Box::pin(async move {
            match self.rx.next().await {
                Some(Ok(header)) => {
                    self.node.state().pulled += 1;
                    Ok(header)
                }
                Some(Err(err)) => Err(err),
                None => Err(SubscriptionError::Closed),
            }
        })
    }

    fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<(), SubscriptionError>> {
        let mut state = self.node.state();
        state.unsubscribes += 1;
        state.feed = None;
        future::ready(Ok(())).boxed()
    }
}

/// Collects every record logged through it.
#[derive(Default)]
pub struct CapturedLogs {
    records: Mutex<Vec<(Level, String)>>,
}

impl CapturedLogs {
    pub fn count(&self, level: Level, needle: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, msg)| *l == level && msg.contains(needle))
            .count()
    }
}

impl Log for CapturedLogs {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Like [`wait_until`] but without blocking the executor.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        async_std::task::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
