//! A module that abstracts all concerns regarding the connection to the node.
//!
//! The connection consists of two handles dialed against the same endpoint: a generic one that
//! can call any method, and a chain one that knows the typed chain calls and the header
//! subscription. Both are safe to share between threads once opened.

use crate::chain_data::{parse_quantity, BlockTag, Bytes, CallRequest, Header};
use crate::error::{CallError, ConnectionError, DecodeError, Error, SubscriptionError};
use crate::logging::Logger;
use futures::future::BoxFuture;
use futures::prelude::*;
use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// A generic request/response handle.
pub trait RpcHandle: Send + Sync {
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Vec<Value>,
    ) -> BoxFuture<'a, Result<Value, CallError>>;

    /// `false` once the transport under the handle is gone for good.
    fn is_connected(&self) -> bool;
}

/// A handle that speaks the typed chain calls.
pub trait ChainHandle: Send + Sync {
    fn subscribe_new_heads(
        &self,
    ) -> BoxFuture<'_, Result<Box<dyn HeaderSubscription>, SubscriptionError>>;

    fn call_contract<'a>(
        &'a self,
        call: &'a CallRequest,
        block: BlockTag,
    ) -> BoxFuture<'a, Result<Bytes, Error>>;

    fn block_number(&self) -> BoxFuture<'_, Result<u64, Error>>;

    fn is_connected(&self) -> bool;
}

/// A live stream of headers.
pub trait HeaderSubscription: Send {
    /// Resolves with the next header, or with the error that ended the stream. After an error
    /// the subscription is dead and should be dropped.
    fn next(&mut self) -> BoxFuture<'_, Result<Header, SubscriptionError>>;

    fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<(), SubscriptionError>>;
}

/// Opens handles to a node endpoint.
pub trait Dialer: Send + Sync {
    fn dial_rpc<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RpcHandle>, ConnectionError>>;

    fn dial_chain<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn ChainHandle>, ConnectionError>>;
}

#[derive(Clone)]
struct Handles {
    rpc: Arc<dyn RpcHandle>,
    chain: Arc<dyn ChainHandle>,
}

impl Handles {
    /// Dial both handles. If the second one fails the first is closed before returning.
    async fn dial(
        dialer: &dyn Dialer,
        endpoint: &str,
        logger: &Logger,
    ) -> Result<Self, ConnectionError> {
        let rpc = dialer.dial_rpc(endpoint).await?;
        match dialer.dial_chain(endpoint).await {
            Ok(chain) => Ok(Self { rpc, chain }),
            Err(err) => {
                logger.debug(format_args!(
                    "closing the rpc handle to {} since the chain handle failed to dial",
                    endpoint
                ));
                drop(rpc);
                Err(err)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.rpc.is_connected() && self.chain.is_connected()
    }
}

/// Owns the transport to a single node endpoint.
///
/// A transport that dropped is dialed again on the next use, so a node restart costs the
/// requests that were in flight but not the connection. Closing drops the connection's
/// references to the handles. A call that is already in flight holds its own reference and runs
/// to completion.
pub struct Connection {
    endpoint: String,
    dialer: Arc<dyn Dialer>,
    handles: Mutex<Option<Handles>>,
    // Serializes redials so that a dropped transport is replaced once.
    redial: futures::lock::Mutex<()>,
    logger: Logger,
}

impl Connection {
    pub async fn connect(
        dialer: Arc<dyn Dialer>,
        endpoint: &str,
        logger: Logger,
    ) -> Result<Self, ConnectionError> {
        let handles = Handles::dial(dialer.as_ref(), endpoint, &logger).await?;
        logger.info(format_args!("connected to {}", endpoint));

        Ok(Self {
            endpoint: endpoint.to_string(),
            dialer,
            handles: Mutex::new(Some(handles)),
            redial: futures::lock::Mutex::new(()),
            logger,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn current(&self) -> Result<Handles, CallError> {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.clone().ok_or(CallError::Closed)
    }

    /// The handles, dialed again first if the transport under them is gone.
    async fn live(&self) -> Result<Handles, CallError> {
        let handles = self.current()?;
        if handles.is_connected() {
            return Ok(handles);
        }
        drop(handles);

        let _redial = self.redial.lock().await;
        let handles = self.current()?;
        if handles.is_connected() {
            // Someone else has redialed while we waited.
            return Ok(handles);
        }
        drop(handles);
        self.logger.warn(format_args!(
            "lost the connection to {}, dialing again",
            self.endpoint
        ));
        let fresh = Handles::dial(self.dialer.as_ref(), &self.endpoint, &self.logger).await?;

        let mut slot = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(current) => {
                *current = fresh.clone();
                self.logger
                    .info(format_args!("reconnected to {}", self.endpoint));
                Ok(fresh)
            }
            // Closed while we were dialing.
            None => Err(CallError::Closed),
        }
    }

    /// Forward a generic call. Failures are returned as is, there are no retries.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, CallError> {
        let handles = self.live().await?;
        self.logger
            .trace(format_args!("calling {} with {} params", method, params.len()));
        handles.rpc.request(method, params).await
    }

    pub async fn call_contract(&self, call: &CallRequest, block: BlockTag) -> Result<Bytes, Error> {
        let handles = self.live().await?;
        handles.chain.call_contract(call, block).await
    }

    pub async fn block_number(&self) -> Result<u64, Error> {
        let handles = self.live().await?;
        handles.chain.block_number().await
    }

    pub async fn subscribe_new_heads(
        &self,
    ) -> Result<Box<dyn HeaderSubscription>, SubscriptionError> {
        let handles = self
            .live()
            .await
            .map_err(|err| SubscriptionError::Subscribe(err.to_string()))?;
        handles.chain.subscribe_new_heads().await
    }

    /// Release both handles. Returns `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handles {
            Some(handles) => {
                drop(handles);
                self.logger
                    .info(format_args!("closed the connection to {}", self.endpoint));
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Dials the node over WebSocket.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsDialer;

async fn dial_ws(endpoint: &str) -> Result<WsClient, ConnectionError> {
    WsClientBuilder::default()
        .build(endpoint)
        .await
        .map_err(|err| ConnectionError::new(endpoint, err))
}

impl Dialer for WsDialer {
    fn dial_rpc<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RpcHandle>, ConnectionError>> {
        Box::pin(async move {
            let client = dial_ws(endpoint).await?;
            let handle: Arc<dyn RpcHandle> = Arc::new(WsRpc { client });
            Ok(handle)
        })
    }

    fn dial_chain<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn ChainHandle>, ConnectionError>> {
        Box::pin(async move {
            let client = dial_ws(endpoint).await?;
            let handle: Arc<dyn ChainHandle> = Arc::new(WsChain { client });
            Ok(handle)
        })
    }
}

fn to_params(method: &str, values: Vec<Value>) -> Result<ArrayParams, CallError> {
    let mut params = ArrayParams::new();
    for value in values {
        params.insert(value).map_err(|err| CallError::Params {
            method: method.to_string(),
            message: err.to_string(),
        })?;
    }
    Ok(params)
}

fn rpc_error(method: &str, err: impl std::fmt::Display) -> CallError {
    CallError::Rpc {
        method: method.to_string(),
        message: err.to_string(),
    }
}

struct WsRpc {
    client: WsClient,
}

impl RpcHandle for WsRpc {
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Vec<Value>,
    ) -> BoxFuture<'a, Result<Value, CallError>> {
        Box::pin(async move {
            let params = to_params(method, params)?;
            self.client
                .request::<Value, _>(method, params)
                .await
                .map_err(|err| rpc_error(method, err))
        })
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

struct WsChain {
    client: WsClient,
}

impl ChainHandle for WsChain {
    fn subscribe_new_heads(
        &self,
    ) -> BoxFuture<'_, Result<Box<dyn HeaderSubscription>, SubscriptionError>> {
        Box::pin(async move {
            let subs: Subscription<Header> = self
                .client
                .subscribe("eth_subscribe", rpc_params!["newHeads"], "eth_unsubscribe")
                .await
                .map_err(|err| SubscriptionError::Subscribe(err.to_string()))?;
            let subs: Box<dyn HeaderSubscription> = Box::new(NewHeads { subs });
            Ok(subs)
        })
    }

    fn call_contract<'a>(
        &'a self,
        call: &'a CallRequest,
        block: BlockTag,
    ) -> BoxFuture<'a, Result<Bytes, Error>> {
        Box::pin(async move {
            let result: Value = self
                .client
                .request("eth_call", rpc_params![call, block])
                .await
                .map_err(|err| rpc_error("eth_call", err))?;
            let data = serde_json::from_value(result)
                .map_err(|err| DecodeError::new("eth_call result", err))?;
            Ok(data)
        })
    }

    fn block_number(&self) -> BoxFuture<'_, Result<u64, Error>> {
        Box::pin(async move {
            let number: String = self
                .client
                .request("eth_blockNumber", rpc_params![])
                .await
                .map_err(|err| rpc_error("eth_blockNumber", err))?;
            Ok(parse_quantity("block number", &number)?)
        })
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

struct NewHeads {
    subs: Subscription<Header>,
}

impl HeaderSubscription for NewHeads {
    fn next(&mut self) -> BoxFuture<'_, Result<Header, SubscriptionError>> {
        Box::pin(async move {
            match self.subs.next().await {
                Some(Ok(header)) => Ok(header),
                Some(Err(err)) => Err(DecodeError::new("new head", err).into()),
                None => Err(SubscriptionError::Closed),
            }
        })
    }

    fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<(), SubscriptionError>> {
        Box::pin(async move {
            self.subs
                .unsubscribe()
                .await
                .map_err(|err| SubscriptionError::Stream(err.to_string()))
        })
    }
}
