//! High-level bridge that owns the connection to the node and the header observer.
//!
//! Note that the interface here is purely synchronous. Every call blocks the calling thread for
//! the round trip and may be issued from any number of threads at once.

use crate::chain_data::{Address, BlockTag, Bytes, CallOptions, CallRequest, Header};
use crate::coalesce::Coalescer;
use crate::comm::{Connection, Dialer, WsDialer};
use crate::config::Config;
use crate::contract::ContractHandle;
use crate::error::{CallError, ContractError, DecodeError, Error, StartError};
use crate::lifecycle::Lifecycle;
use crate::logging::Logger;
use crate::observer::{Observer, StatusReport};
use async_std::channel::{self, Receiver};
use async_std::task;
use atomic::Atomic;
use futures::stream::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Read access to the bounded stream of headers relayed by the observer.
///
/// Once the bridge is shut down the remaining headers can still be drained, after that the
/// stream ends.
#[derive(Clone)]
pub struct ObservedHeaders {
    rx: Receiver<Header>,
}

impl ObservedHeaders {
    pub async fn recv(&self) -> Option<Header> {
        self.rx.recv().await.ok()
    }

    /// This is a blocking call.
    pub fn recv_blocking(&self) -> Option<Header> {
        task::block_on(self.recv())
    }

    pub fn try_recv(&self) -> Option<Header> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.rx.capacity()
    }

    pub fn stream(&self) -> impl Stream<Item = Header> {
        self.rx.clone()
    }
}

pub struct Bridge {
    config: Config,
    conn: Arc<Connection>,
    lifecycle: Lifecycle,
    headers: ObservedHeaders,
    status: Arc<Atomic<StatusReport>>,
    logger: Logger,
    call_options: OnceLock<CallOptions>,
    options_flight: Coalescer<(), CallOptions>,
    contracts: RwLock<HashMap<String, Arc<ContractHandle>>>,
    contracts_flight: Coalescer<String, Result<Arc<ContractHandle>, ContractError>>,
}

impl Bridge {
    /// Connect to the node over WebSocket and start observing headers.
    pub fn new(config: Config) -> Result<Self, StartError> {
        Self::with_dialer(config, Arc::new(WsDialer), Logger::default())
    }

    pub fn with_dialer(
        config: Config,
        dialer: Arc<dyn Dialer>,
        logger: Logger,
    ) -> Result<Self, StartError> {
        config.validate()?;
        let conn = task::block_on(Connection::connect(
            dialer,
            &config.rpc_endpoint,
            logger.clone(),
        ))?;
        let conn = Arc::new(conn);

        let (relay, rx) = channel::bounded(config.relay_capacity);
        let status = Arc::new(Atomic::new(StatusReport::default()));
        let lifecycle = Lifecycle::started(logger.clone(), |shutdown| Observer {
            conn: Arc::clone(&conn),
            relay,
            shutdown,
            retry_interval: config.retry_interval,
            logger: logger.clone(),
            status: Arc::clone(&status),
        });

        Ok(Self {
            config,
            conn,
            lifecycle,
            headers: ObservedHeaders { rx },
            status,
            logger,
            call_options: OnceLock::new(),
            options_flight: Coalescer::new(),
            contracts: RwLock::new(HashMap::new()),
            contracts_flight: Coalescer::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Call `method` on the node and return the raw JSON result.
    pub fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, CallError> {
        task::block_on(self.conn.call(method, params))
    }

    /// Like [`Bridge::call`], with the result decoded into `T`.
    pub fn call_as<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, Error> {
        let value = self.call(method, params)?;
        Ok(serde_json::from_value(value).map_err(|err| DecodeError::new(method, err))?)
    }

    /// The default options of read-only calls: our own address as the sender, evaluated against
    /// the latest block.
    pub fn call_options(&self) -> CallOptions {
        if let Some(options) = self.call_options.get() {
            return *options;
        }
        let sender = self.config.sender;
        let options = task::block_on(self.options_flight.get_or_compute((), move || async move {
            CallOptions {
                from: sender,
                block: BlockTag::Latest,
            }
        }));
        *self.call_options.get_or_init(|| options)
    }

    /// A read-only call of the contract at `to` with already encoded call data.
    pub fn call_contract(&self, to: Address, data: Bytes) -> Result<Bytes, Error> {
        let options = self.call_options();
        let call = CallRequest {
            from: options.from,
            to,
            data,
        };
        task::block_on(self.conn.call_contract(&call, options.block))
    }

    pub fn block_number(&self) -> Result<u64, Error> {
        task::block_on(self.conn.block_number())
    }

    /// The handle of the contract configured under `name`.
    ///
    /// The handle is created once, even if many threads ask for it at the same time, and then
    /// kept for the lifetime of the bridge. Failed resolutions are not kept.
    pub fn contract(&self, name: &str) -> Result<Arc<ContractHandle>, ContractError> {
        if let Some(handle) = self.cached_contract(name) {
            return Ok(handle);
        }

        let config = self.config.contracts.get(name).cloned();
        let owned_name = name.to_string();
        let resolved = task::block_on(self.contracts_flight.get_or_compute(
            name.to_string(),
            move || ContractHandle::resolve(owned_name, config),
        ))?;

        let mut contracts = self
            .contracts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let handle = contracts
            .entry(name.to_string())
            .or_insert_with(|| {
                self.logger.debug(format_args!(
                    "resolved contract {} at {}",
                    resolved.name, resolved.address
                ));
                Arc::clone(&resolved)
            });
        Ok(Arc::clone(handle))
    }

    fn cached_contract(&self, name: &str) -> Option<Arc<ContractHandle>> {
        self.contracts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn observed_headers(&self) -> ObservedHeaders {
        self.headers.clone()
    }

    pub fn status_report(&self) -> StatusReport {
        self.status.load(atomic::Ordering::SeqCst)
    }

    pub fn outstanding_workers(&self) -> usize {
        self.lifecycle.outstanding()
    }

    /// Stop the observer, wait for it to exit and close the connection.
    ///
    /// This is a blocking call. Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.lifecycle.shutdown(&self.conn);
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
