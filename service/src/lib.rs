//! A crate that provides a bridge to a remote node: it keeps a subscription to new block headers
//! alive across failures, relays the headers through a bounded buffer and forwards calls.

mod bridge;
mod chain_data;
mod coalesce;
mod comm;
mod config;
mod contract;
mod error;
mod lifecycle;
mod logging;
mod observer;
mod shutdown;
#[cfg(test)]
mod testing;

pub use bridge::{Bridge, ObservedHeaders};
pub use chain_data::{parse_quantity, Address, BlockTag, Bytes, CallOptions, CallRequest, Header};
pub use coalesce::Coalescer;
pub use comm::{ChainHandle, Connection, Dialer, HeaderSubscription, RpcHandle, WsDialer};
pub use config::{Config, ContractConfig, DEFAULT_RELAY_CAPACITY, DEFAULT_RETRY_INTERVAL};
pub use contract::{AbiItem, ContractHandle, ContractInterface};
pub use error::{
    AlreadyStarted, CallError, ConfigError, ConnectionError, ContractError, DecodeError, Error,
    StartError, SubscriptionError,
};
pub use logging::Logger;
pub use observer::{ObserverState, StatusReport};
