//! Error types of the bridge.

use std::fmt;
use thiserror::Error;

/// Dial or transport setup failure.
#[derive(Debug, Clone, Error)]
#[error("cannot connect to {endpoint}: {message}")]
pub struct ConnectionError {
    pub endpoint: String,
    pub message: String,
}

impl ConnectionError {
    pub fn new(endpoint: &str, err: impl fmt::Display) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

/// An individual RPC call failed. Always reported to the caller that issued it.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("rpc {method} failed: {message}")]
    Rpc { method: String, message: String },

    #[error("cannot encode parameters of {method}: {message}")]
    Params { method: String, message: String },

    #[error("the connection is closed")]
    Closed,

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// A response could not be interpreted in the expected shape.
#[derive(Debug, Clone, Error)]
#[error("cannot decode {what}: {message}")]
pub struct DecodeError {
    pub what: &'static str,
    pub message: String,
}

impl DecodeError {
    pub fn new(what: &'static str, err: impl fmt::Display) -> Self {
        Self {
            what,
            message: err.to_string(),
        }
    }
}

/// The header stream failed to start or ended. Only ever logged by the observer.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    #[error("subscribe request failed: {0}")]
    Subscribe(String),

    #[error("subscription stream failed: {0}")]
    Stream(String),

    #[error("subscription stream closed by the node")]
    Closed,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failure to resolve a configured contract.
#[derive(Debug, Clone, Error)]
pub enum ContractError {
    #[error("contract {0} is not configured")]
    Unknown(String),

    #[error("cannot read interface of {name}: {message}")]
    Interface { name: String, message: String },
}

/// Any failure a caller of the bridge can observe.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// The configuration cannot be used to start a bridge.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("the relay buffer capacity must be at least 1")]
    ZeroRelayCapacity,
}

/// The bridge could not be created.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Returned by a second attempt to start the observer.
#[derive(Debug, Clone, Copy, Error)]
#[error("the observer is already started")]
pub struct AlreadyStarted;
