use crate::chain_data::Address;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// How long the observer waits before resubscribing after a failed subscribe.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the header relay buffer.
pub const DEFAULT_RELAY_CAPACITY: usize = 10_000;

#[derive(Clone, Debug)]
pub struct ContractConfig {
    pub address: Address,
    /// A JSON interface description of the contract, read lazily on first use.
    pub abi_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// The endpoint of the node, e.g. `ws://localhost:8546`.
    pub rpc_endpoint: String,
    /// The local signing address, used as the default sender of read-only calls.
    pub sender: Address,
    /// Contracts that collaborators resolve by name.
    pub contracts: HashMap<String, ContractConfig>,
    pub retry_interval: Duration,
    pub relay_capacity: usize,
}

impl Config {
    pub fn new(rpc_endpoint: impl Into<String>, sender: Address) -> Self {
        Self {
            rpc_endpoint: rpc_endpoint.into(),
            sender,
            contracts: HashMap::new(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
        }
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay_capacity == 0 {
            return Err(ConfigError::ZeroRelayCapacity);
        }
        Ok(())
    }
}
