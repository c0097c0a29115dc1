use node_bridge_service::{Address, Config, ContractConfig};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn default_config() -> Config {
    // The defaults are selected in such a way that a launch against a local node won't require
    // any settings.
    Config::new("ws://localhost:8546", Address::default())
}

fn rpc_endpoint() -> Option<String> {
    env::var("NODE_RPC_URL").ok()
}

fn sender() -> anyhow::Result<Option<Address>> {
    match env::var("SENDER_ADDRESS") {
        Ok(addr) => Ok(Some(addr.parse()?)),
        Err(_) => Ok(None),
    }
}

fn retry_interval() -> anyhow::Result<Option<Duration>> {
    match env::var("SUBSCRIBE_RETRY_SECS") {
        Ok(secs) => Ok(Some(Duration::from_secs(secs.parse()?))),
        Err(_) => Ok(None),
    }
}

fn relay_capacity() -> anyhow::Result<Option<usize>> {
    match env::var("HEADER_BUFFER_CAPACITY") {
        Ok(capacity) => Ok(Some(capacity.parse()?)),
        Err(_) => Ok(None),
    }
}

/// Parses `name=0xaddress[:abi_path],...`.
fn parse_contracts(var_text: &str) -> anyhow::Result<HashMap<String, ContractConfig>> {
    let mut contracts = HashMap::new();
    for entry in var_text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, rest) = match entry.split_once('=') {
            Some(pair) => pair,
            None => anyhow::bail!("contract entry `{}` is missing `=`", entry),
        };
        let (address, abi_path) = match rest.split_once(':') {
            Some((address, path)) => (address, Some(PathBuf::from(path))),
            None => (rest, None),
        };
        contracts.insert(
            name.trim().to_string(),
            ContractConfig {
                address: address.trim().parse()?,
                abi_path,
            },
        );
    }
    Ok(contracts)
}

fn contracts() -> anyhow::Result<Option<HashMap<String, ContractConfig>>> {
    match env::var("CONTRACTS") {
        Ok(var_text) => Ok(Some(parse_contracts(&var_text)?)),
        Err(_) => Ok(None),
    }
}

/// Read the config from the environment.
pub fn obtain() -> anyhow::Result<Config> {
    // First, make sure that we've loaded configuration from the .env file.
    let _ = dotenv::dotenv();

    // Read the config or use the defaults.
    let defaults = default_config();
    Ok(Config {
        rpc_endpoint: rpc_endpoint().unwrap_or(defaults.rpc_endpoint),
        sender: sender()?.unwrap_or(defaults.sender),
        contracts: contracts()?.unwrap_or(defaults.contracts),
        retry_interval: retry_interval()?.unwrap_or(defaults.retry_interval),
        relay_capacity: relay_capacity()?.unwrap_or(defaults.relay_capacity),
    })
}
