//! Handles to configured on-chain contracts.

use crate::bridge::Bridge;
use crate::chain_data::{Address, Bytes};
use crate::config::ContractConfig;
use crate::error::{ContractError, Error};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// One item of a JSON contract interface description.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AbiItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state_mutability: Option<String>,
}

/// The parsed interface description of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInterface {
    pub items: Vec<AbiItem>,
}

impl ContractInterface {
    async fn load(name: &str, path: &Path) -> Result<Self, ContractError> {
        let interface_err = |message: String| ContractError::Interface {
            name: name.to_string(),
            message,
        };
        let text = async_std::fs::read_to_string(path)
            .await
            .map_err(|err| interface_err(format!("{}: {}", path.display(), err)))?;
        let items = serde_json::from_str(&text).map_err(|err| interface_err(err.to_string()))?;
        Ok(Self { items })
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.kind == "function" && item.name.as_deref() == Some(name))
    }
}

#[derive(Debug)]
pub struct ContractHandle {
    pub name: String,
    pub address: Address,
    pub interface: Option<ContractInterface>,
}

impl ContractHandle {
    /// Resolve a handle from its configuration, reading the interface description if any.
    pub(crate) async fn resolve(
        name: String,
        config: Option<ContractConfig>,
    ) -> Result<Arc<Self>, ContractError> {
        let config = config.ok_or_else(|| ContractError::Unknown(name.clone()))?;
        let interface = match &config.abi_path {
            Some(path) => Some(ContractInterface::load(&name, path).await?),
            None => None,
        };
        Ok(Arc::new(Self {
            name,
            address: config.address,
            interface,
        }))
    }

    /// `false` also when the contract has no interface description.
    pub fn has_function(&self, name: &str) -> bool {
        self.interface
            .as_ref()
            .map_or(false, |interface| interface.has_function(name))
    }

    /// A read-only call of this contract with already encoded call data.
    pub fn call(&self, bridge: &Bridge, data: Bytes) -> Result<Bytes, Error> {
        bridge.call_contract(self.address, data)
    }
}
