//! Declaration of the chain data structures exchanged with the node.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse an `0x`-prefixed hex quantity as used by the node for numbers.
pub fn parse_quantity(what: &'static str, hex_number: &str) -> Result<u64, DecodeError> {
    let digits = hex_number
        .strip_prefix("0x")
        .ok_or_else(|| DecodeError::new(what, format!("`{}` lacks the 0x prefix", hex_number)))?;
    u64::from_str_radix(digits, 16).map_err(|err| DecodeError::new(what, err))
}

/// A block header as pushed by the node on the `newHeads` subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    // The rest of the header (miner, roots, bloom, ...) is not relayed.
}

impl Header {
    pub fn block_number(&self) -> Result<u64, DecodeError> {
        parse_quantity("header number", &self.number)
    }
}

/// An opaque blob of bytes, serialized as `0x`-prefixed hex.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Bytes({})", impl_serde::serialize::to_hex(&self.0, false))
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(raw: Vec<u8>) -> Self {
        Self(raw)
    }
}

impl Serialize for Bytes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        impl_serde::serialize::serialize(&self.0, serializer)
    }
}

impl<'a> Deserialize<'a> for Bytes {
    fn deserialize<D: serde::Deserializer<'a>>(de: D) -> Result<Self, D::Error> {
        impl_serde::serialize::deserialize(de).map(Bytes)
    }
}

/// A 20-byte account or contract address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    fn from_slice(raw: &[u8]) -> Option<Self> {
        if raw.len() != 20 {
            return None;
        }
        let mut buf = [0u8; 20];
        buf.copy_from_slice(raw);
        Some(Self(buf))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&impl_serde::serialize::to_hex(&self.0, false))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = impl_serde::serialize::from_hex(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|err| DecodeError::new("address", err))?;
        Self::from_slice(&raw)
            .ok_or_else(|| DecodeError::new("address", format!("expected 20 bytes, got {}", raw.len())))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        impl_serde::serialize::serialize(&self.0, serializer)
    }
}

impl<'a> Deserialize<'a> for Address {
    fn deserialize<D: serde::Deserializer<'a>>(de: D) -> Result<Self, D::Error> {
        let raw = impl_serde::serialize::deserialize(de)?;
        Self::from_slice(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("expected 20 bytes, got {}", raw.len()))
        })
    }
}

/// The block context a read-only call is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl Serialize for BlockTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            BlockTag::Latest => serializer.serialize_str("latest"),
            BlockTag::Number(num) => serializer.serialize_str(&format!("{:#x}", num)),
        }
    }
}

/// The default parameter bundle used for read-only node calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub from: Address,
    pub block: BlockTag,
}

/// A message for `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}
