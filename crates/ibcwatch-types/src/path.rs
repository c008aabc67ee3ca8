//! IBC path records as published in a chain-registry `_IBC` directory.
//!
//! One JSON file describes one path: the two chains with the light client each
//! hosts for the other, the channels opened over that connection and the
//! operators responsible for relaying it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RpcMap;
use crate::error::{ConfigError, Result};

/// Placeholder token that marks an identifier as not yet known
pub const WILDCARD: &str = "*";

/// A configured relationship between two chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    #[serde(rename = "$schema", default, skip_serializing_if = "String::is_empty")]
    pub schema: String,
    pub chain_1: ChainEnd,
    pub chain_2: ChainEnd,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub operators: Vec<Operator>,
}

/// One side of a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEnd {
    pub chain_name: String,
    /// Light client hosted on this chain that tracks the counterparty
    pub client_id: String,
    #[serde(default)]
    pub connection_id: String,
}

/// Channel delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Ordering {
    #[default]
    None,
    Unordered,
    Ordered,
}

impl From<String> for Ordering {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ordered" | "order_ordered" => Ordering::Ordered,
            "unordered" | "order_unordered" => Ordering::Unordered,
            _ => Ordering::None,
        }
    }
}

impl From<Ordering> for String {
    fn from(value: Ordering) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ordering::None => "none",
            Ordering::Unordered => "unordered",
            Ordering::Ordered => "ordered",
        };
        f.write_str(name)
    }
}

/// Channel and port identifiers on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnd {
    pub channel_id: String,
    pub port_id: String,
}

impl ChannelEnd {
    pub fn is_wildcard(&self) -> bool {
        self.channel_id.contains(WILDCARD) || self.port_id.contains(WILDCARD)
    }
}

/// Registry tags attached to a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTags {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub preferred: bool,
    #[serde(default)]
    pub dex: String,
    #[serde(default)]
    pub properties: String,
}

/// A channel on a path. `chain_1` is the source side, `chain_2` the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub chain_1: ChannelEnd,
    pub chain_2: ChannelEnd,
    #[serde(default)]
    pub ordering: Ordering,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: ChannelTags,
}

impl Channel {
    pub fn source(&self) -> &ChannelEnd {
        &self.chain_1
    }

    pub fn destination(&self) -> &ChannelEnd {
        &self.chain_2
    }

    /// Wildcarded channels cannot be turned into a concrete query.
    pub fn is_wildcard(&self) -> bool {
        self.chain_1.is_wildcard() || self.chain_2.is_wildcard()
    }
}

/// A relayer operator for a path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    #[serde(default)]
    pub chain_1: OperatorAddress,
    #[serde(default)]
    pub chain_2: OperatorAddress,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub discord: Discord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAddress {
    #[serde(default)]
    pub address: String,
}

/// Discord contact used for alert routing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discord {
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub id: String,
}

impl Path {
    /// Parse one registry JSON document
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Human readable `chain_1<->chain_2` name
    pub fn name(&self) -> String {
        format!("{}<->{}", self.chain_1.chain_name, self.chain_2.chain_name)
    }

    /// Comma-joined operator Discord IDs, keeping only purely numeric IDs
    pub fn discord_ids(&self) -> String {
        self.operators
            .iter()
            .map(|op| op.discord.id.as_str())
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Channels that can be reconciled
    pub fn concrete_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| !c.is_wildcard())
    }

    /// Both ends must name a client and resolve to exactly one RPC endpoint.
    pub fn validate(&self, rpcs: &RpcMap) -> Result<()> {
        for end in [&self.chain_1, &self.chain_2] {
            if end.chain_name.trim().is_empty() {
                return Err(self.invalid("missing chain_name"));
            }
            if end.client_id.trim().is_empty() {
                return Err(self.invalid(&format!("missing client_id for {}", end.chain_name)));
            }
            if !rpcs.contains_key(&end.chain_name) {
                return Err(self.invalid(&format!("missing RPC config for chain {}", end.chain_name)));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidPath {
            path: self.name(),
            reason: reason.to_string(),
        }
    }
}
