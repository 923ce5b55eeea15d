//! Supported relay chains and their address prefixes

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::address::AddressError;

/// A chain whose referenda the committee follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Polkadot,
    Kusama,
    Westend,
}

impl Network {
    /// All supported networks
    pub const ALL: [Network; 3] = [Network::Polkadot, Network::Kusama, Network::Westend];

    /// SS58 address prefix used by this network
    pub fn ss58_prefix(&self) -> u16 {
        match self {
            Network::Polkadot => 0,
            Network::Kusama => 2,
            Network::Westend => 42,
        }
    }

    /// Lowercase chain name
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Polkadot => "polkadot",
            Network::Kusama => "kusama",
            Network::Westend => "westend",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polkadot" => Ok(Network::Polkadot),
            "kusama" => Ok(Network::Kusama),
            "westend" => Ok(Network::Westend),
            other => Err(AddressError::UnknownNetwork(other.to_string())),
        }
    }
}
