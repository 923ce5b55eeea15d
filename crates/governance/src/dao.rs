//! DAO (tenant) profiles

use std::collections::HashMap;
use serde::{Serialize, Deserialize};

use council_identity::Network;

/// The committee account of a DAO on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigAccount {
    /// Multisig address
    pub address: String,
    /// Proxy the multisig acts through, if any
    pub proxy: Option<String>,
}

impl MultisigAccount {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            proxy: None,
        }
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// An isolated governance organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoProfile {
    /// Unique DAO identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Committee accounts by network
    pub multisigs: HashMap<Network, MultisigAccount>,
}

impl DaoProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            multisigs: HashMap::new(),
        }
    }

    /// Add or replace the committee account for a network
    pub fn with_multisig(mut self, network: Network, account: MultisigAccount) -> Self {
        self.multisigs.insert(network, account);
        self
    }

    pub fn multisig(&self, network: Network) -> Option<&MultisigAccount> {
        self.multisigs.get(&network)
    }
}
