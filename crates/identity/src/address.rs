//! SS58 address codec
//!
//! Thin wrappers over `sp_core`'s SS58 implementation that speak in terms of
//! [`Network`] and raw 32-byte account keys.

use sp_core::crypto::{AccountId32, Ss58AddressFormat, Ss58Codec};
use thiserror::Error;

use crate::Network;

/// Raw 32-byte account public key
pub type PublicKey = [u8; 32];

/// Address handling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The string is not a valid SS58 account address
    #[error("Invalid address {0}: {1}")]
    InvalidAddress(String, String),

    /// The network name is not supported
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

/// Result type for address operations
pub type AddressResult<T> = Result<T, AddressError>;

/// Decode an SS58 address to its account key, whatever its prefix
pub fn decode_public_key(address: &str) -> AddressResult<PublicKey> {
    let (account, _format) = AccountId32::from_ss58check_with_version(address.trim())
        .map_err(|e| AddressError::InvalidAddress(address.to_string(), format!("{:?}", e)))?;
    Ok(<[u8; 32]>::from(account))
}

/// Encode an account key with the network's SS58 prefix
pub fn encode_address(public_key: &PublicKey, network: Network) -> String {
    AccountId32::from(*public_key)
        .to_ss58check_with_version(Ss58AddressFormat::custom(network.ss58_prefix()))
}

/// Re-encode an address for another network
pub fn reencode(address: &str, network: Network) -> AddressResult<String> {
    decode_public_key(address).map(|key| encode_address(&key, network))
}
