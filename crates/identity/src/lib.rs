//! Identity resolution for committee members
//!
//! The same account key is written differently depending on which network
//! produced the address. This crate decodes SS58 addresses and decides
//! whether a wallet address denotes a given roster entry.

pub mod network;
pub mod address;
pub mod resolver;

pub use network::Network;
pub use address::{AddressError, AddressResult, PublicKey, decode_public_key, encode_address, reencode};
pub use resolver::{Addressed, IdentityResolver, MatchStrategy};
