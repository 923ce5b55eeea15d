//! Roster membership resolution
//!
//! A wallet address matches a roster entry if any of these hold, tried in
//! order across the whole roster before moving on to the next:
//!
//! 1. the strings are identical;
//! 2. the candidate re-encoded with the target network's prefix equals the
//!    entry;
//! 3. the strings are equal after trimming and lower-casing;
//! 4. both decode to the same account key.
//!
//! Decoding failures only mean "no match" for that step.

use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::address::{decode_public_key, encode_address, PublicKey};
use crate::Network;

/// Anything that carries an SS58 address
pub trait Addressed {
    /// The address as stored
    fn address(&self) -> &str;
}

impl Addressed for String {
    fn address(&self) -> &str {
        self
    }
}

impl Addressed for &str {
    fn address(&self) -> &str {
        self
    }
}

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    Exact,
    Reencoded,
    Normalized,
    PublicKey,
}

impl MatchStrategy {
    /// Strategies in the order they are attempted
    pub const ORDER: [MatchStrategy; 4] = [
        MatchStrategy::Exact,
        MatchStrategy::Reencoded,
        MatchStrategy::Normalized,
        MatchStrategy::PublicKey,
    ];
}

/// Pre-decoded forms of a candidate address
struct Candidate<'a> {
    raw: &'a str,
    key: Option<PublicKey>,
    reencoded: Option<String>,
    normalized: String,
}

fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Matches wallet addresses against roster entries of one network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityResolver {
    network: Network,
}

impl IdentityResolver {
    /// Create a resolver for rosters of `network`
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    /// Target network
    pub fn network(&self) -> Network {
        self.network
    }

    fn candidate<'a>(&self, raw: &'a str) -> Candidate<'a> {
        let key = decode_public_key(raw).ok();
        Candidate {
            raw,
            key,
            reencoded: key.map(|k| encode_address(&k, self.network)),
            normalized: normalize(raw),
        }
    }

    fn try_strategy(&self, strategy: MatchStrategy, candidate: &Candidate<'_>, entry: &str) -> bool {
        match strategy {
            MatchStrategy::Exact => candidate.raw == entry,
            MatchStrategy::Reencoded => candidate.reencoded.as_deref() == Some(entry),
            MatchStrategy::Normalized => {
                !candidate.normalized.is_empty() && candidate.normalized == normalize(entry)
            }
            MatchStrategy::PublicKey => match (candidate.key, decode_public_key(entry)) {
                (Some(a), Ok(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Check a candidate address against one entry address
    pub fn matches(&self, candidate: &str, entry: &str) -> Option<MatchStrategy> {
        let candidate = self.candidate(candidate);
        MatchStrategy::ORDER
            .into_iter()
            .find(|strategy| self.try_strategy(*strategy, &candidate, entry))
    }

    /// Whether two addresses denote the same identity
    pub fn same_identity(&self, a: &str, b: &str) -> bool {
        self.matches(a, b).is_some()
    }

    /// Find the roster entry a candidate address denotes
    pub fn resolve<'r, T: Addressed>(&self, candidate: &str, roster: &'r [T]) -> Option<(&'r T, MatchStrategy)> {
        let candidate = self.candidate(candidate);
        for strategy in MatchStrategy::ORDER {
            if let Some(entry) = roster.iter().find(|e| self.try_strategy(strategy, &candidate, e.address())) {
                trace!("Resolved {} to {} via {:?}", candidate.raw, entry.address(), strategy);
                return Some((entry, strategy));
            }
        }
        None
    }
}
