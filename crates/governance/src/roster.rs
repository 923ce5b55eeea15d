//! Committee roster cache
//!
//! Rosters come from an external source (a chain explorer) and are cached
//! per (DAO, network) for a fixed freshness window. An empty or failed fetch
//! never replaces a known roster: the stale entry keeps being served until a
//! non-empty fetch succeeds. Concurrent refreshes are not deduplicated, but a
//! write only lands if it started no earlier than the entry it replaces.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use council_core::Clock;
use council_core::config::RosterConfig;
use council_identity::{Addressed, Network};

use crate::dao::{DaoProfile, MultisigAccount};

/// A committee member as reported by the roster source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub address: String,
    pub display_name: Option<String>,
}

impl RosterMember {
    pub fn new(address: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            address: address.into(),
            display_name,
        }
    }
}

impl Addressed for RosterMember {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Committee membership and agreement threshold at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub members: Vec<RosterMember>,
    /// Threshold reported by the source, if it reported one
    pub threshold: Option<usize>,
}

impl RosterSnapshot {
    pub fn new(members: Vec<RosterMember>, threshold: Option<usize>) -> Self {
        Self { members, threshold }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Roster source failures. Absorbed by the cache.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Roster source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid roster response: {0}")]
    InvalidResponse(String),
}

/// The external roster source
#[async_trait]
pub trait RosterFetcher: Send + Sync {
    /// Fetch the signatories and threshold of a multisig, following its
    /// proxy if it has one
    async fn fetch(&self, multisig: &MultisigAccount, network: Network) -> Result<RosterSnapshot, FetchError>;
}

/// A cached roster with its freshness bounds
#[derive(Debug, Clone)]
pub struct CachedRoster {
    pub snapshot: Arc<RosterSnapshot>,
    /// When the fetch that produced this entry started
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedRoster {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

type RosterKey = (String, Network);

/// Per (DAO, network) roster cache
pub struct RosterCache {
    fetcher: Arc<dyn RosterFetcher>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    entries: DashMap<RosterKey, CachedRoster>,
}

impl RosterCache {
    pub fn new(fetcher: Arc<dyn RosterFetcher>, clock: Arc<dyn Clock>, config: &RosterConfig) -> Self {
        Self {
            fetcher,
            clock,
            freshness: config.freshness(),
            entries: DashMap::new(),
        }
    }

    /// Roster of a DAO's committee on a network.
    ///
    /// Serves the cached entry while fresh, otherwise refetches. Returns an
    /// empty roster only if nothing was ever fetched successfully.
    pub async fn get_roster(&self, dao: &DaoProfile, network: Network) -> Arc<RosterSnapshot> {
        let key: RosterKey = (dao.id.clone(), network);
        let started = self.clock.now();

        // Clone out so no map guard is held across the fetch
        let cached = self.entries.get(&key).map(|entry| entry.value().clone());
        if let Some(entry) = &cached {
            if entry.is_fresh(started) {
                return entry.snapshot.clone();
            }
        }

        let fetched = match dao.multisig(network) {
            Some(multisig) => self.fetcher.fetch(multisig, network).await,
            None => {
                debug!("DAO {} has no {} multisig", dao.id, network);
                Ok(RosterSnapshot::default())
            }
        };

        match fetched {
            Ok(snapshot) if !snapshot.is_empty() => {
                return self.store(key, snapshot, started);
            }
            Ok(_) => {
                if cached.is_some() {
                    warn!("Empty {} roster for DAO {}, keeping cached roster", network, dao.id);
                }
            }
            Err(e) => {
                warn!("Roster fetch failed for DAO {} on {}: {}", dao.id, network, e);
            }
        }

        // Another request may have stored a fresh roster meanwhile
        match self.entries.get(&key) {
            Some(entry) => {
                if !entry.is_fresh(started) {
                    info!("Serving stale {} roster for DAO {} fetched at {}", network, dao.id, entry.fetched_at);
                }
                entry.snapshot.clone()
            }
            None => Arc::new(RosterSnapshot::default()),
        }
    }

    /// Store a non-empty snapshot unless a newer fetch already landed.
    /// Returns the snapshot now in the cache.
    fn store(&self, key: RosterKey, snapshot: RosterSnapshot, fetched_at: DateTime<Utc>) -> Arc<RosterSnapshot> {
        let fresh = CachedRoster {
            snapshot: Arc::new(snapshot),
            fetched_at,
            expires_at: fetched_at
                .checked_add_signed(self.freshness)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().fetched_at <= fetched_at {
                    occupied.insert(fresh);
                } else {
                    debug!("Discarding roster fetched at {}, cache holds a newer one", fetched_at);
                }
                occupied.get().snapshot.clone()
            }
            Entry::Vacant(vacant) => vacant.insert(fresh).snapshot.clone(),
        }
    }

    /// Cached entry without fetching
    pub fn peek(&self, dao_id: &str, network: Network) -> Option<CachedRoster> {
        self.entries
            .get(&(dao_id.to_string(), network))
            .map(|entry| entry.value().clone())
    }

    /// Drop an entry so the next lookup refetches
    pub fn invalidate(&self, dao_id: &str, network: Network) {
        self.entries.remove(&(dao_id.to_string(), network));
    }
}
