//! Proposal persistence
//!
//! Each [`ProposalRecord`] lives under one storage key. A commit is a single
//! compare-and-swap against the bytes the writer loaded, so a mutation is
//! either fully visible or not at all.

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, warn};

use council_core::{JsonStorage, Storage, StorageError};
use council_core::utils::storage_key;

use crate::proposal::{ProposalKey, ProposalRecord};
use crate::status::ReferendumStatus;
use crate::{GovernanceError, GovernanceResult};

/// Root prefix of all council records
const ROOT: &str = "council";
const PROPOSALS: &str = "proposals";

/// Persistence for proposal records
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    /// Load a record, `None` if it does not exist
    async fn load(&self, key: &ProposalKey) -> GovernanceResult<Option<ProposalRecord>>;

    /// Store a new record. Returns `false` without writing if one exists.
    async fn insert(&self, record: &ProposalRecord) -> GovernanceResult<bool>;

    /// Replace the stored record at `record.revision` and bump the revision.
    ///
    /// Fails with `StorageError::Conflict` if the record changed since it
    /// was loaded.
    async fn commit(&self, record: &mut ProposalRecord) -> GovernanceResult<()>;

    /// All records of a DAO, or of every DAO when `dao_id` is `None`
    async fn list(&self, dao_id: Option<&str>) -> GovernanceResult<Vec<ProposalRecord>>;

    /// Records currently in one of `statuses`
    async fn list_by_status(&self, statuses: &[ReferendumStatus]) -> GovernanceResult<Vec<ProposalRecord>> {
        let records = self.list(None).await?;
        Ok(records
            .into_iter()
            .filter(|r| statuses.contains(&r.status()))
            .collect())
    }
}

/// A proposal repository over any [`Storage`] backend
pub struct StorageProposalRepository {
    storage: Arc<dyn Storage>,
}

impl StorageProposalRepository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn record_key(key: &ProposalKey) -> String {
        storage_key(&[
            ROOT.to_string(),
            key.dao_id.clone(),
            PROPOSALS.to_string(),
            key.network.to_string(),
            key.number.to_string(),
        ])
    }

    /// Reject a record read from the slot of another proposal
    fn check_key(requested: &ProposalKey, record: &ProposalRecord) -> GovernanceResult<()> {
        if record.key() != requested {
            warn!("Record for {} found under the key of {}", record.key(), requested);
            return Err(GovernanceError::CorruptRecord {
                requested: requested.to_string(),
                stored: record.key().to_string(),
            });
        }
        Ok(())
    }

    async fn load_raw(&self, key: &str) -> GovernanceResult<Option<Vec<u8>>> {
        match self.storage.get(key).await {
            Ok(data) => Ok(Some(data)),
            Err(StorageError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ProposalRepository for StorageProposalRepository {
    async fn load(&self, key: &ProposalKey) -> GovernanceResult<Option<ProposalRecord>> {
        let record: Option<ProposalRecord> = self.storage.find_json(&Self::record_key(key)).await?;
        if let Some(record) = &record {
            Self::check_key(key, record)?;
        }
        Ok(record)
    }

    async fn insert(&self, record: &ProposalRecord) -> GovernanceResult<bool> {
        let key = Self::record_key(record.key());
        let data = serde_json::to_vec_pretty(record)?;
        match self.storage.compare_and_swap(&key, None, &data).await {
            Ok(()) => {
                debug!("Inserted proposal {}", record.key());
                Ok(true)
            }
            Err(StorageError::Conflict(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&self, record: &mut ProposalRecord) -> GovernanceResult<()> {
        let key = Self::record_key(record.key());
        let current = self.load_raw(&key).await?
            .ok_or_else(|| GovernanceError::ProposalNotFound(record.key().to_string()))?;

        let stored: ProposalRecord = serde_json::from_slice(&current)?;
        Self::check_key(record.key(), &stored)?;
        if stored.revision != record.revision {
            return Err(StorageError::Conflict(key).into());
        }

        let mut next = record.clone();
        next.revision += 1;
        let data = serde_json::to_vec_pretty(&next)?;
        self.storage.compare_and_swap(&key, Some(&current), &data).await?;

        debug!("Committed proposal {} at revision {}", next.key(), next.revision);
        record.revision = next.revision;
        Ok(())
    }

    async fn list(&self, dao_id: Option<&str>) -> GovernanceResult<Vec<ProposalRecord>> {
        let prefix = match dao_id {
            Some(dao_id) => storage_key(&[ROOT, dao_id, PROPOSALS]),
            None => ROOT.to_string(),
        };

        let mut records = Vec::new();
        for key in self.storage.list(&prefix).await? {
            // Skip anything that is not a proposal record
            let segments: Vec<&str> = key.split('/').collect();
            if segments.len() != 5 || segments[2] != PROPOSALS {
                continue;
            }
            if let Some(data) = self.load_raw(&key).await? {
                let record = serde_json::from_slice::<ProposalRecord>(&data)?;
                if dao_id.map_or(false, |id| record.key().dao_id != id) {
                    warn!("Skipping record {} listed under DAO {:?}", record.key(), dao_id);
                    continue;
                }
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(records)
    }
}
