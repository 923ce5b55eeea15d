//! Referendum records
//!
//! A [`ProposalRecord`] bundles a proposal with its decisions and is the unit
//! of atomic persistence. The status field is private; it changes only
//! through [`Proposal::transition`], which the state machine and assignment
//! protocol drive.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use council_identity::Network;

use crate::decision::DecisionSet;
use crate::status::{ReferendumStatus, Transition, TransitionCause};

/// Identifies a referendum: tenant, chain and on-chain referendum number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalKey {
    pub dao_id: String,
    pub network: Network,
    pub number: u32,
}

impl ProposalKey {
    pub fn new(dao_id: impl Into<String>, network: Network, number: u32) -> Self {
        Self {
            dao_id: dao_id.into(),
            network,
            number,
        }
    }
}

impl fmt::Display for ProposalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dao_id, self.network, self.number)
    }
}

/// On-chain vote options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Aye,
    Nay,
    Abstain,
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoteChoice::Aye => "aye",
            VoteChoice::Nay => "nay",
            VoteChoice::Abstain => "abstain",
        };
        f.write_str(name)
    }
}

/// The responsible person's recommended vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedVote {
    pub vote: VoteChoice,
    pub reason: Option<String>,
    pub suggested_by: String,
    pub suggested_at: DateTime<Utc>,
}

/// Free-text audit entry attached to a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditNote {
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A referendum followed by a DAO committee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub key: ProposalKey,
    status: ReferendumStatus,
    pub suggested_vote: Option<SuggestedVote>,
    pub notes: Vec<AuditNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(key: ProposalKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: ReferendumStatus::NotStarted,
            suggested_vote: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            status_changed_at: now,
        }
    }

    pub fn status(&self) -> ReferendumStatus {
        self.status
    }

    /// Move to `to`; a no-op returning `None` when already there
    pub(crate) fn transition(
        &mut self,
        to: ReferendumStatus,
        cause: TransitionCause,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        if self.status == to {
            return None;
        }
        let from = self.status;
        self.status = to;
        self.status_changed_at = now;
        self.updated_at = now;
        Some(Transition { from, to, cause, at: now })
    }
}

/// A proposal and its decisions, persisted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub proposal: Proposal,
    pub decisions: DecisionSet,
    /// Incremented on every commit
    pub revision: u64,
}

impl ProposalRecord {
    pub fn new(key: ProposalKey, now: DateTime<Utc>) -> Self {
        Self {
            proposal: Proposal::new(key, now),
            decisions: DecisionSet::new(),
            revision: 0,
        }
    }

    pub fn key(&self) -> &ProposalKey {
        &self.proposal.key
    }

    pub fn status(&self) -> ReferendumStatus {
        self.proposal.status()
    }
}
