//! Committee governance workflow
//!
//! A DAO's committee (a multisig) walks each referendum through
//! consideration, discussion, threshold agreement and voting. Any single
//! member can veto. This crate holds the status state machine, the decision
//! model, agreement evaluation over a cached committee roster, and the
//! responsible-person assignment protocol, composed by [`CouncilManager`]
//! into atomic per-proposal operations.

use thiserror::Error;

use council_core::StorageError;
use council_identity::Network;

pub mod status;
pub mod decision;
pub mod dao;
pub mod proposal;
pub mod roster;
pub mod evaluation;
pub mod assignment;
pub mod repository;
pub mod manager;

/// Rules a request broke. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// Voted statuses are only reached through the voting transition
    #[error("Status {0} is set automatically")]
    AutomaticStatus(ReferendumStatus),

    /// Target is not reachable from the current status
    #[error("Invalid transition from {from} to {to}, allowed next: {}", status::describe(.allowed))]
    InvalidTransition {
        from: ReferendumStatus,
        to: ReferendumStatus,
        allowed: Vec<ReferendumStatus>,
    },

    /// Manual advance to voting without enough agreement
    #[error("Agreement threshold not met: {agreed} of {threshold} agreed (vetoed: {vetoed})")]
    ThresholdNotMet {
        agreed: usize,
        threshold: usize,
        vetoed: bool,
    },

    /// Another member is already responsible for the proposal
    #[error("Proposal is already assigned to {0}")]
    AlreadyAssigned(String),

    /// Only the responsible person may do this
    #[error("{0} is not the responsible person for this proposal")]
    NotAssignee(String),

    /// The action requires a responsible person
    #[error("Proposal has no responsible person")]
    AssigneeRequired,
}

/// Error types for governance operations
#[derive(Error, Debug)]
pub enum GovernanceError {
    /// A workflow rule was broken
    #[error("Policy violation: {0}")]
    PolicyViolation(#[from] PolicyViolation),

    /// Proposal not found
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    /// DAO not registered
    #[error("DAO not found: {0}")]
    DaoNotFound(String),

    /// The acting address is not on the committee
    #[error("Address {address} is not a {network} committee member of {dao_id}")]
    IdentityUnresolved {
        address: String,
        dao_id: String,
        network: Network,
    },

    /// A stored record does not belong to the key it was read from
    #[error("Record stored under {requested} belongs to {stored}")]
    CorruptRecord {
        requested: String,
        stored: String,
    },

    /// Error with storage
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for GovernanceError {
    fn from(e: serde_json::Error) -> Self {
        GovernanceError::SerializationError(e.to_string())
    }
}

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

// Re-exports
pub use status::{ReferendumStatus, Transition, TransitionCause};
pub use decision::{Decision, DecisionKind, DecisionSet};
pub use dao::{DaoProfile, MultisigAccount};
pub use proposal::{AuditNote, Proposal, ProposalKey, ProposalRecord, SuggestedVote, VoteChoice};
pub use roster::{CachedRoster, FetchError, RosterCache, RosterFetcher, RosterMember, RosterSnapshot};
pub use evaluation::{AgreementEvaluator, AgreementSummary, MemberRef, VetoInfo};
pub use assignment::{Claim, Release};
pub use repository::{ProposalRepository, StorageProposalRepository};
pub use manager::{CouncilManager, Effect, Outcome, ReconcileReport};
