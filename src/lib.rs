//! Council
//!
//! Committee approval workflow for on-chain governance referenda: a DAO's
//! multisig committee agrees, vetoes, recuses or flags each referendum
//! before the DAO votes on it.

/// Module version information
pub mod version {
    /// The current version of the council library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Storage, configuration, clock and tracing
pub use council_core as core;

/// Networks, address codec and identity resolution
pub use council_identity as identity;

/// Status machine, decisions, rosters and the council manager
pub use council_governance as governance;

pub use council_core::{init_tracing, Clock, CouncilConfig, ManualClock, SystemClock};
pub use council_identity::{IdentityResolver, Network};
pub use council_governance::{
    CouncilManager, DaoProfile, DecisionKind, Effect, GovernanceError, GovernanceResult,
    MultisigAccount, Outcome, PolicyViolation, ProposalKey, ReconcileReport, ReferendumStatus,
    RosterFetcher, RosterMember, RosterSnapshot, VoteChoice,
};
