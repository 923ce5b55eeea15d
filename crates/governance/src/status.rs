//! Referendum status state machine
//!
//! Manual requests follow a fixed adjacency, with `WaitingForAgreement` and
//! `Reconsidering` forceable from anywhere. Automatic transitions are driven
//! by the agreement summary after every decision mutation.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::evaluation::AgreementSummary;
use crate::PolicyViolation;

/// Status of a referendum in the committee workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferendumStatus {
    NotStarted,
    Considering,
    ReadyForApproval,
    WaitingForAgreement,
    ReadyToVote,
    Reconsidering,
    VotedAye,
    VotedNay,
    VotedAbstain,
    /// Has no transitions in or out; kept so stored records round-trip
    NotVoted,
}

impl Default for ReferendumStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl ReferendumStatus {
    /// Every status
    pub const ALL: [ReferendumStatus; 10] = [
        ReferendumStatus::NotStarted,
        ReferendumStatus::Considering,
        ReferendumStatus::ReadyForApproval,
        ReferendumStatus::WaitingForAgreement,
        ReferendumStatus::ReadyToVote,
        ReferendumStatus::Reconsidering,
        ReferendumStatus::VotedAye,
        ReferendumStatus::VotedNay,
        ReferendumStatus::VotedAbstain,
        ReferendumStatus::NotVoted,
    ];

    /// Statuses a caller may force regardless of the current one
    pub const FORCEABLE: [ReferendumStatus; 2] = [
        ReferendumStatus::WaitingForAgreement,
        ReferendumStatus::Reconsidering,
    ];

    /// Statuses re-checked by the automatic rules
    pub const AGREEMENT_SENSITIVE: [ReferendumStatus; 3] = [
        ReferendumStatus::ReadyForApproval,
        ReferendumStatus::WaitingForAgreement,
        ReferendumStatus::ReadyToVote,
    ];

    /// Next statuses along the normal forward path
    pub fn next_manual(&self) -> &'static [ReferendumStatus] {
        use ReferendumStatus::*;
        match self {
            NotStarted => &[Considering],
            Considering => &[ReadyForApproval],
            ReadyForApproval => &[WaitingForAgreement],
            WaitingForAgreement => &[ReadyToVote],
            ReadyToVote => &[VotedAye, VotedNay, VotedAbstain],
            Reconsidering => &[WaitingForAgreement],
            VotedAye | VotedNay | VotedAbstain | NotVoted => &[],
        }
    }

    /// Whether this is one of the voted outcomes
    pub fn is_voted(&self) -> bool {
        matches!(self, ReferendumStatus::VotedAye | ReferendumStatus::VotedNay | ReferendumStatus::VotedAbstain)
    }

    /// Whether no manual transition leads out of this status (except forcing)
    pub fn is_terminal(&self) -> bool {
        self.is_voted()
    }

    pub fn is_agreement_sensitive(&self) -> bool {
        Self::AGREEMENT_SENSITIVE.contains(self)
    }

    /// Statuses a manual request may target from here, forceable ones included
    pub fn allowed_manual_targets(&self) -> Vec<ReferendumStatus> {
        let mut allowed: Vec<ReferendumStatus> = self.next_manual().to_vec();
        for forced in Self::FORCEABLE {
            if !allowed.contains(&forced) {
                allowed.push(forced);
            }
        }
        allowed
    }

    fn as_str(&self) -> &'static str {
        use ReferendumStatus::*;
        match self {
            NotStarted => "not_started",
            Considering => "considering",
            ReadyForApproval => "ready_for_approval",
            WaitingForAgreement => "waiting_for_agreement",
            ReadyToVote => "ready_to_vote",
            Reconsidering => "reconsidering",
            VotedAye => "voted_aye",
            VotedNay => "voted_nay",
            VotedAbstain => "voted_abstain",
            NotVoted => "not_voted",
        }
    }
}

impl fmt::Display for ReferendumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comma-separated list of statuses, for diagnostics
pub fn describe(statuses: &[ReferendumStatus]) -> String {
    if statuses.is_empty() {
        return "none".to_string();
    }
    statuses.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
}

/// What caused a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// Requested by a committee member
    Manual,
    /// Agreement rules after a decision change or reconciliation
    Automatic,
    /// First responsible person claimed the proposal
    Assignment,
    /// Responsible person released the proposal
    Unassignment,
}

/// A status change that happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ReferendumStatus,
    pub to: ReferendumStatus,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

/// Check a manually requested transition
pub fn validate_manual(from: ReferendumStatus, to: ReferendumStatus) -> Result<(), PolicyViolation> {
    if ReferendumStatus::FORCEABLE.contains(&to) || from.next_manual().contains(&to) {
        return Ok(());
    }

    if to.is_voted() {
        return Err(PolicyViolation::AutomaticStatus(to));
    }

    Err(PolicyViolation::InvalidTransition {
        from,
        to,
        allowed: from.allowed_manual_targets(),
    })
}

/// Status the agreement rules move `current` to, if any.
///
/// Advances to `ReadyToVote` only with a non-empty roster, no veto and the
/// threshold met. Falls back from `ReadyToVote` when agreement is lost, but
/// not on an empty roster, which carries no information.
pub fn automatic_target(current: ReferendumStatus, summary: &AgreementSummary) -> Option<ReferendumStatus> {
    match current {
        ReferendumStatus::WaitingForAgreement | ReferendumStatus::ReadyForApproval
            if summary.threshold_met() =>
        {
            Some(ReferendumStatus::ReadyToVote)
        }
        ReferendumStatus::ReadyToVote
            if summary.member_count > 0 && summary.counted_agreements() < summary.threshold =>
        {
            Some(ReferendumStatus::WaitingForAgreement)
        }
        _ => None,
    }
}
