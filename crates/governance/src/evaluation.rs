//! Agreement evaluation
//!
//! Partitions the live roster by each member's current position and reports
//! any veto. Summaries are derived on demand and never cached.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use council_identity::IdentityResolver;

use crate::decision::{DecisionKind, DecisionSet};
use crate::roster::{RosterMember, RosterSnapshot};

/// A roster member as shown in a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub address: String,
    pub display_name: Option<String>,
}

impl From<&RosterMember> for MemberRef {
    fn from(member: &RosterMember) -> Self {
        Self {
            address: member.address.clone(),
            display_name: member.display_name.clone(),
        }
    }
}

/// The veto that blocks a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoInfo {
    pub member: MemberRef,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Agreement state of one proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementSummary {
    pub threshold: usize,
    pub member_count: usize,
    pub agreed: Vec<MemberRef>,
    pub recused: Vec<MemberRef>,
    pub flagged: Vec<MemberRef>,
    pub pending: Vec<MemberRef>,
    pub veto: Option<VetoInfo>,
}

impl AgreementSummary {
    pub fn agreed_count(&self) -> usize {
        self.agreed.len()
    }

    pub fn is_vetoed(&self) -> bool {
        self.veto.is_some()
    }

    /// Agreements that count toward the threshold; none while vetoed
    pub fn counted_agreements(&self) -> usize {
        if self.is_vetoed() {
            0
        } else {
            self.agreed_count()
        }
    }

    /// Whether the proposal may advance to voting
    pub fn threshold_met(&self) -> bool {
        self.member_count > 0
            && self.threshold > 0
            && self.counted_agreements() >= self.threshold
    }
}

/// Effective agreement threshold for a roster.
///
/// The source's threshold wins, then the configured default, then half the
/// committee rounded up.
pub fn effective_threshold(roster: &RosterSnapshot, default_threshold: Option<usize>) -> usize {
    roster
        .threshold
        .or(default_threshold)
        .unwrap_or_else(|| (roster.members.len() + 1) / 2)
}

/// Computes agreement summaries
#[derive(Debug, Clone, Copy, Default)]
pub struct AgreementEvaluator {
    default_threshold: Option<usize>,
}

impl AgreementEvaluator {
    pub fn new(default_threshold: Option<usize>) -> Self {
        Self { default_threshold }
    }

    pub fn evaluate(
        &self,
        roster: &RosterSnapshot,
        decisions: &DecisionSet,
        resolver: &IdentityResolver,
    ) -> AgreementSummary {
        let mut summary = AgreementSummary {
            threshold: effective_threshold(roster, self.default_threshold),
            member_count: roster.members.len(),
            agreed: Vec::new(),
            recused: Vec::new(),
            flagged: Vec::new(),
            pending: Vec::new(),
            veto: None,
        };

        // Only vetoes of current members block; the earliest is reported.
        // Vetoes of former members stay stored but are ignored.
        summary.veto = decisions.vetoes().into_iter().find_map(|veto| {
            let (entry, _) = resolver.resolve(&veto.member, &roster.members)?;
            Some(VetoInfo {
                member: MemberRef::from(entry),
                reason: veto.reason.clone(),
                at: veto.created_at,
            })
        });

        for member in &roster.members {
            let bucket = match decisions.position_of(&member.address, resolver).map(|d| d.kind) {
                Some(DecisionKind::Agree) => &mut summary.agreed,
                Some(DecisionKind::Recuse) => &mut summary.recused,
                Some(DecisionKind::FlagForDiscussion) => &mut summary.flagged,
                // Vetoing members are reported through `veto`
                Some(DecisionKind::Veto) => continue,
                Some(DecisionKind::ResponsiblePerson) | None => &mut summary.pending,
            };
            bucket.push(MemberRef::from(member));
        }

        summary
    }
}
