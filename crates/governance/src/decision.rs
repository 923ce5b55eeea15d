//! Committee member decisions on a referendum
//!
//! A proposal holds at most one position (agree, veto, recuse, flag) per
//! member identity, plus at most one responsible-person record which is
//! independent of positions. Identity comparison goes through the
//! [`IdentityResolver`] so a member cannot hold two positions by submitting
//! under differently encoded addresses.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use council_identity::IdentityResolver;

/// The kind of decision a member records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Agree,
    Veto,
    Recuse,
    FlagForDiscussion,
    ResponsiblePerson,
}

impl DecisionKind {
    /// Whether this kind is a member position rather than an assignment
    pub fn is_position(&self) -> bool {
        !matches!(self, DecisionKind::ResponsiblePerson)
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecisionKind::Agree => "agree",
            DecisionKind::Veto => "veto",
            DecisionKind::Recuse => "recuse",
            DecisionKind::FlagForDiscussion => "flag_for_discussion",
            DecisionKind::ResponsiblePerson => "responsible_person",
        };
        f.write_str(name)
    }
}

/// A decision recorded by a committee member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Member address as it appeared on the roster when recorded
    pub member: String,
    pub kind: DecisionKind,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(member: impl Into<String>, kind: DecisionKind, reason: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            member: member.into(),
            kind,
            reason,
            created_at,
        }
    }
}

/// All decisions on one proposal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionSet {
    decisions: Vec<Decision>,
}

impl DecisionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Record a decision, returning whatever it superseded.
    ///
    /// A position replaces every earlier position of the same identity. A
    /// responsible-person record replaces the existing one.
    pub fn record(&mut self, decision: Decision, resolver: &IdentityResolver) -> Vec<Decision> {
        let superseded = if decision.kind.is_position() {
            self.drain_where(|d| d.kind.is_position() && resolver.same_identity(&decision.member, &d.member))
        } else {
            self.drain_where(|d| !d.kind.is_position())
        };
        self.decisions.push(decision);
        superseded
    }

    /// Remove the member's decision of `kind`, if present
    pub fn remove(&mut self, member: &str, kind: DecisionKind, resolver: &IdentityResolver) -> Option<Decision> {
        let mut removed = self.drain_where(|d| d.kind == kind && resolver.same_identity(member, &d.member));
        // Newest first, in case older data held duplicates
        removed.sort_by_key(|d| std::cmp::Reverse(d.created_at));
        removed.into_iter().next()
    }

    /// Remove every decision of the member except vetoes
    pub fn clear_member_except_veto(&mut self, member: &str, resolver: &IdentityResolver) -> Vec<Decision> {
        self.drain_where(|d| d.kind != DecisionKind::Veto && resolver.same_identity(member, &d.member))
    }

    /// The responsible-person record
    pub fn assignment(&self) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.kind == DecisionKind::ResponsiblePerson)
    }

    /// The member's current position, newest wins
    pub fn position_of(&self, member: &str, resolver: &IdentityResolver) -> Option<&Decision> {
        self.decisions
            .iter()
            .filter(|d| d.kind.is_position() && resolver.same_identity(member, &d.member))
            .max_by_key(|d| d.created_at)
    }

    /// All veto decisions, oldest first
    pub fn vetoes(&self) -> Vec<&Decision> {
        let mut vetoes: Vec<&Decision> = self.decisions
            .iter()
            .filter(|d| d.kind == DecisionKind::Veto)
            .collect();
        vetoes.sort_by_key(|d| d.created_at);
        vetoes
    }

    fn drain_where<F>(&mut self, mut pred: F) -> Vec<Decision>
    where
        F: FnMut(&Decision) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.decisions.len());
        for decision in self.decisions.drain(..) {
            if pred(&decision) {
                removed.push(decision);
            } else {
                kept.push(decision);
            }
        }
        self.decisions = kept;
        removed
    }
}
