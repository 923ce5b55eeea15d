//! Responsible-person protocol
//!
//! Claiming, releasing and acting on the responsible-person role of a
//! proposal. Each function mutates an in-memory [`ProposalRecord`]; the
//! caller commits the record as one unit or discards it.

use chrono::{DateTime, Utc};

use council_identity::IdentityResolver;

use crate::decision::{Decision, DecisionKind};
use crate::proposal::{AuditNote, ProposalRecord, SuggestedVote, VoteChoice};
use crate::roster::RosterSnapshot;
use crate::status::{ReferendumStatus, Transition, TransitionCause};
use crate::PolicyViolation;

/// Result of a successful claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The member became responsible
    Assigned(Option<Transition>),
    /// The previous assignee had left the committee and was released in
    /// favour of the member
    TookOver {
        previous: String,
        release: Release,
        transition: Option<Transition>,
    },
    /// The member already was
    AlreadyHeld,
}

/// Result of a successful release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Decisions of the outgoing assignee that were cleared
    pub removed: Vec<Decision>,
    pub transition: Option<Transition>,
}

/// Make `member` the responsible person.
///
/// Moves a `NotStarted` proposal to `Considering`; later statuses are left
/// alone. An assignee who is no longer on `roster` is released first, as if
/// they had unassigned themselves.
pub fn assign(
    record: &mut ProposalRecord,
    member: &str,
    roster: &RosterSnapshot,
    resolver: &IdentityResolver,
    now: DateTime<Utc>,
) -> Result<Claim, PolicyViolation> {
    let mut released = None;
    if let Some(previous) = record.decisions.assignment().map(|d| d.member.clone()) {
        if resolver.same_identity(&previous, member) {
            return Ok(Claim::AlreadyHeld);
        }
        if resolver.resolve(&previous, &roster.members).is_some() {
            return Err(PolicyViolation::AlreadyAssigned(previous));
        }

        let note = format!("Left the committee, taken over by {}", member);
        let cleared = release(record, &previous, member, Some(&note), resolver, now);
        released = Some((previous, cleared));
    }

    record.decisions.record(
        Decision::new(member, DecisionKind::ResponsiblePerson, None, now),
        resolver,
    );
    record.proposal.updated_at = now;

    let transition = if record.status() == ReferendumStatus::NotStarted {
        record.proposal.transition(ReferendumStatus::Considering, TransitionCause::Assignment, now)
    } else {
        None
    };
    Ok(match released {
        Some((previous, release)) => Claim::TookOver { previous, release, transition },
        None => Claim::Assigned(transition),
    })
}

/// Release the role held by `member`.
///
/// Clears every decision of the member except vetoes, drops the suggested
/// vote, resets the status to `NotStarted` and leaves an audit note.
pub fn unassign(
    record: &mut ProposalRecord,
    member: &str,
    note: Option<&str>,
    resolver: &IdentityResolver,
    now: DateTime<Utc>,
) -> Result<Release, PolicyViolation> {
    let assignee = require_assignee(record, member, resolver)?;
    Ok(release(record, &assignee, &assignee, note, resolver, now))
}

/// Clear `assignee`'s role and reset the proposal, noting it as `author`
fn release(
    record: &mut ProposalRecord,
    assignee: &str,
    author: &str,
    note: Option<&str>,
    resolver: &IdentityResolver,
    now: DateTime<Utc>,
) -> Release {
    let removed = record.decisions.clear_member_except_veto(assignee, resolver);
    let previous = record.proposal.suggested_vote.take();
    record.proposal.notes.push(AuditNote {
        author: author.to_string(),
        text: unassignment_note(previous.as_ref(), note),
        created_at: now,
    });
    record.proposal.updated_at = now;

    let transition = record.proposal.transition(ReferendumStatus::NotStarted, TransitionCause::Unassignment, now);
    Release { removed, transition }
}

/// Record the assignee's recommended vote, replacing any earlier one
pub fn suggest_vote(
    record: &mut ProposalRecord,
    member: &str,
    vote: VoteChoice,
    reason: Option<String>,
    resolver: &IdentityResolver,
    now: DateTime<Utc>,
) -> Result<(), PolicyViolation> {
    let assignee = require_assignee(record, member, resolver)?;
    record.proposal.suggested_vote = Some(SuggestedVote {
        vote,
        reason,
        suggested_by: assignee,
        suggested_at: now,
    });
    record.proposal.updated_at = now;
    Ok(())
}

/// The stored assignee address, if `member` is it
fn require_assignee(
    record: &ProposalRecord,
    member: &str,
    resolver: &IdentityResolver,
) -> Result<String, PolicyViolation> {
    match record.decisions.assignment() {
        None => Err(PolicyViolation::AssigneeRequired),
        Some(current) if resolver.same_identity(&current.member, member) => Ok(current.member.clone()),
        Some(_) => Err(PolicyViolation::NotAssignee(member.to_string())),
    }
}

fn unassignment_note(previous: Option<&SuggestedVote>, note: Option<&str>) -> String {
    let mut text = String::from("Unassigned.");
    if let Some(suggested) = previous {
        text.push_str(&format!(" Previous suggested vote: {}", suggested.vote));
        if let Some(reason) = &suggested.reason {
            text.push_str(&format!(" ({})", reason));
        }
        text.push('.');
    }
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        text.push_str(&format!(" Note: {}", note));
    }
    text
}
