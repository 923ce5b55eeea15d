//! Council manager
//!
//! Composes the roster cache, identity resolution, decision store,
//! assignment protocol and status state machine into per-proposal
//! operations. Every mutation runs under the proposal's lock and ends in a
//! single repository commit, so decision changes and the transitions they
//! trigger are persisted together or not at all.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Serialize, Deserialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use council_core::{Clock, CouncilConfig, FileStorage, Storage};
use council_identity::{IdentityResolver, Network};

use crate::assignment::{self, Claim};
use crate::dao::DaoProfile;
use crate::decision::{Decision, DecisionKind};
use crate::evaluation::{AgreementEvaluator, AgreementSummary};
use crate::proposal::{ProposalKey, ProposalRecord, VoteChoice};
use crate::repository::{ProposalRepository, StorageProposalRepository};
use crate::roster::{RosterCache, RosterFetcher, RosterSnapshot};
use crate::status::{self, ReferendumStatus, Transition, TransitionCause};
use crate::{GovernanceError, GovernanceResult, PolicyViolation};

/// What an operation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Recorded,
    Removed,
    /// The decision to remove did not exist
    NotFound,
    Assigned,
    /// The member already was the responsible person
    AlreadyAssigned,
    Unassigned,
    StatusChanged,
    Suggested,
}

/// Result of a proposal operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub effect: Effect,
    /// Status after the operation
    pub status: ReferendumStatus,
    /// Status changes in the order they happened
    pub transitions: Vec<Transition>,
    pub summary: AgreementSummary,
}

/// Result of a reconciliation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Proposals in an agreement-sensitive status
    pub examined: usize,
    pub transitioned: Vec<(ProposalKey, Transition)>,
    /// Proposals that could not be reconciled, with the error
    pub failed: Vec<(ProposalKey, String)>,
}

/// What an operation changed in a record
struct Applied {
    effect: Effect,
    transitions: Vec<Transition>,
}

impl Applied {
    fn new(effect: Effect) -> Self {
        Self { effect, transitions: Vec::new() }
    }

    fn with_transition(effect: Effect, transition: Option<Transition>) -> Self {
        Self {
            effect,
            transitions: transition.into_iter().collect(),
        }
    }
}

/// Inputs available to a mutation
struct Step<'a> {
    /// Acting member as listed on the roster
    member: &'a str,
    resolver: &'a IdentityResolver,
    roster: &'a RosterSnapshot,
    evaluator: &'a AgreementEvaluator,
    now: DateTime<Utc>,
}

impl Step<'_> {
    fn summarize(&self, record: &ProposalRecord) -> AgreementSummary {
        self.evaluator.evaluate(self.roster, &record.decisions, self.resolver)
    }
}

/// One lock per proposal; different proposals never contend.
///
/// Entries only live while someone holds or waits for them.
#[derive(Default)]
struct ProposalLocks {
    locks: DashMap<ProposalKey, Arc<Mutex<()>>>,
}

impl ProposalLocks {
    async fn acquire(&self, key: &ProposalKey) -> ProposalGuard<'_> {
        // Clone the Arc out so the map shard is not held while waiting
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        ProposalGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held proposal lock. Removes the map entry on release when no other
/// task holds or waits for it.
struct ProposalGuard<'a> {
    locks: &'a ProposalLocks,
    key: ProposalKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProposalGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map's own reference is the only one left
        self.locks.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Committee workflow entry point
pub struct CouncilManager {
    repository: Arc<dyn ProposalRepository>,
    rosters: Arc<RosterCache>,
    evaluator: AgreementEvaluator,
    clock: Arc<dyn Clock>,
    daos: DashMap<String, DaoProfile>,
    locks: ProposalLocks,
}

impl CouncilManager {
    /// Create a manager from its collaborators
    pub fn new(
        repository: Arc<dyn ProposalRepository>,
        rosters: Arc<RosterCache>,
        clock: Arc<dyn Clock>,
        config: &CouncilConfig,
    ) -> Self {
        Self {
            repository,
            rosters,
            evaluator: AgreementEvaluator::new(config.roster.default_threshold),
            clock,
            daos: DashMap::new(),
            locks: ProposalLocks::default(),
        }
    }

    /// Create a manager persisting to `storage` and fetching rosters with `fetcher`
    pub fn with_storage(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn RosterFetcher>,
        clock: Arc<dyn Clock>,
        config: &CouncilConfig,
    ) -> Self {
        let repository = Arc::new(StorageProposalRepository::new(storage));
        let rosters = Arc::new(RosterCache::new(fetcher, clock.clone(), &config.roster));
        Self::new(repository, rosters, clock, config)
    }

    /// Create a manager persisting to the file storage named in `config`
    pub async fn open(
        fetcher: Arc<dyn RosterFetcher>,
        clock: Arc<dyn Clock>,
        config: &CouncilConfig,
    ) -> GovernanceResult<Self> {
        let storage = FileStorage::from_config(&config.storage).await?;
        Ok(Self::with_storage(Arc::new(storage), fetcher, clock, config))
    }

    /// The roster cache shared by all operations
    pub fn rosters(&self) -> &Arc<RosterCache> {
        &self.rosters
    }

    /// Register or replace a DAO profile
    pub fn register_dao(&self, profile: DaoProfile) {
        // Multisigs may have changed
        for network in Network::ALL {
            self.rosters.invalidate(&profile.id, network);
        }
        info!("Registered DAO {} ({})", profile.id, profile.name);
        self.daos.insert(profile.id.clone(), profile);
    }

    pub fn dao(&self, dao_id: &str) -> GovernanceResult<DaoProfile> {
        self.daos
            .get(dao_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GovernanceError::DaoNotFound(dao_id.to_string()))
    }

    /// Start tracking a referendum. Returns the existing record if it is
    /// already tracked.
    pub async fn register_proposal(&self, key: ProposalKey) -> GovernanceResult<ProposalRecord> {
        self.dao(&key.dao_id)?;
        let record = ProposalRecord::new(key.clone(), self.clock.now());
        if self.repository.insert(&record).await? {
            info!("Tracking proposal {}", key);
            return Ok(record);
        }
        self.proposal(&key).await
    }

    /// Load a proposal record
    pub async fn proposal(&self, key: &ProposalKey) -> GovernanceResult<ProposalRecord> {
        self.repository
            .load(key)
            .await?
            .ok_or_else(|| GovernanceError::ProposalNotFound(key.to_string()))
    }

    /// Record a member's decision, superseding their previous position.
    ///
    /// A responsible-person decision is an assignment request.
    pub async fn record_decision(
        &self,
        key: &ProposalKey,
        actor: &str,
        kind: DecisionKind,
        reason: Option<String>,
    ) -> GovernanceResult<Outcome> {
        if kind == DecisionKind::ResponsiblePerson {
            return self.assign(key, actor).await;
        }

        self.mutate(key, actor, move |record, step| {
            let decision = Decision::new(step.member, kind, reason, step.now);
            let superseded = record.decisions.record(decision, step.resolver);
            record.proposal.updated_at = step.now;
            debug!(
                "Recorded {} by {} on {} (superseded {})",
                kind, step.member, record.key(), superseded.len()
            );
            Ok(Applied::new(Effect::Recorded))
        })
        .await
    }

    /// Remove a member's decision of `kind`.
    ///
    /// Removing the responsible-person decision releases the assignment.
    pub async fn remove_decision(
        &self,
        key: &ProposalKey,
        actor: &str,
        kind: DecisionKind,
    ) -> GovernanceResult<Outcome> {
        self.mutate(key, actor, move |record, step| {
            if kind == DecisionKind::ResponsiblePerson {
                let held = record
                    .decisions
                    .assignment()
                    .map_or(false, |d| step.resolver.same_identity(&d.member, step.member));
                if !held {
                    return Ok(Applied::new(Effect::NotFound));
                }
                let release = assignment::unassign(record, step.member, None, step.resolver, step.now)?;
                return Ok(Applied::with_transition(Effect::Unassigned, release.transition));
            }

            match record.decisions.remove(step.member, kind, step.resolver) {
                Some(_) => {
                    record.proposal.updated_at = step.now;
                    Ok(Applied::new(Effect::Removed))
                }
                None => {
                    debug!("No {} decision by {} on {}", kind, step.member, record.key());
                    Ok(Applied::new(Effect::NotFound))
                }
            }
        })
        .await
    }

    /// Make the actor responsible for the proposal
    ///
    /// An assignee who has left the committee is replaced.
    pub async fn assign(&self, key: &ProposalKey, actor: &str) -> GovernanceResult<Outcome> {
        self.mutate(key, actor, |record, step| {
            match assignment::assign(record, step.member, step.roster, step.resolver, step.now)? {
                Claim::Assigned(transition) => {
                    info!("{} is responsible for {}", step.member, record.key());
                    Ok(Applied::with_transition(Effect::Assigned, transition))
                }
                Claim::TookOver { previous, release, transition } => {
                    info!(
                        "{} took over {} from former member {} ({} decisions cleared)",
                        step.member, record.key(), previous, release.removed.len()
                    );
                    Ok(Applied {
                        effect: Effect::Assigned,
                        transitions: release.transition.into_iter().chain(transition).collect(),
                    })
                }
                Claim::AlreadyHeld => Ok(Applied::new(Effect::AlreadyAssigned)),
            }
        })
        .await
    }

    /// Release the actor's responsibility for the proposal
    pub async fn unassign(&self, key: &ProposalKey, actor: &str, note: Option<String>) -> GovernanceResult<Outcome> {
        self.mutate(key, actor, move |record, step| {
            let release = assignment::unassign(record, step.member, note.as_deref(), step.resolver, step.now)?;
            info!(
                "{} released {} ({} decisions cleared)",
                step.member, record.key(), release.removed.len()
            );
            Ok(Applied::with_transition(Effect::Unassigned, release.transition))
        })
        .await
    }

    /// Manually move the proposal to `target`
    pub async fn set_status(
        &self,
        key: &ProposalKey,
        actor: &str,
        target: ReferendumStatus,
    ) -> GovernanceResult<Outcome> {
        self.mutate(key, actor, move |record, step| {
            status::validate_manual(record.status(), target)?;

            if target == ReferendumStatus::ReadyToVote {
                let summary = step.summarize(record);
                if !summary.threshold_met() {
                    return Err(PolicyViolation::ThresholdNotMet {
                        agreed: summary.counted_agreements(),
                        threshold: summary.threshold,
                        vetoed: summary.is_vetoed(),
                    });
                }
            }

            let transition = record.proposal.transition(target, TransitionCause::Manual, step.now);
            if let Some(t) = &transition {
                info!("{} moved {} from {} to {}", step.member, record.key(), t.from, t.to);
            }
            Ok(Applied::with_transition(Effect::StatusChanged, transition))
        })
        .await
    }

    /// Record the responsible person's recommended vote
    pub async fn suggest_vote(
        &self,
        key: &ProposalKey,
        actor: &str,
        vote: VoteChoice,
        reason: Option<String>,
    ) -> GovernanceResult<Outcome> {
        self.mutate(key, actor, move |record, step| {
            assignment::suggest_vote(record, step.member, vote, reason, step.resolver, step.now)?;
            Ok(Applied::new(Effect::Suggested))
        })
        .await
    }

    /// Current agreement state of a proposal
    pub async fn agreement_summary(&self, key: &ProposalKey) -> GovernanceResult<AgreementSummary> {
        let dao = self.dao(&key.dao_id)?;
        let roster = self.rosters.get_roster(&dao, key.network).await;
        let record = self.proposal(key).await?;
        let resolver = IdentityResolver::new(key.network);
        Ok(self.evaluator.evaluate(&roster, &record.decisions, &resolver))
    }

    /// Re-run the automatic rules on every proposal in an
    /// agreement-sensitive status.
    ///
    /// Repairs transitions missed by an earlier failure. A proposal that
    /// fails is reported and the sweep moves on.
    pub async fn reconcile_pending_transitions(&self) -> GovernanceResult<ReconcileReport> {
        let pending = self
            .repository
            .list_by_status(&ReferendumStatus::AGREEMENT_SENSITIVE)
            .await?;

        let mut report = ReconcileReport {
            examined: pending.len(),
            ..Default::default()
        };

        for record in pending {
            let key = record.key().clone();
            match self.reconcile(&key).await {
                Ok(Some(transition)) => report.transitioned.push((key, transition)),
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to reconcile proposal {}: {}", key, e);
                    report.failed.push((key, e.to_string()));
                }
            }
        }

        info!(
            "Reconciled {} proposals: {} transitioned, {} failed",
            report.examined,
            report.transitioned.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn reconcile(&self, key: &ProposalKey) -> GovernanceResult<Option<Transition>> {
        let dao = self.dao(&key.dao_id)?;
        let roster = self.rosters.get_roster(&dao, key.network).await;
        let resolver = IdentityResolver::new(key.network);

        let _guard = self.locks.acquire(key).await;
        let mut record = self.proposal(key).await?;
        // Status may have moved since the listing
        if !record.status().is_agreement_sensitive() {
            return Ok(None);
        }

        let summary = self.evaluator.evaluate(&roster, &record.decisions, &resolver);
        let transition = Self::apply_automatic(&mut record, &summary, self.clock.now());
        if transition.is_some() {
            self.repository.commit(&mut record).await?;
        }
        Ok(transition)
    }

    /// Resolve the actor, then load, change and commit the record under the
    /// proposal lock. The automatic rules run after `apply`.
    async fn mutate<F>(&self, key: &ProposalKey, actor: &str, apply: F) -> GovernanceResult<Outcome>
    where
        F: FnOnce(&mut ProposalRecord, &Step<'_>) -> Result<Applied, PolicyViolation> + Send,
    {
        let dao = self.dao(&key.dao_id)?;
        let roster = self.rosters.get_roster(&dao, key.network).await;
        let resolver = IdentityResolver::new(key.network);

        let member = match resolver.resolve(actor, &roster.members) {
            Some((entry, strategy)) => {
                debug!("Resolved {} to {} by {:?} match", actor, entry.address, strategy);
                entry.address.clone()
            }
            None => {
                warn!("{} is not on the {} committee of {}", actor, key.network, key.dao_id);
                return Err(GovernanceError::IdentityUnresolved {
                    address: actor.to_string(),
                    dao_id: key.dao_id.clone(),
                    network: key.network,
                });
            }
        };

        let _guard = self.locks.acquire(key).await;
        let mut record = self.proposal(key).await?;
        let original = record.clone();

        let step = Step {
            member: &member,
            resolver: &resolver,
            roster: &roster,
            evaluator: &self.evaluator,
            now: self.clock.now(),
        };

        let applied = apply(&mut record, &step)?;
        let mut transitions = applied.transitions;

        let summary = step.summarize(&record);
        if let Some(transition) = Self::apply_automatic(&mut record, &summary, step.now) {
            transitions.push(transition);
        }

        if record != original {
            self.repository.commit(&mut record).await?;
        }

        Ok(Outcome {
            effect: applied.effect,
            status: record.status(),
            transitions,
            summary,
        })
    }

    fn apply_automatic(
        record: &mut ProposalRecord,
        summary: &AgreementSummary,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        let target = status::automatic_target(record.status(), summary)?;
        let transition = record.proposal.transition(target, TransitionCause::Automatic, now)?;
        info!(
            "Proposal {} moved {} -> {} ({} of {} agreed, vetoed: {})",
            record.key(),
            transition.from,
            transition.to,
            summary.counted_agreements(),
            summary.threshold,
            summary.is_vetoed()
        );
        Some(transition)
    }
}
