use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use sp_core::crypto::{AccountId32, Ss58AddressFormat, Ss58Codec};
use tempfile::tempdir;

use council::core::{FileStorage, MemoryStorage, Storage};
use council::governance::{
    FetchError, ProposalRecord, ProposalRepository, RosterCache, StorageProposalRepository, TransitionCause,
};
use council::{
    CouncilConfig, CouncilManager, DaoProfile, DecisionKind, Effect, GovernanceError, GovernanceResult,
    ManualClock, MultisigAccount, Network, PolicyViolation, ProposalKey, ReferendumStatus,
    RosterFetcher, RosterMember, RosterSnapshot, VoteChoice,
};

/// Roster source returning whatever is currently configured
struct StaticFetcher {
    roster: RwLock<RosterSnapshot>,
}

impl StaticFetcher {
    fn new(roster: RosterSnapshot) -> Self {
        Self { roster: RwLock::new(roster) }
    }
}

#[async_trait]
impl RosterFetcher for StaticFetcher {
    async fn fetch(&self, _multisig: &MultisigAccount, _network: Network) -> Result<RosterSnapshot, FetchError> {
        Ok(self.roster.read().unwrap().clone())
    }
}

/// Roster source that never answers
struct HangingFetcher;

#[async_trait]
impl RosterFetcher for HangingFetcher {
    async fn fetch(&self, _multisig: &MultisigAccount, _network: Network) -> Result<RosterSnapshot, FetchError> {
        futures::future::pending().await
    }
}

/// Storage-backed repository whose commits hang while `stall` is set
struct StallingRepository {
    inner: StorageProposalRepository,
    stall: AtomicBool,
}

impl StallingRepository {
    fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: StorageProposalRepository::new(storage),
            stall: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ProposalRepository for StallingRepository {
    async fn load(&self, key: &ProposalKey) -> GovernanceResult<Option<ProposalRecord>> {
        self.inner.load(key).await
    }

    async fn insert(&self, record: &ProposalRecord) -> GovernanceResult<bool> {
        self.inner.insert(record).await
    }

    async fn commit(&self, record: &mut ProposalRecord) -> GovernanceResult<()> {
        if self.stall.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        self.inner.commit(record).await
    }

    async fn list(&self, dao_id: Option<&str>) -> GovernanceResult<Vec<ProposalRecord>> {
        self.inner.list(dao_id).await
    }
}

fn address(n: u8, network: Network) -> String {
    AccountId32::new([n; 32]).to_ss58check_with_version(Ss58AddressFormat::custom(network.ss58_prefix()))
}

fn kusama(n: u8) -> String {
    address(n, Network::Kusama)
}

fn roster(members: u8, threshold: Option<usize>) -> RosterSnapshot {
    RosterSnapshot::new(
        (1..=members).map(|n| RosterMember::new(kusama(n), Some(format!("Member {}", n)))).collect(),
        threshold,
    )
}

fn proposal() -> ProposalKey {
    ProposalKey::new("open-dao", Network::Kusama, 318)
}

fn dao() -> DaoProfile {
    DaoProfile::new("open-dao", "Open DAO")
        .with_multisig(Network::Kusama, MultisigAccount::new(kusama(200)).with_proxy(kusama(201)))
}

async fn setup_with(storage: Arc<dyn Storage>, fetcher: Arc<dyn RosterFetcher>) -> Arc<CouncilManager> {
    let manager = CouncilManager::with_storage(
        storage,
        fetcher,
        Arc::new(ManualClock::default()),
        &CouncilConfig::default(),
    );
    manager.register_dao(dao());
    manager.register_proposal(proposal()).await.unwrap();
    Arc::new(manager)
}

async fn setup(members: u8, threshold: Option<usize>) -> Arc<CouncilManager> {
    setup_with(
        Arc::new(MemoryStorage::new()),
        Arc::new(StaticFetcher::new(roster(members, threshold))),
    )
    .await
}

#[tokio::test]
async fn test_concurrent_duplicate_agreements_leave_one_decision() {
    let manager = setup(5, Some(3)).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        // Same member, alternating spellings
        let actor = if i % 2 == 0 { kusama(1) } else { address(1, Network::Polkadot) };
        handles.push(tokio::spawn(async move {
            manager.record_decision(&proposal(), &actor, DecisionKind::Agree, None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = manager.proposal(&proposal()).await.unwrap();
    assert_eq!(record.decisions.len(), 1);
    // Repeats with an unchanged clock change nothing and are not committed
    assert_eq!(record.revision, 1);
    assert_eq!(manager.agreement_summary(&proposal()).await.unwrap().agreed_count(), 1);
}

#[tokio::test]
async fn test_concurrent_agreements_from_distinct_members_all_land() {
    let manager = setup(6, Some(6)).await;
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::WaitingForAgreement).await.unwrap();

    let handles: Vec<_> = (1..=6)
        .map(|n| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.record_decision(&proposal(), &kusama(n), DecisionKind::Agree, None).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = manager.proposal(&proposal()).await.unwrap();
    assert_eq!(record.decisions.len(), 6);
    assert_eq!(record.status(), ReferendumStatus::ReadyToVote);
}

#[tokio::test]
async fn test_veto_blocks_any_number_of_agreements() {
    let manager = setup(5, Some(2)).await;
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::WaitingForAgreement).await.unwrap();
    manager.record_decision(&proposal(), &kusama(3), DecisionKind::Veto, Some("treasury risk".into())).await.unwrap();

    for n in [1, 2, 4, 5] {
        let outcome = manager.record_decision(&proposal(), &kusama(n), DecisionKind::Agree, None).await.unwrap();
        assert_eq!(outcome.status, ReferendumStatus::WaitingForAgreement);
    }

    let summary = manager.agreement_summary(&proposal()).await.unwrap();
    let veto = summary.veto.clone().unwrap();
    assert_eq!(veto.member.display_name.as_deref(), Some("Member 3"));
    assert_eq!(veto.reason.as_deref(), Some("treasury risk"));
    assert!(!summary.threshold_met());

    // Withdrawing the veto releases the proposal
    let outcome = manager.remove_decision(&proposal(), &kusama(3), DecisionKind::Veto).await.unwrap();
    assert_eq!(outcome.effect, Effect::Removed);
    assert_eq!(outcome.status, ReferendumStatus::ReadyToVote);
}

#[tokio::test]
async fn test_recuse_after_threshold_reverts_to_waiting() {
    let manager = setup(5, Some(3)).await;
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::WaitingForAgreement).await.unwrap();

    for n in 1..=3 {
        manager.record_decision(&proposal(), &kusama(n), DecisionKind::Agree, None).await.unwrap();
    }
    assert_eq!(manager.proposal(&proposal()).await.unwrap().status(), ReferendumStatus::ReadyToVote);

    let outcome = manager.record_decision(&proposal(), &kusama(2), DecisionKind::Recuse, None).await.unwrap();
    assert_eq!(outcome.status, ReferendumStatus::WaitingForAgreement);
    assert_eq!(outcome.transitions.len(), 1);
    assert_eq!(outcome.transitions[0].cause, TransitionCause::Automatic);
    assert_eq!(outcome.summary.agreed_count(), 2);
    assert_eq!(outcome.summary.recused.len(), 1);
}

#[tokio::test]
async fn test_veto_while_ready_to_vote_reverts() {
    let manager = setup(3, Some(2)).await;
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::WaitingForAgreement).await.unwrap();
    manager.record_decision(&proposal(), &kusama(1), DecisionKind::Agree, None).await.unwrap();
    manager.record_decision(&proposal(), &kusama(2), DecisionKind::Agree, None).await.unwrap();

    let outcome = manager.record_decision(&proposal(), &kusama(3), DecisionKind::Veto, None).await.unwrap();
    assert_eq!(outcome.status, ReferendumStatus::WaitingForAgreement);
}

#[tokio::test]
async fn test_assignment_is_exclusive_and_idempotent() {
    let manager = setup(3, None).await;

    let first = manager.assign(&proposal(), &kusama(1)).await.unwrap();
    assert_eq!(first.effect, Effect::Assigned);
    assert_eq!(first.status, ReferendumStatus::Considering);

    let again = manager.assign(&proposal(), &kusama(1)).await.unwrap();
    assert_eq!(again.effect, Effect::AlreadyAssigned);
    assert!(again.transitions.is_empty());

    let err = manager.assign(&proposal(), &kusama(2)).await.unwrap_err();
    assert!(matches!(err, GovernanceError::PolicyViolation(PolicyViolation::AlreadyAssigned(ref holder)) if *holder == kusama(1)));

    let record = manager.proposal(&proposal()).await.unwrap();
    let assignments = record.decisions.iter().filter(|d| d.kind == DecisionKind::ResponsiblePerson).count();
    assert_eq!(assignments, 1);
}

#[tokio::test]
async fn test_unassign_keeps_veto_and_resets_status() {
    let manager = setup(3, Some(2)).await;
    manager.assign(&proposal(), &kusama(1)).await.unwrap();
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::ReadyForApproval).await.unwrap();
    manager.record_decision(&proposal(), &kusama(1), DecisionKind::Veto, Some("needs audit".into())).await.unwrap();
    manager.record_decision(&proposal(), &kusama(2), DecisionKind::Agree, None).await.unwrap();
    manager.suggest_vote(&proposal(), &kusama(1), VoteChoice::Nay, None).await.unwrap();

    let err = manager.unassign(&proposal(), &kusama(2), None).await.unwrap_err();
    assert!(matches!(err, GovernanceError::PolicyViolation(PolicyViolation::NotAssignee(_))));

    let outcome = manager.unassign(&proposal(), &kusama(1), Some("on leave".into())).await.unwrap();
    assert_eq!(outcome.effect, Effect::Unassigned);
    assert_eq!(outcome.status, ReferendumStatus::NotStarted);
    assert!(outcome.summary.is_vetoed());

    let record = manager.proposal(&proposal()).await.unwrap();
    assert!(record.decisions.assignment().is_none());
    assert_eq!(record.decisions.vetoes().len(), 1);
    assert_eq!(record.decisions.len(), 2);
    assert!(record.proposal.suggested_vote.is_none());
    let note = record.proposal.notes.last().unwrap();
    assert!(note.text.contains("nay"));
    assert!(note.text.contains("on leave"));

    // The role is free again
    let outcome = manager.assign(&proposal(), &kusama(2)).await.unwrap();
    assert_eq!(outcome.effect, Effect::Assigned);
}

#[tokio::test]
async fn test_members_match_across_network_encodings() {
    let manager = setup(3, Some(1)).await;
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::WaitingForAgreement).await.unwrap();

    // Generic substrate spelling of a Kusama roster member
    let westend_spelling = address(2, Network::Westend);
    assert_ne!(westend_spelling, kusama(2));

    let outcome = manager.record_decision(&proposal(), &westend_spelling, DecisionKind::Agree, None).await.unwrap();
    assert_eq!(outcome.summary.agreed[0].address, kusama(2));
    assert_eq!(outcome.status, ReferendumStatus::ReadyToVote);

    // Padded input still resolves
    let padded = format!("  {}  ", kusama(3));
    manager.record_decision(&proposal(), &padded, DecisionKind::FlagForDiscussion, None).await.unwrap();
    let summary = manager.agreement_summary(&proposal()).await.unwrap();
    assert_eq!(summary.flagged.len(), 1);
}

#[tokio::test]
async fn test_records_survive_restart_on_file_storage() {
    let dir = tempdir().unwrap();
    let fetcher: Arc<dyn RosterFetcher> = Arc::new(StaticFetcher::new(roster(3, Some(2))));

    {
        let storage = Arc::new(FileStorage::new(dir.path()).await.unwrap());
        let manager = setup_with(storage, fetcher.clone()).await;
        manager.assign(&proposal(), &kusama(1)).await.unwrap();
        manager.record_decision(&proposal(), &kusama(2), DecisionKind::Agree, Some("looks fine".into())).await.unwrap();
    }

    // Reopen through the service configuration
    let mut config = CouncilConfig::default();
    config.storage.path = dir.path().to_path_buf();
    let manager = CouncilManager::open(fetcher, Arc::new(ManualClock::default()), &config).await.unwrap();
    manager.register_dao(dao());
    let record = manager.proposal(&proposal()).await.unwrap();
    assert_eq!(record.status(), ReferendumStatus::Considering);
    assert_eq!(record.decisions.len(), 2);
    assert_eq!(record.revision, 2);
}

#[tokio::test]
async fn test_cancelled_operation_leaves_no_trace() -> anyhow::Result<()> {
    let manager = setup_with(Arc::new(MemoryStorage::new()), Arc::new(HangingFetcher)).await;

    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        manager.record_decision(&proposal(), &kusama(1), DecisionKind::Agree, None),
    )
    .await;
    assert!(attempt.is_err());

    let record = manager.proposal(&proposal()).await?;
    assert!(record.decisions.is_empty());
    assert_eq!(record.revision, 0);
    Ok(())
}

#[tokio::test]
async fn test_operation_cancelled_before_commit_leaves_no_trace() -> anyhow::Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let repository = Arc::new(StallingRepository::new(storage));
    let clock = Arc::new(ManualClock::default());
    let config = CouncilConfig::default();
    let rosters = Arc::new(RosterCache::new(
        Arc::new(StaticFetcher::new(roster(3, Some(1)))),
        clock.clone(),
        &config.roster,
    ));
    let manager = CouncilManager::new(repository.clone(), rosters, clock, &config);
    manager.register_dao(dao());
    manager.register_proposal(proposal()).await?;
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::WaitingForAgreement).await?;

    // The agreement and the transition it triggers are both applied in
    // memory when the commit stalls
    repository.stall.store(true, Ordering::SeqCst);
    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        manager.record_decision(&proposal(), &kusama(2), DecisionKind::Agree, None),
    )
    .await;
    assert!(attempt.is_err());
    repository.stall.store(false, Ordering::SeqCst);

    let record = manager.proposal(&proposal()).await?;
    assert!(record.decisions.is_empty());
    assert_eq!(record.status(), ReferendumStatus::WaitingForAgreement);
    assert_eq!(record.revision, 1);

    // The proposal lock was released with the cancelled operation
    let outcome = manager.record_decision(&proposal(), &kusama(2), DecisionKind::Agree, None).await?;
    assert_eq!(outcome.status, ReferendumStatus::ReadyToVote);
    assert_eq!(manager.proposal(&proposal()).await?.revision, 2);
    Ok(())
}

#[tokio::test]
async fn test_unknown_dao_and_proposal() {
    let manager = setup(3, None).await;

    let err = manager
        .record_decision(&ProposalKey::new("ghost-dao", Network::Kusama, 1), &kusama(1), DecisionKind::Agree, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::DaoNotFound(_)));

    let err = manager
        .record_decision(&ProposalKey::new("open-dao", Network::Kusama, 999), &kusama(1), DecisionKind::Agree, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::ProposalNotFound(_)));
}

#[tokio::test]
async fn test_config_default_threshold_applies() -> anyhow::Result<()> {
    let config = CouncilConfig::from_toml_str(
        r#"
        environment = "test"
        log_level = "debug"

        [roster]
        freshness_secs = 60
        default_threshold = 1
        "#,
    )?;

    let manager = CouncilManager::with_storage(
        Arc::new(MemoryStorage::new()),
        Arc::new(StaticFetcher::new(roster(4, None))),
        Arc::new(ManualClock::default()),
        &config,
    );
    manager.register_dao(dao());
    manager.register_proposal(proposal()).await?;
    manager.set_status(&proposal(), &kusama(1), ReferendumStatus::WaitingForAgreement).await?;

    let outcome = manager.record_decision(&proposal(), &kusama(4), DecisionKind::Agree, None).await?;
    assert_eq!(outcome.summary.threshold, 1);
    assert_eq!(outcome.status, ReferendumStatus::ReadyToVote);
    Ok(())
}
