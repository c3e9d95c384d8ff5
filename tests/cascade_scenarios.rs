use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ledger_lifecycle::lifecycle::{CascadeRoot, LifecycleAction, LifecycleError, LifecycleRequest};
use ledger_lifecycle::model::{Client, ClientBranch, DeletionMark, EntityKind, LifecycleNode, Owner};
use ledger_lifecycle::store::{
    CommitReceipt, InMemoryLedgerStore, LedgerStore, PendingChange, StoreError, StoreResult,
    UnitOfWork,
};
use ledger_lifecycle::{DeletionType, LifecycleManager};
use serde_json::Value;
use tokio_test::assert_ok;
use uuid::Uuid;


/// Delegates to an in-memory store and keeps every change it was asked to commit.
#[derive(Clone, Default)]
struct RecordingStore {
    inner: InMemoryLedgerStore,
    committed: Arc<Mutex<Vec<PendingChange>>>,
}

impl RecordingStore {
    fn changes(&self) -> Vec<PendingChange> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerStore for RecordingStore {
    async fn load_client_subtree(&self, id: Uuid, include: bool) -> StoreResult<Option<Client>> {
        self.inner.load_client_subtree(id, include).await
    }

    async fn load_branch_subtree(
        &self,
        id: Uuid,
        include: bool,
    ) -> StoreResult<Option<ClientBranch>> {
        self.inner.load_branch_subtree(id, include).await
    }

    async fn load_deletion_mark(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> StoreResult<Option<DeletionMark>> {
        self.inner.load_deletion_mark(kind, id).await
    }

    async fn commit(&self, work: UnitOfWork) -> StoreResult<CommitReceipt> {
        self.committed
            .lock()
            .unwrap()
            .extend(work.changes().iter().cloned());
        self.inner.commit(work).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}


/// Loads normally but refuses every commit.
struct FailingCommitStore {
    inner: InMemoryLedgerStore,
}

#[async_trait]
impl LedgerStore for FailingCommitStore {
    async fn load_client_subtree(&self, id: Uuid, include: bool) -> StoreResult<Option<Client>> {
        self.inner.load_client_subtree(id, include).await
    }

    async fn load_branch_subtree(
        &self,
        id: Uuid,
        include: bool,
    ) -> StoreResult<Option<ClientBranch>> {
        self.inner.load_branch_subtree(id, include).await
    }

    async fn load_deletion_mark(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> StoreResult<Option<DeletionMark>> {
        self.inner.load_deletion_mark(kind, id).await
    }

    async fn commit(&self, _work: UnitOfWork) -> StoreResult<CommitReceipt> {
        Err(StoreError::Unexpected(anyhow::anyhow!("disk full")))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}


/// Serves a client captured earlier, the way a second request that loaded before a
/// concurrent commit would see it.
struct StaleReadStore {
    inner: InMemoryLedgerStore,
    stale: Client,
}

#[async_trait]
impl LedgerStore for StaleReadStore {
    async fn load_client_subtree(&self, _id: Uuid, _include: bool) -> StoreResult<Option<Client>> {
        Ok(Some(self.stale.clone()))
    }

    async fn load_branch_subtree(
        &self,
        id: Uuid,
        include: bool,
    ) -> StoreResult<Option<ClientBranch>> {
        self.inner.load_branch_subtree(id, include).await
    }

    async fn load_deletion_mark(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> StoreResult<Option<DeletionMark>> {
        self.inner.load_deletion_mark(kind, id).await
    }

    async fn commit(&self, work: UnitOfWork) -> StoreResult<CommitReceipt> {
        self.inner.commit(work).await
    }

    fn backend_name(&self) -> &'static str {
        "stale"
    }
}


fn large_client() -> Client {
    let mut client = Client::new("Acme Holdings");
    client
        .add_organization("Acme Freight")
        .add_record("Founding charter")
        .add_license("LIC-001")
        .add_license("LIC-002")
        .add_worker("Dana")
        .add_car("AA-001")
        .add_credential("tax-portal", "acme");
    client.add_organization("Acme Retail").add_worker("Lee");
    client.add_external_worker("Auditor");

    let north = client.add_branch("North");
    north.add_organization("North Depot").add_car("NN-100").add_car("NN-101");
    north.add_external_worker("Night guard");

    let south = client.add_branch("South");
    south.add_organization("South Office").add_credential("bank", "south");
    client
}

async fn seeded(client: Client) -> (LifecycleManager, RecordingStore) {
    let store = RecordingStore::default();
    assert_ok!(store.inner.insert_client(client).await);
    (LifecycleManager::new(Arc::new(store.clone())), store)
}

fn strip_bookkeeping(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("version");
            map.remove("updated_at");
            map.values_mut().for_each(strip_bookkeeping);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_bookkeeping),
        _ => {}
    }
}

fn parent_edges(client: &Client) -> Vec<(Uuid, Uuid)> {
    let mut edges = Vec::new();
    let mut holdings = vec![(client.meta.id, &client.organizations, &client.external_workers)];
    for branch in &client.branches {
        edges.push((branch.meta.id, client.meta.id));
        holdings.push((branch.meta.id, &branch.organizations, &branch.external_workers));
    }
    for (owner_id, organizations, workers) in holdings {
        for organization in organizations.iter() {
            edges.push((organization.meta.id, owner_id));
            organization.for_each_node(&mut |node| {
                if node.id() != organization.meta.id {
                    edges.push((node.id(), organization.meta.id));
                }
            });
        }
        for worker in workers.iter() {
            edges.push((worker.meta.id, owner_id));
        }
    }
    edges
}


#[tokio::test]
async fn scenario_a_validate_counts_organization_and_licenses() {
    let mut client = Client::new("C");
    client.add_organization("O").add_license("L-1").add_license("L-2");
    let client_id = client.meta.id;
    let (manager, store) = seeded(client).await;

    let report = manager.validate(client_id).await;

    assert!(report.success);
    assert_eq!(report.deletion_type, DeletionType::Validation);
    assert_eq!(report.counts.len(), 3);
    assert_eq!(report.count(EntityKind::Clients), 1);
    assert_eq!(report.count(EntityKind::Organizations), 1);
    assert_eq!(report.count(EntityKind::OrganizationLicenses), 2);
    assert_eq!(report.total_affected, 4);
    assert_eq!(report.warnings, vec!["this client has 1 organization(s)".to_string()]);
    assert!(store.changes().is_empty());
}

#[tokio::test]
async fn scenario_b_soft_delete_then_restore_through_a_branch() {
    let mut client = Client::new("C");
    client.add_branch("B").add_organization("O").add_car("CAR-1");
    let client_id = client.meta.id;
    let (manager, store) = seeded(client).await;

    let deleted = manager.soft_delete(client_id).await;
    assert!(deleted.success);
    assert_eq!(deleted.deletion_type, DeletionType::SoftDelete);
    assert_eq!(deleted.total_affected, 4);

    let loaded = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();
    let mut flags = Vec::new();
    loaded.for_each_node(&mut |node| flags.push((node.kind(), node.is_deleted())));
    assert_eq!(
        flags,
        vec![
            (EntityKind::Clients, true),
            (EntityKind::ClientBranches, true),
            (EntityKind::Organizations, true),
            (EntityKind::OrganizationCars, true),
        ]
    );

    let restored = manager.restore(client_id).await;
    assert!(restored.success);
    assert_eq!(restored.total_affected, 4);

    let loaded = store.inner.load_client_subtree(client_id, false).await.unwrap().unwrap();
    assert_eq!(loaded.subtree_size(), 4);
    loaded.for_each_node(&mut |node| assert!(!node.is_deleted()));
}

#[tokio::test]
async fn scenario_c_restore_of_live_client_is_invalid_state() {
    let client = large_client();
    let client_id = client.meta.id;
    let (manager, store) = seeded(client).await;
    let before = store.inner.snapshot().await;

    let report = manager.restore(client_id).await;
    assert!(!report.success);
    assert_eq!(report.deletion_type, DeletionType::Restore);
    assert!(report.error_message.unwrap().starts_with("Invalid state"));
    assert_eq!(report.total_affected, 0);
    assert!(report.counts.is_empty());

    let err = manager
        .try_execute(LifecycleRequest::new(
            LifecycleAction::Restore,
            CascadeRoot::Client(client_id),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));

    assert!(store.changes().is_empty());
    assert_eq!(store.inner.snapshot().await, before);
}

#[tokio::test]
async fn scenario_d_hard_delete_removes_worker_then_organization_then_client() {
    let mut client = Client::new("C");
    client.add_organization("O").add_worker("W");
    let client_id = client.meta.id;
    let (manager, store) = seeded(client).await;

    let report = manager.hard_delete(client_id).await;
    assert!(report.success);
    assert_eq!(report.deletion_type, DeletionType::HardDelete);
    assert_eq!(report.total_affected, 3);

    let kinds: Vec<EntityKind> = store.changes().iter().map(PendingChange::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntityKind::OrganizationWorkers,
            EntityKind::Organizations,
            EntityKind::Clients,
        ]
    );
    assert_eq!(store.inner.row_count().await, 0);
}


#[tokio::test]
async fn count_conservation_holds_for_every_operation() {
    let client = large_client();
    let client_id = client.meta.id;
    let expected = client.subtree_size();
    let (manager, _store) = seeded(client).await;

    for report in [
        manager.validate(client_id).await,
        manager.soft_delete(client_id).await,
        manager.restore(client_id).await,
        manager.hard_delete(client_id).await,
    ] {
        assert!(report.success, "{:?}", report.error_message);
        assert_eq!(report.total_affected, report.counts.values().sum::<usize>());
        assert_eq!(report.total_affected, expected);
    }
}

#[tokio::test]
async fn counts_roll_up_across_client_and_branches() {
    let client = large_client();
    let client_id = client.meta.id;
    let (manager, _store) = seeded(client).await;

    let report = manager.validate(client_id).await;
    assert_eq!(report.count(EntityKind::Organizations), 4);
    assert_eq!(report.count(EntityKind::OrganizationCars), 3);
    assert_eq!(report.count(EntityKind::ExternalWorkers), 2);
    assert_eq!(report.count(EntityKind::OrganizationCredentials), 2);
    assert_eq!(report.count(EntityKind::ClientBranches), 2);
    assert_eq!(
        report.warnings,
        vec![
            "this client has 2 organization(s)".to_string(),
            "this client has 1 external worker(s)".to_string(),
            "this client has 2 branch(es)".to_string(),
            "this branch has 1 organization(s)".to_string(),
            "this branch has 1 external worker(s)".to_string(),
            "this branch has 1 organization(s)".to_string(),
        ]
    );
}

#[tokio::test]
async fn restore_after_soft_delete_returns_the_original_tree() {
    let client = large_client();
    let client_id = client.meta.id;
    let (manager, store) = seeded(client).await;

    let original = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();
    assert!(manager.soft_delete(client_id).await.success);
    assert!(manager.restore(client_id).await.success);
    let round_trip = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();

    let mut before = serde_json::to_value(&original).unwrap();
    let mut after = serde_json::to_value(&round_trip).unwrap();
    strip_bookkeeping(&mut before);
    strip_bookkeeping(&mut after);
    assert_eq!(before, after);
}

#[tokio::test]
async fn soft_delete_leaves_no_live_descendant_and_flags_agree() {
    let client = large_client();
    let client_id = client.meta.id;
    let (manager, store) = seeded(client).await;

    assert!(manager.soft_delete(client_id).await.success);
    let deleted = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();
    let stamp = deleted.deleted_at();
    assert!(stamp.is_some());
    deleted.for_each_node(&mut |node| {
        assert!(node.is_deleted(), "{:?} {} left live", node.kind(), node.id());
        assert_eq!(node.is_deleted(), node.deleted_at().is_some());
        assert_eq!(node.deleted_at(), stamp);
    });

    assert!(manager.restore(client_id).await.success);
    let restored = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();
    restored.for_each_node(&mut |node| {
        assert!(!node.is_deleted());
        assert_eq!(node.is_deleted(), node.deleted_at().is_some());
    });
}

#[tokio::test]
async fn validate_matches_the_cascade_on_a_partly_deleted_tree() {
    let client = large_client();
    let client_id = client.meta.id;
    let north_id = client.branches[0].meta.id;
    let expected = client.subtree_size();
    let (manager, _store) = seeded(client).await;
    assert!(manager.soft_delete_branch(north_id).await.success);

    let preview = manager.validate(client_id).await;
    assert!(preview.success, "{:?}", preview.error_message);
    assert_eq!(preview.total_affected, expected);

    let soft = manager.soft_delete(client_id).await;
    assert_eq!(soft.counts, preview.counts);

    let preview = manager.validate(client_id).await;
    assert!(preview.success, "{:?}", preview.error_message);
    let hard = manager.hard_delete(client_id).await;
    assert!(hard.success, "{:?}", hard.error_message);
    assert_eq!(hard.counts, preview.counts);
    assert_eq!(hard.total_affected, expected);
}

#[tokio::test]
async fn round_trip_keeps_a_branch_deleted_beforehand() {
    let client = large_client();
    let client_id = client.meta.id;
    let north_id = client.branches[0].meta.id;
    let (manager, store) = seeded(client).await;

    assert!(manager.soft_delete_branch(north_id).await.success);
    let before = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();
    let north_stamp = before.branches[0].deleted_at();
    assert!(north_stamp.is_some());

    assert!(manager.soft_delete(client_id).await.success);
    let deleted = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();
    assert_eq!(deleted.branches[0].deleted_at(), north_stamp);
    deleted.for_each_node(&mut |node| assert!(node.is_deleted()));

    assert!(manager.restore(client_id).await.success);
    let after = store.inner.load_client_subtree(client_id, true).await.unwrap().unwrap();
    assert!(!after.is_deleted());
    after.branches[0].for_each_node(&mut |node| {
        assert_eq!(node.deleted_at(), north_stamp, "{:?} {}", node.kind(), node.id());
    });
    assert!(!after.branches[1].is_deleted());

    let mut expected = serde_json::to_value(&before).unwrap();
    let mut actual = serde_json::to_value(&after).unwrap();
    strip_bookkeeping(&mut expected);
    strip_bookkeeping(&mut actual);
    assert_eq!(expected, actual);
}

#[tokio::test]
async fn hard_delete_never_removes_a_parent_before_its_children() {
    let client = large_client();
    let client_id = client.meta.id;
    let edges = parent_edges(&client);
    let (manager, store) = seeded(client).await;

    let report = manager.hard_delete(client_id).await;
    assert!(report.success, "{:?}", report.error_message);

    let changes = store.changes();
    assert!(changes.iter().all(PendingChange::is_remove));
    let position: HashMap<Uuid, usize> = changes
        .iter()
        .enumerate()
        .map(|(i, change)| (change.id(), i))
        .collect();
    assert_eq!(position.len(), report.total_affected);
    for (child, parent) in edges {
        assert!(
            position[&child] < position[&parent],
            "{} removed after its parent {}",
            child,
            parent
        );
    }
    assert_eq!(store.inner.row_count().await, 0);
}


#[tokio::test]
async fn branch_operations_leave_the_parent_client_alone() {
    let client = large_client();
    let client_id = client.meta.id;
    let north = client.branches[0].clone();
    let south_id = client.branches[1].meta.id;
    let (manager, store) = seeded(client).await;

    let preview = manager.validate_branch(north.meta.id).await;
    assert_eq!(preview.total_affected, north.subtree_size());
    assert_eq!(preview.count(EntityKind::Clients), 0);

    let deleted = manager.soft_delete_branch(north.meta.id).await;
    assert!(deleted.success);
    assert_eq!(deleted.total_affected, 5);
    assert_eq!(deleted.count(EntityKind::ClientBranches), 1);

    let live = store.inner.load_client_subtree(client_id, false).await.unwrap().unwrap();
    assert!(!live.is_deleted());
    assert_eq!(live.branches.len(), 1);
    assert_eq!(live.branches[0].meta.id, south_id);

    assert!(manager.restore_branch(north.meta.id).await.success);
    let live = store.inner.load_client_subtree(client_id, false).await.unwrap().unwrap();
    assert_eq!(live.branches.len(), 2);

    let removed = manager.hard_delete_branch(north.meta.id).await;
    assert!(removed.success);
    assert!(!store.inner.contains(EntityKind::ClientBranches, north.meta.id).await);
    assert!(store.inner.contains(EntityKind::Clients, client_id).await);
    assert!(store.inner.contains(EntityKind::ClientBranches, south_id).await);
    let north_org = &north.organizations[0];
    assert!(north_org.owner == Owner::Branch(north.meta.id));
    assert!(!store.inner.contains(EntityKind::Organizations, north_org.meta.id).await);
}

#[tokio::test]
async fn restore_branch_requires_a_deleted_branch() {
    let client = large_client();
    let branch_id = client.branches[1].meta.id;
    let (manager, store) = seeded(client).await;

    let report = manager.restore_branch(branch_id).await;
    assert!(!report.success);
    assert!(report.error_message.unwrap().contains("is not deleted"));
    assert!(store.changes().is_empty());
}


#[tokio::test]
async fn restore_branch_waits_for_its_client() {
    let client = large_client();
    let client_id = client.meta.id;
    let north_id = client.branches[0].meta.id;
    let (manager, store) = seeded(client).await;
    assert!(manager.soft_delete(client_id).await.success);
    let committed = store.changes().len();
    let before = store.inner.snapshot().await;

    let report = manager.restore_branch(north_id).await;
    assert!(!report.success);
    assert_eq!(report.deletion_type, DeletionType::Restore);
    assert!(report.error_message.unwrap().starts_with("Invalid state"));
    assert_eq!(store.changes().len(), committed);
    assert_eq!(store.inner.snapshot().await, before);

    assert!(manager.restore(client_id).await.success);
    let live = store.inner.load_client_subtree(client_id, false).await.unwrap().unwrap();
    assert_eq!(live.subtree_size(), before.row_count());
}


#[tokio::test]
async fn persistence_failure_reports_and_commits_nothing() {
    let client = large_client();
    let client_id = client.meta.id;
    let inner = InMemoryLedgerStore::new();
    inner.insert_client(client).await.unwrap();
    let before = inner.snapshot().await;
    let manager = LifecycleManager::new(Arc::new(FailingCommitStore {
        inner: inner.clone(),
    }));

    for report in [
        manager.soft_delete(client_id).await,
        manager.hard_delete(client_id).await,
    ] {
        assert!(!report.success);
        assert!(report.error_message.unwrap().starts_with("Persistence failure"));
        assert_eq!(report.total_affected, 0);
    }

    let err = manager
        .try_execute(LifecycleRequest::new(
            LifecycleAction::SoftDelete,
            CascadeRoot::Client(client_id),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::PersistenceFailure(_)));
    assert_eq!(inner.snapshot().await, before);
}

#[tokio::test]
async fn stale_cascade_conflicts_instead_of_overwriting() {
    let client = large_client();
    let client_id = client.meta.id;
    let inner = InMemoryLedgerStore::new();
    inner.insert_client(client).await.unwrap();
    let stale = inner.load_client_subtree(client_id, true).await.unwrap().unwrap();

    let current = LifecycleManager::new(Arc::new(inner.clone()));
    assert!(current.soft_delete(client_id).await.success);
    let after_first = inner.snapshot().await;

    let late = LifecycleManager::new(Arc::new(StaleReadStore {
        inner: inner.clone(),
        stale,
    }));
    let report = late.hard_delete(client_id).await;
    assert!(!report.success);
    assert!(report.error_message.unwrap().contains("conflict"));
    assert_eq!(inner.snapshot().await, after_first);
}
