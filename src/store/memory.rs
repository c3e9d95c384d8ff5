//! In-memory implementation of the ledger store.
//!
//! Rows are kept flat, one table per entity kind, in insertion order, the way a
//! relational backend would keep them. Subtrees are assembled on load by scanning
//! the owning ids, which is fine for tests, local tooling and small ledgers.
//!
//! A single `RwLock` guards every table. A commit clones the tables, applies each
//! change to the clone in order, and swaps the clone in only when every change
//! succeeded, so a failed commit leaves nothing behind.
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    CommitReceipt, LedgerSnapshot, LedgerStore, PendingChange, StoreError, StoreResult,
    UnitOfWork,
};
use crate::model::{
    Client, ClientBranch, DeletionMark, EntityKind, ExternalWorker, LifecycleNode, Organization,
    OrganizationCar, OrganizationCredential, OrganizationLicense, OrganizationRecord,
    OrganizationWorker, Owner, RecordMeta,
};


#[derive(Debug, Clone, Default)]
struct LedgerTables {
    clients: Vec<Client>,
    branches: Vec<ClientBranch>,
    organizations: Vec<Organization>,
    external_workers: Vec<ExternalWorker>,
    records: Vec<OrganizationRecord>,
    licenses: Vec<OrganizationLicense>,
    workers: Vec<OrganizationWorker>,
    cars: Vec<OrganizationCar>,
    credentials: Vec<OrganizationCredential>,
}

/// Rows visible under the requested filter, in insertion order.
fn collect_rows<T, F>(rows: &[T], include_soft_deleted: bool, owned_by: F) -> Vec<T>
where
    T: LifecycleNode + Clone,
    F: Fn(&T) -> bool,
{
    rows.iter()
        .filter(|row| owned_by(*row) && (include_soft_deleted || !row.is_deleted()))
        .cloned()
        .collect()
}

fn find<T: LifecycleNode>(rows: &[T], id: Uuid) -> Option<&T> {
    rows.iter().find(|row| row.id() == id)
}

fn find_meta<T: LifecycleNode>(rows: &[T], id: Uuid) -> Option<&RecordMeta> {
    find(rows, id).map(|row| row.meta())
}

fn find_meta_mut<T: LifecycleNode>(rows: &mut [T], id: Uuid) -> Option<&mut RecordMeta> {
    rows.iter_mut()
        .find(|row| row.id() == id)
        .map(|row| row.meta_mut())
}

fn has<T: LifecycleNode>(rows: &[T], id: Uuid) -> bool {
    find(rows, id).is_some()
}

fn take<T: LifecycleNode>(rows: &mut Vec<T>, id: Uuid) -> bool {
    match rows.iter().position(|row| row.id() == id) {
        Some(index) => {
            rows.remove(index);
            true
        }
        None => false,
    }
}

fn insert_unique<T: LifecycleNode>(rows: &mut Vec<T>, row: T) -> StoreResult<()> {
    if has(rows, row.id()) {
        return Err(StoreError::Conflict(format!(
            "{} {} already exists",
            row.kind().noun(),
            row.id()
        )));
    }
    rows.push(row);
    Ok(())
}

impl LedgerTables {
    fn insert_client_tree(&mut self, mut client: Client) -> StoreResult<()> {
        let organizations = std::mem::take(&mut client.organizations);
        let workers = std::mem::take(&mut client.external_workers);
        let branches = std::mem::take(&mut client.branches);

        insert_unique(&mut self.clients, client)?;
        for organization in organizations {
            self.insert_organization_tree(organization)?;
        }
        for worker in workers {
            self.insert_external_worker(worker)?;
        }
        for branch in branches {
            self.insert_branch_tree(branch)?;
        }
        Ok(())
    }

    fn insert_branch_tree(&mut self, mut branch: ClientBranch) -> StoreResult<()> {
        if !has(&self.clients, branch.parent_client_id) {
            return Err(StoreError::Integrity(format!(
                "branch {} references missing client {}",
                branch.meta.id, branch.parent_client_id
            )));
        }
        let organizations = std::mem::take(&mut branch.organizations);
        let workers = std::mem::take(&mut branch.external_workers);

        insert_unique(&mut self.branches, branch)?;
        for organization in organizations {
            self.insert_organization_tree(organization)?;
        }
        for worker in workers {
            self.insert_external_worker(worker)?;
        }
        Ok(())
    }

    fn owner_exists(&self, owner: &Owner) -> bool {
        match owner {
            Owner::Client(id) => has(&self.clients, *id),
            Owner::Branch(id) => has(&self.branches, *id),
        }
    }

    fn insert_organization_tree(&mut self, mut organization: Organization) -> StoreResult<()> {
        if !self.owner_exists(&organization.owner) {
            return Err(StoreError::Integrity(format!(
                "organization {} references missing owner {}",
                organization.meta.id,
                organization.owner.id()
            )));
        }
        let records = std::mem::take(&mut organization.records);
        let licenses = std::mem::take(&mut organization.licenses);
        let workers = std::mem::take(&mut organization.workers);
        let cars = std::mem::take(&mut organization.cars);
        let credentials = std::mem::take(&mut organization.credentials);

        insert_unique(&mut self.organizations, organization)?;
        for row in records {
            insert_unique(&mut self.records, row)?;
        }
        for row in licenses {
            insert_unique(&mut self.licenses, row)?;
        }
        for row in workers {
            insert_unique(&mut self.workers, row)?;
        }
        for row in cars {
            insert_unique(&mut self.cars, row)?;
        }
        for row in credentials {
            insert_unique(&mut self.credentials, row)?;
        }
        Ok(())
    }

    fn insert_external_worker(&mut self, worker: ExternalWorker) -> StoreResult<()> {
        if !self.owner_exists(&worker.owner) {
            return Err(StoreError::Integrity(format!(
                "external worker {} references missing owner {}",
                worker.meta.id,
                worker.owner.id()
            )));
        }
        insert_unique(&mut self.external_workers, worker)
    }

    fn assemble_organization(&self, row: Organization, include_soft_deleted: bool) -> Organization {
        let id = row.meta.id;
        Organization {
            records: collect_rows(&self.records, include_soft_deleted, |r| r.organization_id == id),
            licenses: collect_rows(&self.licenses, include_soft_deleted, |r| r.organization_id == id),
            workers: collect_rows(&self.workers, include_soft_deleted, |r| r.organization_id == id),
            cars: collect_rows(&self.cars, include_soft_deleted, |r| r.organization_id == id),
            credentials: collect_rows(&self.credentials, include_soft_deleted, |r| {
                r.organization_id == id
            }),
            ..row
        }
    }

    fn assemble_owned(
        &self,
        owner: Owner,
        include_soft_deleted: bool,
    ) -> (Vec<Organization>, Vec<ExternalWorker>) {
        let organizations = collect_rows(&self.organizations, include_soft_deleted, |o| {
            o.owner == owner
        })
        .into_iter()
        .map(|row| self.assemble_organization(row, include_soft_deleted))
        .collect();
        let workers = collect_rows(&self.external_workers, include_soft_deleted, |w| {
            w.owner == owner
        });
        (organizations, workers)
    }

    fn assemble_branch(&self, branch_id: Uuid, include_soft_deleted: bool) -> Option<ClientBranch> {
        let row = find(&self.branches, branch_id)?;
        if row.is_deleted() && !include_soft_deleted {
            return None;
        }
        Some(self.fill_branch(row.clone(), include_soft_deleted))
    }

    fn fill_branch(&self, row: ClientBranch, include_soft_deleted: bool) -> ClientBranch {
        let (organizations, external_workers) =
            self.assemble_owned(Owner::Branch(row.meta.id), include_soft_deleted);
        ClientBranch {
            organizations,
            external_workers,
            ..row
        }
    }

    fn assemble_client(&self, client_id: Uuid, include_soft_deleted: bool) -> Option<Client> {
        let row = find(&self.clients, client_id)?;
        if row.is_deleted() && !include_soft_deleted {
            return None;
        }
        let (organizations, external_workers) =
            self.assemble_owned(Owner::Client(client_id), include_soft_deleted);
        let branches = collect_rows(&self.branches, include_soft_deleted, |b| {
            b.parent_client_id == client_id
        })
        .into_iter()
        .map(|branch| self.fill_branch(branch, include_soft_deleted))
        .collect();

        Some(Client {
            organizations,
            external_workers,
            branches,
            ..row.clone()
        })
    }

    fn meta(&self, kind: EntityKind, id: Uuid) -> Option<&RecordMeta> {
        match kind {
            EntityKind::Clients => find_meta(&self.clients, id),
            EntityKind::ClientBranches => find_meta(&self.branches, id),
            EntityKind::Organizations => find_meta(&self.organizations, id),
            EntityKind::OrganizationRecords => find_meta(&self.records, id),
            EntityKind::OrganizationLicenses => find_meta(&self.licenses, id),
            EntityKind::OrganizationWorkers => find_meta(&self.workers, id),
            EntityKind::OrganizationCars => find_meta(&self.cars, id),
            EntityKind::OrganizationCredentials => find_meta(&self.credentials, id),
            EntityKind::ExternalWorkers => find_meta(&self.external_workers, id),
        }
    }

    fn meta_mut(&mut self, kind: EntityKind, id: Uuid) -> Option<&mut RecordMeta> {
        match kind {
            EntityKind::Clients => find_meta_mut(&mut self.clients, id),
            EntityKind::ClientBranches => find_meta_mut(&mut self.branches, id),
            EntityKind::Organizations => find_meta_mut(&mut self.organizations, id),
            EntityKind::OrganizationRecords => find_meta_mut(&mut self.records, id),
            EntityKind::OrganizationLicenses => find_meta_mut(&mut self.licenses, id),
            EntityKind::OrganizationWorkers => find_meta_mut(&mut self.workers, id),
            EntityKind::OrganizationCars => find_meta_mut(&mut self.cars, id),
            EntityKind::OrganizationCredentials => find_meta_mut(&mut self.credentials, id),
            EntityKind::ExternalWorkers => find_meta_mut(&mut self.external_workers, id),
        }
    }

    fn contains(&self, kind: EntityKind, id: Uuid) -> bool {
        self.meta(kind, id).is_some()
    }

    /// Rows that still reference `id` as their parent.
    fn dependents(&self, kind: EntityKind, id: Uuid) -> usize {
        match kind {
            EntityKind::Clients => {
                let owner = Owner::Client(id);
                self.organizations.iter().filter(|o| o.owner == owner).count()
                    + self.external_workers.iter().filter(|w| w.owner == owner).count()
                    + self.branches.iter().filter(|b| b.parent_client_id == id).count()
            }
            EntityKind::ClientBranches => {
                let owner = Owner::Branch(id);
                self.organizations.iter().filter(|o| o.owner == owner).count()
                    + self.external_workers.iter().filter(|w| w.owner == owner).count()
            }
            EntityKind::Organizations => {
                self.records.iter().filter(|r| r.organization_id == id).count()
                    + self.licenses.iter().filter(|r| r.organization_id == id).count()
                    + self.workers.iter().filter(|r| r.organization_id == id).count()
                    + self.cars.iter().filter(|r| r.organization_id == id).count()
                    + self.credentials.iter().filter(|r| r.organization_id == id).count()
            }
            _ => 0,
        }
    }

    fn remove(&mut self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::Clients => take(&mut self.clients, id),
            EntityKind::ClientBranches => take(&mut self.branches, id),
            EntityKind::Organizations => take(&mut self.organizations, id),
            EntityKind::OrganizationRecords => take(&mut self.records, id),
            EntityKind::OrganizationLicenses => take(&mut self.licenses, id),
            EntityKind::OrganizationWorkers => take(&mut self.workers, id),
            EntityKind::OrganizationCars => take(&mut self.cars, id),
            EntityKind::OrganizationCredentials => take(&mut self.credentials, id),
            EntityKind::ExternalWorkers => take(&mut self.external_workers, id),
        }
    }

    fn check_version(&mut self, kind: EntityKind, id: Uuid, expected: u64) -> StoreResult<&mut RecordMeta> {
        let meta = self.meta_mut(kind, id).ok_or_else(|| {
            StoreError::Conflict(format!("{} {} no longer exists", kind.noun(), id))
        })?;
        if meta.version != expected {
            return Err(StoreError::Conflict(format!(
                "{} {} changed concurrently (expected version {}, found {})",
                kind.noun(),
                id,
                expected,
                meta.version
            )));
        }
        Ok(meta)
    }

    fn apply(&mut self, change: &PendingChange) -> StoreResult<()> {
        match change {
            PendingChange::SetDeletion {
                kind,
                id,
                expected_version,
                deleted_at,
                updated_at,
            } => {
                let meta = self.check_version(*kind, *id, *expected_version)?;
                meta.deletion = match deleted_at {
                    Some(at) => DeletionMark::deleted(*at),
                    None => DeletionMark::live(),
                };
                meta.updated_at = *updated_at;
                meta.version += 1;
                Ok(())
            }
            PendingChange::Remove {
                kind,
                id,
                expected_version,
            } => {
                self.check_version(*kind, *id, *expected_version)?;
                let dependents = self.dependents(*kind, *id);
                if dependents > 0 {
                    return Err(StoreError::Integrity(format!(
                        "{} {} still has {} dependent row(s)",
                        kind.noun(),
                        id,
                        dependents
                    )));
                }
                self.remove(*kind, *id);
                Ok(())
            }
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            clients: self.clients.clone(),
            branches: self.branches.clone(),
            organizations: self.organizations.clone(),
            external_workers: self.external_workers.clone(),
            records: self.records.clone(),
            licenses: self.licenses.clone(),
            workers: self.workers.clone(),
            cars: self.cars.clone(),
            credentials: self.credentials.clone(),
        }
    }

    /// Rebuilds tables from flat rows, parents first, checking every reference.
    fn from_snapshot(snapshot: LedgerSnapshot) -> StoreResult<Self> {
        let mut tables = Self::default();
        for client in snapshot.clients {
            tables.insert_client_tree(client)?;
        }
        for branch in snapshot.branches {
            tables.insert_branch_tree(branch)?;
        }
        for organization in snapshot.organizations {
            tables.insert_organization_tree(organization)?;
        }
        for worker in snapshot.external_workers {
            tables.insert_external_worker(worker)?;
        }

        for row in snapshot.records {
            tables.require_organization(row.organization_id, row.meta.id)?;
            insert_unique(&mut tables.records, row)?;
        }
        for row in snapshot.licenses {
            tables.require_organization(row.organization_id, row.meta.id)?;
            insert_unique(&mut tables.licenses, row)?;
        }
        for row in snapshot.workers {
            tables.require_organization(row.organization_id, row.meta.id)?;
            insert_unique(&mut tables.workers, row)?;
        }
        for row in snapshot.cars {
            tables.require_organization(row.organization_id, row.meta.id)?;
            insert_unique(&mut tables.cars, row)?;
        }
        for row in snapshot.credentials {
            tables.require_organization(row.organization_id, row.meta.id)?;
            insert_unique(&mut tables.credentials, row)?;
        }
        Ok(tables)
    }

    fn require_organization(&self, organization_id: Uuid, row_id: Uuid) -> StoreResult<()> {
        if has(&self.organizations, organization_id) {
            Ok(())
        } else {
            Err(StoreError::Integrity(format!(
                "row {} references missing organization {}",
                row_id, organization_id
            )))
        }
    }
}


/// In-memory ledger store. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<LedgerTables>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> StoreResult<Self> {
        let rows = snapshot.row_count();
        let tables = LedgerTables::from_snapshot(snapshot)?;
        info!("InMemoryLedgerStore loaded {} rows from snapshot", rows);
        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
        })
    }

    /// Loads a store from a JSON snapshot file.
    pub async fn open(path: &Path) -> crate::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&raw)?;
        Ok(Self::from_snapshot(snapshot)?)
    }

    /// Writes every row back out as a pretty-printed JSON snapshot.
    pub async fn save(&self, path: &Path) -> crate::Result<()> {
        let rendered = serde_json::to_string_pretty(&self.snapshot().await)?;
        tokio::fs::write(path, rendered).await?;
        debug!("Ledger snapshot written to {}", path.display());
        Ok(())
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.tables.read().await.snapshot()
    }

    /// Inserts a client together with everything nested under it.
    pub async fn insert_client(&self, client: Client) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        staged.insert_client_tree(client)?;
        *tables = staged;
        Ok(())
    }

    /// Inserts a branch (and its nested rows) under an existing client.
    pub async fn insert_branch(&self, branch: ClientBranch) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        staged.insert_branch_tree(branch)?;
        *tables = staged;
        Ok(())
    }

    pub async fn contains(&self, kind: EntityKind, id: Uuid) -> bool {
        self.tables.read().await.contains(kind, id)
    }

    pub async fn row_count(&self) -> usize {
        self.tables.read().await.snapshot().row_count()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn load_client_subtree(
        &self,
        client_id: Uuid,
        include_soft_deleted: bool,
    ) -> StoreResult<Option<Client>> {
        debug!(
            "Loading client subtree {} (include_soft_deleted={})",
            client_id, include_soft_deleted
        );
        Ok(self
            .tables
            .read()
            .await
            .assemble_client(client_id, include_soft_deleted))
    }

    async fn load_branch_subtree(
        &self,
        branch_id: Uuid,
        include_soft_deleted: bool,
    ) -> StoreResult<Option<ClientBranch>> {
        debug!(
            "Loading branch subtree {} (include_soft_deleted={})",
            branch_id, include_soft_deleted
        );
        Ok(self
            .tables
            .read()
            .await
            .assemble_branch(branch_id, include_soft_deleted))
    }

    async fn load_deletion_mark(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> StoreResult<Option<DeletionMark>> {
        Ok(self
            .tables
            .read()
            .await
            .meta(kind, id)
            .map(|meta| meta.deletion))
    }

    async fn commit(&self, work: UnitOfWork) -> StoreResult<CommitReceipt> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        let applied = work.len();

        for change in work.changes() {
            if let Err(e) = staged.apply(change) {
                warn!("Commit rejected, rolling back {} change(s): {}", applied, e);
                return Err(e);
            }
        }

        *tables = staged;
        debug!("Committed {} change(s)", applied);
        Ok(CommitReceipt {
            applied,
            committed_at: Utc::now(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
