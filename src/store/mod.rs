use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    Client, ClientBranch, DeletionMark, EntityKind, ExternalWorker, Organization, OrganizationCar,
    OrganizationCredential, OrganizationLicense, OrganizationRecord, OrganizationWorker,
};

pub mod memory;

pub use memory::InMemoryLedgerStore;


#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;


/// One row-level instruction for the commit step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PendingChange {
    /// Overwrite the deletion mark of a row. `deleted_at = None` restores it.
    SetDeletion {
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
        deleted_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    },
    Remove {
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
    },
}

impl PendingChange {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::SetDeletion { kind, .. } | Self::Remove { kind, .. } => *kind,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::SetDeletion { id, .. } | Self::Remove { id, .. } => *id,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}


/// Ordered set of changes produced by one cascade. Committed all at once or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWork {
    changes: Vec<PendingChange>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub applied: usize,
    pub committed_at: DateTime<Utc>,
}


/// Flat export of every row in a store, in insertion order. Nested collections on the
/// entities are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSnapshot {
    pub clients: Vec<Client>,
    pub branches: Vec<ClientBranch>,
    pub organizations: Vec<Organization>,
    pub external_workers: Vec<ExternalWorker>,
    pub records: Vec<OrganizationRecord>,
    pub licenses: Vec<OrganizationLicense>,
    pub workers: Vec<OrganizationWorker>,
    pub cars: Vec<OrganizationCar>,
    pub credentials: Vec<OrganizationCredential>,
}

impl LedgerSnapshot {
    pub fn row_count(&self) -> usize {
        self.clients.len()
            + self.branches.len()
            + self.organizations.len()
            + self.external_workers.len()
            + self.records.len()
            + self.licenses.len()
            + self.workers.len()
            + self.cars.len()
            + self.credentials.len()
    }
}


/// Persistence boundary for the cascade engine.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Loads a client with its organizations (and their five leaf collections),
    /// external workers and branches (with their own organizations and workers).
    async fn load_client_subtree(
        &self,
        client_id: Uuid,
        include_soft_deleted: bool,
    ) -> StoreResult<Option<Client>>;

    async fn load_branch_subtree(
        &self,
        branch_id: Uuid,
        include_soft_deleted: bool,
    ) -> StoreResult<Option<ClientBranch>>;

    /// Deletion state of a single row, without loading anything beneath it.
    async fn load_deletion_mark(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> StoreResult<Option<DeletionMark>>;

    /// Applies every change in order as a single transaction.
    async fn commit(&self, work: UnitOfWork) -> StoreResult<CommitReceipt>;

    fn backend_name(&self) -> &'static str;
}
