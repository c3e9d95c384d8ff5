use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use uuid::Uuid;


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    IntoStaticStr,
)]
pub enum EntityKind {
    Clients,
    ClientBranches,
    Organizations,
    OrganizationRecords,
    OrganizationLicenses,
    OrganizationWorkers,
    OrganizationCars,
    OrganizationCredentials,
    ExternalWorkers,
}

impl EntityKind {
    /// Singular, lower-case noun used in log lines and error messages.
    pub fn noun(self) -> &'static str {
        match self {
            Self::Clients => "client",
            Self::ClientBranches => "branch",
            Self::Organizations => "organization",
            Self::OrganizationRecords => "organization record",
            Self::OrganizationLicenses => "organization license",
            Self::OrganizationWorkers => "organization worker",
            Self::OrganizationCars => "organization car",
            Self::OrganizationCredentials => "organization credential",
            Self::ExternalWorkers => "external worker",
        }
    }
}


/// Owner of an organization or external worker. Exactly one parent, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Client(Uuid),
    Branch(Uuid),
}

impl Owner {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Client(id) | Self::Branch(id) => *id,
        }
    }

    pub fn is_client(&self, client_id: Uuid) -> bool {
        matches!(self, Self::Client(id) if *id == client_id)
    }

    pub fn is_branch(&self, branch_id: Uuid) -> bool {
        matches!(self, Self::Branch(id) if *id == branch_id)
    }
}


/// Soft-delete state. `is_deleted` is derived from the timestamp so the two can
/// never disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionMark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
}

impl DeletionMark {
    pub fn live() -> Self {
        Self { deleted_at: None }
    }

    pub fn deleted(at: DateTime<Utc>) -> Self {
        Self {
            deleted_at: Some(at),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn mark(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }

    pub fn clear(&mut self) {
        self.deleted_at = None;
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: Uuid,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub deletion: DeletionMark,
}

impl RecordMeta {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: 0,
            created_at: now,
            updated_at: now,
            deletion: DeletionMark::live(),
        }
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}


/// Common surface of every node the cascade engine can visit.
pub trait LifecycleNode {
    fn kind(&self) -> EntityKind;
    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> Uuid {
        self.meta().id
    }

    fn is_deleted(&self) -> bool {
        self.meta().deletion.is_deleted()
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.meta().deletion.deleted_at()
    }
}

macro_rules! impl_lifecycle_node {
    ($ty:ty, $kind:expr) => {
        impl $crate::model::LifecycleNode for $ty {
            fn kind(&self) -> $crate::model::EntityKind {
                $kind
            }

            fn meta(&self) -> &$crate::model::RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::model::RecordMeta {
                &mut self.meta
            }
        }
    };
}

pub(crate) use impl_lifecycle_node;
