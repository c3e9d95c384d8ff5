use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

use crate::model::EntityKind;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum DeletionType {
    #[serde(rename = "Validation")]
    #[strum(serialize = "Validation")]
    Validation,
    #[serde(rename = "Soft Delete")]
    #[strum(serialize = "Soft Delete")]
    SoftDelete,
    #[serde(rename = "Hard Delete (Permanent)")]
    #[strum(serialize = "Hard Delete (Permanent)")]
    HardDelete,
    #[serde(rename = "Restore")]
    #[strum(serialize = "Restore")]
    Restore,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LifecycleAction {
    Validate,
    SoftDelete,
    Restore,
    HardDelete,
}

impl LifecycleAction {
    pub fn deletion_type(self) -> DeletionType {
        match self {
            Self::Validate => DeletionType::Validation,
            Self::SoftDelete => DeletionType::SoftDelete,
            Self::Restore => DeletionType::Restore,
            Self::HardDelete => DeletionType::HardDelete,
        }
    }

    /// Validate is a dry run; everything else ends in a commit.
    pub fn commits(self) -> bool {
        !matches!(self, Self::Validate)
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CascadeRoot {
    Client(Uuid),
    Branch(Uuid),
}

impl CascadeRoot {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Client(id) | Self::Branch(id) => *id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Client(_) => EntityKind::Clients,
            Self::Branch(_) => EntityKind::ClientBranches,
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRequest {
    pub action: LifecycleAction,
    pub target: CascadeRoot,
}

impl LifecycleRequest {
    pub fn new(action: LifecycleAction, target: CascadeRoot) -> Self {
        Self { action, target }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub success: bool,
    pub error_message: Option<String>,
    pub deletion_type: DeletionType,
    pub counts: BTreeMap<EntityKind, usize>,
    pub warnings: Vec<String>,
    pub total_affected: usize,
    pub completed_at: DateTime<Utc>,
}

impl Report {
    pub fn failure(deletion_type: DeletionType, error: &LifecycleError) -> Self {
        Self {
            success: false,
            error_message: Some(error.to_string()),
            deletion_type,
            counts: BTreeMap::new(),
            warnings: Vec::new(),
            total_affected: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}


#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{} {} not found", .kind.noun(), .id)]
    NotFound { kind: EntityKind, id: Uuid },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LifecycleError {
    pub fn not_found(root: CascadeRoot) -> Self {
        Self::NotFound {
            kind: root.kind(),
            id: root.id(),
        }
    }
}
