

pub mod entities;
pub mod meta;
pub mod records;


pub use entities::{Client, ClientBranch, ExternalWorker, Organization, Subtree};
pub use meta::{DeletionMark, EntityKind, LifecycleNode, Owner, RecordMeta};
pub use records::{
    OrganizationCar, OrganizationCredential, OrganizationLicense, OrganizationRecord,
    OrganizationWorker,
};
