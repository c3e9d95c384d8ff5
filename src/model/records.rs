use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::meta::{EntityKind, RecordMeta, impl_lifecycle_node};


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub organization_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl OrganizationRecord {
    pub fn new(organization_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            organization_id,
            title: title.into(),
            body: String::new(),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationLicense {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub organization_id: Uuid,
    pub license_number: String,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
}

impl OrganizationLicense {
    pub fn new(organization_id: Uuid, license_number: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            organization_id,
            license_number: license_number.into(),
            expires_on: None,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationWorker {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub organization_id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub position: Option<String>,
}

impl OrganizationWorker {
    pub fn new(organization_id: Uuid, full_name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            organization_id,
            full_name: full_name.into(),
            position: None,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationCar {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub organization_id: Uuid,
    pub plate_number: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl OrganizationCar {
    pub fn new(organization_id: Uuid, plate_number: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            organization_id,
            plate_number: plate_number.into(),
            model: None,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationCredential {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub organization_id: Uuid,
    pub service: String,
    pub username: String,
}

impl OrganizationCredential {
    pub fn new(
        organization_id: Uuid,
        service: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            meta: RecordMeta::new(),
            organization_id,
            service: service.into(),
            username: username.into(),
        }
    }
}

impl_lifecycle_node!(OrganizationRecord, EntityKind::OrganizationRecords);
impl_lifecycle_node!(OrganizationLicense, EntityKind::OrganizationLicenses);
impl_lifecycle_node!(OrganizationWorker, EntityKind::OrganizationWorkers);
impl_lifecycle_node!(OrganizationCar, EntityKind::OrganizationCars);
impl_lifecycle_node!(OrganizationCredential, EntityKind::OrganizationCredentials);
