use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::meta::{EntityKind, LifecycleNode, Owner, RecordMeta, impl_lifecycle_node};
use super::records::{
    OrganizationCar, OrganizationCredential, OrganizationLicense, OrganizationRecord,
    OrganizationWorker,
};


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<Organization>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_workers: Vec<ExternalWorker>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<ClientBranch>,
}

impl Client {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            name: name.into(),
            tax_id: None,
            organizations: Vec::new(),
            external_workers: Vec::new(),
            branches: Vec::new(),
        }
    }

    /// Adds an organization owned directly by this client and returns it for filling.
    pub fn add_organization(&mut self, name: impl Into<String>) -> &mut Organization {
        let organization = Organization::new(Owner::Client(self.meta.id), name);
        self.organizations.push(organization);
        let last = self.organizations.len() - 1;
        &mut self.organizations[last]
    }

    pub fn add_external_worker(&mut self, full_name: impl Into<String>) -> &mut ExternalWorker {
        let worker = ExternalWorker::new(Owner::Client(self.meta.id), full_name);
        self.external_workers.push(worker);
        let last = self.external_workers.len() - 1;
        &mut self.external_workers[last]
    }

    pub fn add_branch(&mut self, name: impl Into<String>) -> &mut ClientBranch {
        let branch = ClientBranch::new(self.meta.id, name);
        self.branches.push(branch);
        let last = self.branches.len() - 1;
        &mut self.branches[last]
    }

    /// Calls `f` for this client and every node it transitively owns.
    pub fn for_each_node(&self, f: &mut dyn FnMut(&dyn LifecycleNode)) {
        f(self);
        for organization in &self.organizations {
            organization.for_each_node(f);
        }
        for worker in &self.external_workers {
            f(worker);
        }
        for branch in &self.branches {
            branch.for_each_node(f);
        }
    }

    pub fn subtree_size(&self) -> usize {
        let mut count = 0;
        self.for_each_node(&mut |_| count += 1);
        count
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientBranch {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub parent_client_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<Organization>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_workers: Vec<ExternalWorker>,
}

impl ClientBranch {
    pub fn new(parent_client_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            parent_client_id,
            name: name.into(),
            address: None,
            organizations: Vec::new(),
            external_workers: Vec::new(),
        }
    }

    pub fn add_organization(&mut self, name: impl Into<String>) -> &mut Organization {
        let organization = Organization::new(Owner::Branch(self.meta.id), name);
        self.organizations.push(organization);
        let last = self.organizations.len() - 1;
        &mut self.organizations[last]
    }

    pub fn add_external_worker(&mut self, full_name: impl Into<String>) -> &mut ExternalWorker {
        let worker = ExternalWorker::new(Owner::Branch(self.meta.id), full_name);
        self.external_workers.push(worker);
        let last = self.external_workers.len() - 1;
        &mut self.external_workers[last]
    }

    pub fn for_each_node(&self, f: &mut dyn FnMut(&dyn LifecycleNode)) {
        f(self);
        for organization in &self.organizations {
            organization.for_each_node(f);
        }
        for worker in &self.external_workers {
            f(worker);
        }
    }

    pub fn subtree_size(&self) -> usize {
        let mut count = 0;
        self.for_each_node(&mut |_| count += 1);
        count
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub owner: Owner,
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<OrganizationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<OrganizationLicense>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<OrganizationWorker>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cars: Vec<OrganizationCar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<OrganizationCredential>,
}

impl Organization {
    pub fn new(owner: Owner, name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            owner,
            name: name.into(),
            records: Vec::new(),
            licenses: Vec::new(),
            workers: Vec::new(),
            cars: Vec::new(),
            credentials: Vec::new(),
        }
    }

    pub fn add_record(&mut self, title: impl Into<String>) -> &mut Self {
        self.records.push(OrganizationRecord::new(self.meta.id, title));
        self
    }

    pub fn add_license(&mut self, license_number: impl Into<String>) -> &mut Self {
        self.licenses
            .push(OrganizationLicense::new(self.meta.id, license_number));
        self
    }

    pub fn add_worker(&mut self, full_name: impl Into<String>) -> &mut Self {
        self.workers.push(OrganizationWorker::new(self.meta.id, full_name));
        self
    }

    pub fn add_car(&mut self, plate_number: impl Into<String>) -> &mut Self {
        self.cars.push(OrganizationCar::new(self.meta.id, plate_number));
        self
    }

    pub fn add_credential(
        &mut self,
        service: impl Into<String>,
        username: impl Into<String>,
    ) -> &mut Self {
        self.credentials
            .push(OrganizationCredential::new(self.meta.id, service, username));
        self
    }

    pub fn for_each_node(&self, f: &mut dyn FnMut(&dyn LifecycleNode)) {
        f(self);
        self.records.iter().for_each(|n| f(n));
        self.licenses.iter().for_each(|n| f(n));
        self.workers.iter().for_each(|n| f(n));
        self.cars.iter().for_each(|n| f(n));
        self.credentials.iter().for_each(|n| f(n));
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalWorker {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub owner: Owner,
    pub full_name: String,
    #[serde(default)]
    pub company: Option<String>,
}

impl ExternalWorker {
    pub fn new(owner: Owner, full_name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            owner,
            full_name: full_name.into(),
            company: None,
        }
    }
}

impl_lifecycle_node!(Client, EntityKind::Clients);
impl_lifecycle_node!(ClientBranch, EntityKind::ClientBranches);
impl_lifecycle_node!(Organization, EntityKind::Organizations);
impl_lifecycle_node!(ExternalWorker, EntityKind::ExternalWorkers);


/// A loaded cascade root. Only clients and branches can anchor a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subtree {
    Client(Client),
    Branch(ClientBranch),
}

impl Subtree {
    pub fn root(&self) -> &dyn LifecycleNode {
        match self {
            Self::Client(client) => client,
            Self::Branch(branch) => branch,
        }
    }

    pub fn for_each_node(&self, f: &mut dyn FnMut(&dyn LifecycleNode)) {
        match self {
            Self::Client(client) => client.for_each_node(f),
            Self::Branch(branch) => branch.for_each_node(f),
        }
    }

    pub fn subtree_size(&self) -> usize {
        match self {
            Self::Client(client) => client.subtree_size(),
            Self::Branch(branch) => branch.subtree_size(),
        }
    }
}
