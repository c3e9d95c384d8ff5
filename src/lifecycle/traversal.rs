//! The single cascade walk shared by every lifecycle operation.
//!
//! Order is fixed: the node itself, its organizations (each followed by records,
//! licenses, workers, cars, credentials), its external workers, and for a client its
//! branches. Post-order operations see a node only after all of its descendants.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{DeletionType, LifecycleError};
use super::report::ReportAccumulator;
use crate::model::{
    Client, ClientBranch, EntityKind, ExternalWorker, LifecycleNode, Organization, Owner, Subtree,
};
use crate::store::UnitOfWork;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Parent before children.
    PreOrder,
    /// Children before parent.
    PostOrder,
}


/// State threaded through one walk: the shared timestamp, the tally and the
/// changes waiting for commit.
#[derive(Debug)]
pub struct CascadeContext {
    pub now: DateTime<Utc>,
    pub report: ReportAccumulator,
    pub work: UnitOfWork,
}

impl CascadeContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            report: ReportAccumulator::new(),
            work: UnitOfWork::new(),
        }
    }
}


pub trait CascadeOperation {
    fn deletion_type(&self) -> DeletionType;

    fn timing(&self) -> Timing {
        Timing::PreOrder
    }

    fn on_node(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError>;

    fn on_root(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        self.on_node(node, cx)
    }

    fn on_branch(
        &mut self,
        node: &mut ClientBranch,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        self.on_node(node, cx)
    }

    fn on_organization(
        &mut self,
        node: &mut Organization,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        self.on_node(node, cx)
    }

    fn on_leaf(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        self.on_node(node, cx)
    }

    fn on_worker(
        &mut self,
        node: &mut ExternalWorker,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        self.on_node(node, cx)
    }
}


pub fn traverse<O>(
    root: &mut Subtree,
    op: &mut O,
    cx: &mut CascadeContext,
) -> Result<(), LifecycleError>
where
    O: CascadeOperation + ?Sized,
{
    match root {
        Subtree::Client(client) => walk_client(client, op, cx),
        Subtree::Branch(branch) => walk_branch(branch, true, op, cx),
    }
}

fn walk_client<O>(client: &mut Client, op: &mut O, cx: &mut CascadeContext) -> Result<(), LifecycleError>
where
    O: CascadeOperation + ?Sized,
{
    let client_id = client.meta.id;
    if op.timing() == Timing::PreOrder {
        op.on_root(client, cx)?;
    }

    cx.report
        .warn_children("client", "organization(s)", client.organizations.len());
    cx.report
        .warn_children("client", "external worker(s)", client.external_workers.len());
    cx.report.warn_children("client", "branch(es)", client.branches.len());

    let owner = Owner::Client(client_id);
    walk_holdings(owner, &mut client.organizations, &mut client.external_workers, op, cx)?;

    for branch in &mut client.branches {
        if branch.parent_client_id != client_id {
            return Err(foreign_child(EntityKind::ClientBranches, branch.meta.id, client_id));
        }
        walk_branch(branch, false, op, cx)?;
    }

    if op.timing() == Timing::PostOrder {
        op.on_root(client, cx)?;
    }
    Ok(())
}

fn walk_branch<O>(
    branch: &mut ClientBranch,
    is_root: bool,
    op: &mut O,
    cx: &mut CascadeContext,
) -> Result<(), LifecycleError>
where
    O: CascadeOperation + ?Sized,
{
    if op.timing() == Timing::PreOrder {
        visit_branch(branch, is_root, op, cx)?;
    }

    cx.report
        .warn_children("branch", "organization(s)", branch.organizations.len());
    cx.report
        .warn_children("branch", "external worker(s)", branch.external_workers.len());

    let owner = Owner::Branch(branch.meta.id);
    walk_holdings(owner, &mut branch.organizations, &mut branch.external_workers, op, cx)?;

    if op.timing() == Timing::PostOrder {
        visit_branch(branch, is_root, op, cx)?;
    }
    Ok(())
}

fn visit_branch<O>(
    branch: &mut ClientBranch,
    is_root: bool,
    op: &mut O,
    cx: &mut CascadeContext,
) -> Result<(), LifecycleError>
where
    O: CascadeOperation + ?Sized,
{
    if is_root {
        op.on_root(branch, cx)
    } else {
        op.on_branch(branch, cx)
    }
}

/// Organizations and external workers, the two collections clients and branches share.
fn walk_holdings<O>(
    owner: Owner,
    organizations: &mut [Organization],
    workers: &mut [ExternalWorker],
    op: &mut O,
    cx: &mut CascadeContext,
) -> Result<(), LifecycleError>
where
    O: CascadeOperation + ?Sized,
{
    for organization in organizations.iter_mut() {
        if organization.owner != owner {
            return Err(foreign_child(EntityKind::Organizations, organization.meta.id, owner.id()));
        }
        walk_organization(organization, op, cx)?;
    }

    for worker in workers.iter_mut() {
        if worker.owner != owner {
            return Err(foreign_child(EntityKind::ExternalWorkers, worker.meta.id, owner.id()));
        }
        op.on_worker(worker, cx)?;
    }
    Ok(())
}

fn walk_organization<O>(
    organization: &mut Organization,
    op: &mut O,
    cx: &mut CascadeContext,
) -> Result<(), LifecycleError>
where
    O: CascadeOperation + ?Sized,
{
    if op.timing() == Timing::PreOrder {
        op.on_organization(organization, cx)?;
    }

    let organization_id = organization.meta.id;
    visit_leaves(organization_id, &mut organization.records, |r| r.organization_id, op, cx)?;
    visit_leaves(organization_id, &mut organization.licenses, |r| r.organization_id, op, cx)?;
    visit_leaves(organization_id, &mut organization.workers, |r| r.organization_id, op, cx)?;
    visit_leaves(organization_id, &mut organization.cars, |r| r.organization_id, op, cx)?;
    visit_leaves(organization_id, &mut organization.credentials, |r| r.organization_id, op, cx)?;

    if op.timing() == Timing::PostOrder {
        op.on_organization(organization, cx)?;
    }
    Ok(())
}

fn visit_leaves<T, O>(
    organization_id: Uuid,
    leaves: &mut [T],
    parent_of: fn(&T) -> Uuid,
    op: &mut O,
    cx: &mut CascadeContext,
) -> Result<(), LifecycleError>
where
    T: LifecycleNode,
    O: CascadeOperation + ?Sized,
{
    for leaf in leaves.iter_mut() {
        if parent_of(leaf) != organization_id {
            return Err(foreign_child(leaf.kind(), leaf.id(), organization_id));
        }
        op.on_leaf(leaf, cx)?;
    }
    Ok(())
}

fn foreign_child(kind: EntityKind, id: Uuid, parent_id: Uuid) -> LifecycleError {
    LifecycleError::InternalError(format!(
        "{} {} loaded under {} but is owned elsewhere",
        kind.noun(),
        id,
        parent_id
    ))
}
