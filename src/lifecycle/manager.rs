use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::models::{CascadeRoot, LifecycleAction, LifecycleError, LifecycleRequest, Report};
use super::operations::operation_for;
use super::traversal::{CascadeContext, traverse};
use crate::model::{ClientBranch, EntityKind, LifecycleNode, Subtree};
use crate::store::LedgerStore;


/// Entry points for cascading lifecycle operations over a client or branch subtree.
///
/// Every public method returns a [`Report`]; failures come back as a report with
/// `success = false`. The `try_*` form exposes the typed error instead.
pub struct LifecycleManager {
    store: Arc<dyn LedgerStore>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        info!("Initializing LifecycleManager (store={})", store.backend_name());
        Self { store }
    }


    pub async fn validate(&self, client_id: Uuid) -> Report {
        self.run(LifecycleAction::Validate, CascadeRoot::Client(client_id))
            .await
    }

    pub async fn validate_branch(&self, branch_id: Uuid) -> Report {
        self.run(LifecycleAction::Validate, CascadeRoot::Branch(branch_id))
            .await
    }

    pub async fn soft_delete(&self, client_id: Uuid) -> Report {
        self.run(LifecycleAction::SoftDelete, CascadeRoot::Client(client_id))
            .await
    }

    pub async fn restore(&self, client_id: Uuid) -> Report {
        self.run(LifecycleAction::Restore, CascadeRoot::Client(client_id))
            .await
    }

    pub async fn hard_delete(&self, client_id: Uuid) -> Report {
        self.run(LifecycleAction::HardDelete, CascadeRoot::Client(client_id))
            .await
    }

    pub async fn soft_delete_branch(&self, branch_id: Uuid) -> Report {
        self.run(LifecycleAction::SoftDelete, CascadeRoot::Branch(branch_id))
            .await
    }

    pub async fn restore_branch(&self, branch_id: Uuid) -> Report {
        self.run(LifecycleAction::Restore, CascadeRoot::Branch(branch_id))
            .await
    }

    pub async fn hard_delete_branch(&self, branch_id: Uuid) -> Report {
        self.run(LifecycleAction::HardDelete, CascadeRoot::Branch(branch_id))
            .await
    }

    async fn run(&self, action: LifecycleAction, target: CascadeRoot) -> Report {
        self.execute(LifecycleRequest::new(action, target)).await
    }


    pub async fn execute(&self, request: LifecycleRequest) -> Report {
        let deletion_type = request.action.deletion_type();
        match self.try_execute(request).await {
            Ok(report) => report,
            Err(e) => {
                match &e {
                    LifecycleError::NotFound { .. } | LifecycleError::InvalidState(_) => {
                        warn!("{} on {:?} refused: {}", request.action, request.target, e)
                    }
                    LifecycleError::PersistenceFailure(_) | LifecycleError::InternalError(_) => {
                        error!("{} on {:?} failed: {}", request.action, request.target, e)
                    }
                }
                Report::failure(deletion_type, &e)
            }
        }
    }

    pub async fn try_execute(&self, request: LifecycleRequest) -> Result<Report, LifecycleError> {
        let LifecycleRequest { action, target } = request;
        debug!("Starting {} on {:?}", action, target);

        // Soft-deleted rows are loaded for every action, Validate included.
        let mut subtree = self.load(target).await?;

        if action == LifecycleAction::Restore {
            if let Subtree::Branch(branch) = &subtree {
                self.ensure_parent_live(branch).await?;
            }
        }

        if action == LifecycleAction::HardDelete {
            warn!(
                "HARD DELETE requested for {} {} ({} node(s)) - THIS IS IRREVERSIBLE!",
                target.kind().noun(),
                target.id(),
                subtree.subtree_size()
            );
        }

        let cx = run_cascade(action, &mut subtree, Utc::now())?;
        let CascadeContext { report, work, .. } = cx;

        if action.commits() {
            let pending = work.len();
            let receipt = self.store.commit(work).await.map_err(|e| {
                LifecycleError::PersistenceFailure(e.to_string())
            })?;
            debug!(
                "Committed {} of {} change(s) at {}",
                receipt.applied, pending, receipt.committed_at
            );
        }

        let report = report.finalize(action.deletion_type());
        info!(
            "{} on {} {} affected {} node(s)",
            report.deletion_type,
            target.kind().noun(),
            target.id(),
            report.total_affected
        );
        Ok(report)
    }

    async fn load(&self, target: CascadeRoot) -> Result<Subtree, LifecycleError> {
        let loaded = match target {
            CascadeRoot::Client(id) => self
                .store
                .load_client_subtree(id, true)
                .await
                .map(|c| c.map(Subtree::Client)),
            CascadeRoot::Branch(id) => self
                .store
                .load_branch_subtree(id, true)
                .await
                .map(|b| b.map(Subtree::Branch)),
        }
        .map_err(|e| LifecycleError::InternalError(format!("failed to load subtree: {}", e)))?;

        let subtree = loaded.ok_or_else(|| LifecycleError::not_found(target))?;
        if subtree.root().id() != target.id() {
            return Err(LifecycleError::InternalError(format!(
                "store returned {} for requested {}",
                subtree.root().id(),
                target.id()
            )));
        }
        Ok(subtree)
    }

    /// A branch cannot come back while the client above it is still deleted.
    async fn ensure_parent_live(&self, branch: &ClientBranch) -> Result<(), LifecycleError> {
        let parent_id = branch.parent_client_id;
        let mark = self
            .store
            .load_deletion_mark(EntityKind::Clients, parent_id)
            .await
            .map_err(|e| {
                LifecycleError::InternalError(format!("failed to load client {}: {}", parent_id, e))
            })?
            .ok_or_else(|| {
                LifecycleError::InternalError(format!(
                    "branch {} references missing client {}",
                    branch.meta.id, parent_id
                ))
            })?;

        if mark.is_deleted() {
            return Err(LifecycleError::InvalidState(format!(
                "branch {} cannot be restored while client {} is deleted",
                branch.meta.id, parent_id
            )));
        }
        Ok(())
    }
}


/// Runs the in-memory part of a cascade. Nothing reaches storage from here.
fn run_cascade(
    action: LifecycleAction,
    subtree: &mut Subtree,
    now: DateTime<Utc>,
) -> Result<CascadeContext, LifecycleError> {
    let mut operation = operation_for(action);
    let mut cx = CascadeContext::new(now);
    traverse(subtree, operation.as_mut(), &mut cx)?;

    let total = cx.report.total();
    let expected = subtree.subtree_size();
    if total != expected {
        return Err(LifecycleError::InternalError(format!(
            "{} visited {} node(s) but the subtree holds {}",
            operation.deletion_type(),
            total,
            expected
        )));
    }
    Ok(cx)
}
