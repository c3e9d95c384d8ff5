use chrono::{DateTime, Utc};
use tracing::debug;

use super::models::{DeletionType, LifecycleAction, LifecycleError};
use super::traversal::{CascadeContext, CascadeOperation, Timing};
use crate::model::LifecycleNode;
use crate::store::PendingChange;


/// Dry run: counts what a delete would touch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Validate;

impl CascadeOperation for Validate {
    fn deletion_type(&self) -> DeletionType {
        DeletionType::Validation
    }

    fn on_node(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        cx.report.record(node.kind(), 1);
        Ok(())
    }
}


/// Stamps the subtree with the cascade timestamp.
///
/// A descendant deleted on its own (a branch removed earlier, say) keeps its
/// stamp so a later restore of the root leaves it deleted. Nodes that share the
/// root's previous stamp belong to the same earlier cascade and are re-stamped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftDelete {
    previous_stamp: Option<DateTime<Utc>>,
}

impl SoftDelete {
    fn stamp(&self, node: &mut dyn LifecycleNode, cx: &mut CascadeContext) {
        let kind = node.kind();
        let meta = node.meta_mut();
        cx.work.push(PendingChange::SetDeletion {
            kind,
            id: meta.id,
            expected_version: meta.version,
            deleted_at: Some(cx.now),
            updated_at: cx.now,
        });
        meta.deletion.mark(cx.now);
        meta.updated_at = cx.now;
        meta.version += 1;
        cx.report.record(kind, 1);
    }
}

impl CascadeOperation for SoftDelete {
    fn deletion_type(&self) -> DeletionType {
        DeletionType::SoftDelete
    }

    fn on_root(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        self.previous_stamp = node.deleted_at();
        self.stamp(node, cx);
        Ok(())
    }

    fn on_node(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        if node.is_deleted() && node.deleted_at() != self.previous_stamp {
            debug!("Keeping earlier deletion of {} {}", node.kind().noun(), node.id());
            cx.report.record(node.kind(), 1);
            return Ok(());
        }
        self.stamp(node, cx);
        Ok(())
    }
}


/// Clears the deletion marks the root's cascade left. The root must be deleted.
///
/// Only nodes stamped at the same instant as the root are revived; anything
/// deleted separately stays deleted.
#[derive(Debug, Default, Clone, Copy)]
pub struct Restore {
    cascade_stamp: Option<DateTime<Utc>>,
}

impl Restore {
    fn clear(&self, node: &mut dyn LifecycleNode, cx: &mut CascadeContext) {
        let kind = node.kind();
        let meta = node.meta_mut();
        cx.work.push(PendingChange::SetDeletion {
            kind,
            id: meta.id,
            expected_version: meta.version,
            deleted_at: None,
            updated_at: cx.now,
        });
        meta.deletion.clear();
        meta.updated_at = cx.now;
        meta.version += 1;
        cx.report.record(kind, 1);
    }
}

impl CascadeOperation for Restore {
    fn deletion_type(&self) -> DeletionType {
        DeletionType::Restore
    }

    fn on_root(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        if !node.is_deleted() {
            return Err(LifecycleError::InvalidState(format!(
                "{} {} is not deleted",
                node.kind().noun(),
                node.id()
            )));
        }
        self.cascade_stamp = node.deleted_at();
        self.clear(node, cx);
        Ok(())
    }

    fn on_node(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        if node.is_deleted() && node.deleted_at() == self.cascade_stamp {
            self.clear(node, cx);
        } else {
            cx.report.record(node.kind(), 1);
        }
        Ok(())
    }
}


/// Queues physical removal, children strictly before their parent.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardDelete;

impl CascadeOperation for HardDelete {
    fn deletion_type(&self) -> DeletionType {
        DeletionType::HardDelete
    }

    fn timing(&self) -> Timing {
        Timing::PostOrder
    }

    fn on_node(
        &mut self,
        node: &mut dyn LifecycleNode,
        cx: &mut CascadeContext,
    ) -> Result<(), LifecycleError> {
        let kind = node.kind();
        cx.work.push(PendingChange::Remove {
            kind,
            id: node.id(),
            expected_version: node.meta().version,
        });
        cx.report.record(kind, 1);
        Ok(())
    }
}


pub fn operation_for(action: LifecycleAction) -> Box<dyn CascadeOperation + Send> {
    match action {
        LifecycleAction::Validate => Box::new(Validate),
        LifecycleAction::SoftDelete => Box::new(SoftDelete::default()),
        LifecycleAction::Restore => Box::new(Restore::default()),
        LifecycleAction::HardDelete => Box::new(HardDelete),
    }
}
