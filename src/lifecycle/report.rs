use std::collections::BTreeMap;

use chrono::Utc;

use super::models::{DeletionType, Report};
use crate::model::EntityKind;


/// Running tally for one cascade. Counts roll up per kind regardless of which
/// client or branch a node sits under.
#[derive(Debug, Clone, Default)]
pub struct ReportAccumulator {
    counts: BTreeMap<EntityKind, usize>,
    warnings: Vec<String>,
}

impl ReportAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: EntityKind, delta: usize) {
        if delta == 0 {
            return;
        }
        *self.counts.entry(kind).or_insert(0) += delta;
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Warns about a direct child collection of `owner`, only when it is non-empty.
    pub fn warn_children(&mut self, owner: &str, children: &str, count: usize) {
        if count > 0 {
            self.warn(format!("this {} has {} {}", owner, count, children));
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn finalize(self, deletion_type: DeletionType) -> Report {
        let total_affected = self.total();
        Report {
            success: true,
            error_message: None,
            deletion_type,
            counts: self.counts,
            warnings: self.warnings,
            total_affected,
            completed_at: Utc::now(),
        }
    }
}
