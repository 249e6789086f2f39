//! Archive pruning and history compaction
//!
//! Old archived templates are hard-deleted and active templates lose their
//! per-date entries older than the threshold. Work runs in bounded batches,
//! each in its own transaction, so an interrupted run can simply be repeated.

use chrono::Months;
use serde::Serialize;
use tracing::{info, instrument};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::models::{ClassId, DateKey};
use crate::permissions::{Principal, StudioAction};
use crate::storage::{ClassStore, Database, SettingsRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Entries dated before this key were removed
    pub threshold: DateKey,
    pub templates_deleted: usize,
    pub templates_compacted: usize,
    /// Roster and substitution entries stripped from active templates
    pub entries_removed: usize,
    pub batches: usize,
}

pub struct ArchivePruner<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    batch_size: usize,
    default_months: u32,
}

impl<'a> ArchivePruner<'a> {
    /// Pruner using batch size and retention from the stored studio settings
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Result<Self> {
        let settings = db.studio_settings()?;
        Ok(Self {
            db,
            clock,
            batch_size: settings.prune_batch_size.max(1),
            default_months: settings.prune_months_to_keep,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Prune with the configured retention
    pub fn prune_default(&self, actor: &Principal) -> Result<PruneReport> {
        self.prune(actor, self.default_months)
    }

    /// Drop history older than `months_to_keep` months before today
    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub fn prune(&self, actor: &Principal, months_to_keep: u32) -> Result<PruneReport> {
        actor.require(StudioAction::PruneArchive)?;
        let threshold = threshold(self.clock.today(), months_to_keep)?;

        let mut report = PruneReport {
            threshold,
            templates_deleted: 0,
            templates_compacted: 0,
            entries_removed: 0,
            batches: 0,
        };

        let expired = self.db.classes().archived_before(threshold)?;
        for batch in expired.chunks(self.batch_size) {
            self.db.transaction(|conn| {
                let classes = ClassStore::new(conn);
                batch.iter().try_for_each(|id| classes.delete(*id))
            })?;
            report.templates_deleted += batch.len();
            report.batches += 1;
        }

        let stale: Vec<ClassId> = self.db.classes().active_with_entries_before(threshold)?;
        for batch in stale.chunks(self.batch_size) {
            let removed = self.db.transaction(|conn| {
                let classes = ClassStore::new(conn);
                let mut removed = 0;
                for id in batch {
                    removed += classes.compact_before(*id, threshold)?;
                }
                Ok(removed)
            })?;
            report.templates_compacted += batch.len();
            report.entries_removed += removed;
            report.batches += 1;
        }

        info!(
            %threshold,
            deleted = report.templates_deleted,
            compacted = report.templates_compacted,
            entries = report.entries_removed,
            "Prune complete"
        );
        if report.batches > 0 {
            self.db.publish_classes()?;
        }
        Ok(report)
    }
}

/// `today` minus whole calendar months, clamped to the end of shorter months
fn threshold(today: DateKey, months_to_keep: u32) -> Result<DateKey> {
    today
        .date()
        .checked_sub_months(Months::new(months_to_keep))
        .map(DateKey::new)
        .ok_or_else(|| Error::Validation(format!("cannot keep {months_to_keep} months of history")))
}
