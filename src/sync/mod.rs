pub mod chunk;
pub mod fetcher;
pub mod rate_limit;
pub mod syncer;

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{DataKind, Variant};
use chunk::DateRange;

/// Options controlling a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Earliest date to consider. Older local data is ignored.
    pub begin: NaiveDate,
    /// Last date to consider, normally today.
    pub end: NaiveDate,
    pub variants: Vec<Variant>,
    pub puzzles: bool,
    /// Any of [`DataKind::Stats`] and [`DataKind::FullStats`].
    pub stat_kinds: Vec<DataKind>,
}

impl SyncOptions {
    /// Every store kind this run touches.
    pub fn kinds(&self) -> Vec<DataKind> {
        let mut kinds: Vec<DataKind> = self.stat_kinds.iter().copied().filter(|k| k.is_stat()).collect();
        if self.puzzles {
            kinds.push(DataKind::Puzzle);
        }
        kinds
    }
}

/// Report returned after one sync stage completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub stage: String,
    pub status: SyncStatus,
    pub items_synced: u64,
    pub items_failed: u64,
    pub batches_completed: u32,
    pub batches_total: u32,
    pub error: Option<String>,
}

impl SyncReport {
    /// Create a SyncReport with the appropriate status derived from counts.
    pub fn from_counts(
        stage: String,
        items_synced: u64,
        items_failed: u64,
        batches_completed: u32,
        batches_total: u32,
    ) -> Self {
        let batches_failed = batches_total.saturating_sub(batches_completed);
        let status = if items_failed == 0 && batches_failed == 0 {
            SyncStatus::Success
        } else if items_synced > 0 || batches_completed > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        };
        let error = match (items_failed, batches_failed) {
            (0, 0) => None,
            (items, 0) => Some(format!("{items} items failed")),
            (0, batches) => Some(format!("{batches} metadata windows failed")),
            (items, batches) => Some(format!(
                "{items} items and {batches} metadata windows failed"
            )),
        };
        Self {
            stage,
            status,
            items_synced,
            items_failed,
            batches_completed,
            batches_total,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
}

/// Hooks for reporting sync progress. All methods default to no-ops.
pub trait SyncProgress: Send + Sync {
    fn on_stage_start(&self, _stage: &str, _items: usize) {}
    fn on_chunk(&self, _stage: &str, _range: &DateRange, _index: usize, _total: usize) {}
    fn on_fetch_progress(&self, _stage: &str, _done: usize, _total: usize) {}
    fn on_stage_complete(&self, _report: &SyncReport) {}
}

/// Progress reporter that ignores every event.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_status_from_counts() {
        let ok = SyncReport::from_counts("s".into(), 5, 0, 2, 2);
        assert_eq!(ok.status, SyncStatus::Success);
        assert!(ok.error.is_none());

        let partial = SyncReport::from_counts("s".into(), 5, 1, 1, 1);
        assert_eq!(partial.status, SyncStatus::PartialFailure);
        assert_eq!(partial.error.as_deref(), Some("1 items failed"));

        let skipped_window = SyncReport::from_counts("s".into(), 3, 0, 1, 2);
        assert_eq!(skipped_window.status, SyncStatus::PartialFailure);

        let failed = SyncReport::from_counts("s".into(), 0, 4, 0, 0);
        assert_eq!(failed.status, SyncStatus::Failed);
    }

    #[test]
    fn test_kinds() {
        let options = SyncOptions {
            begin: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            variants: vec![Variant::Daily],
            puzzles: true,
            stat_kinds: vec![DataKind::Stats, DataKind::Puzzle],
        };
        assert_eq!(options.kinds(), vec![DataKind::Stats, DataKind::Puzzle]);
    }
}
