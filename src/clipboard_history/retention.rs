//! Time-based retention
//!
//! Periodically deletes unpinned items older than the configured age. The
//! sweeper owns only its timer; the purge itself runs on the engine thread
//! against the store it is handed.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::asset_worker::AssetCleaner;
use super::database::{HistoryStore, ItemQuery, SaveOutcome};
use crate::config::DEFAULT_RETENTION_DAYS;
use crate::error::StoreError;
use crate::scheduler::{RepeatingTask, Scheduler, TimerHandle};

/// How often the sweep runs while the engine is up.
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// WAL checkpoint every Nth successful purge.
const CHECKPOINT_EVERY: u32 = 10;

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Forever,
    MaxAge(Duration),
}

impl RetentionPolicy {
    /// `0` days keeps history forever.
    pub fn from_days(days: u32) -> Self {
        if days == 0 {
            Self::Forever
        } else {
            Self::MaxAge(Duration::from_millis(days as u64 * MS_PER_DAY))
        }
    }

    /// Items captured strictly before this instant are purged.
    pub fn cutoff(&self, now_ms: i64) -> Option<i64> {
        match self {
            Self::Forever => None,
            Self::MaxAge(age) if age.is_zero() => None,
            Self::MaxAge(age) => Some(now_ms - age.as_millis() as i64),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_RETENTION_DAYS)
    }
}

pub struct RetentionSweeper {
    policy: RetentionPolicy,
    scheduler: Arc<dyn Scheduler>,
    timer: Option<TimerHandle>,
    cycles: u32,
}

impl RetentionSweeper {
    pub fn new(policy: RetentionPolicy, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            policy,
            scheduler,
            timer: None,
            cycles: 0,
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Arm the periodic tick. `on_tick` should post a sweep request to the
    /// store owner; the immediate first sweep is the caller's job.
    pub fn start(&mut self, interval: Duration, on_tick: RepeatingTask) {
        self.stop();
        if self.policy == RetentionPolicy::Forever {
            info!("Retention disabled, keeping history forever");
            return;
        }
        self.timer = Some(self.scheduler.every(interval, interval / 10, on_tick));
        info!(interval_secs = interval.as_secs(), "Retention sweeper started");
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
            debug!("Retention sweeper stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Purge according to the configured policy.
    pub fn sweep(
        &mut self,
        store: &mut HistoryStore,
        cleaner: &dyn AssetCleaner,
        now_ms: i64,
    ) -> Result<usize, StoreError> {
        match self.policy {
            RetentionPolicy::Forever => Ok(0),
            RetentionPolicy::MaxAge(age) => self.purge_older_than(age, store, cleaner, now_ms),
        }
    }

    /// Delete unpinned items captured more than `cutoff_age` ago, in one unit
    /// of work. A zero age disables the purge. On failure the unit is rolled
    /// back and the error returned; the periodic schedule is unaffected.
    pub fn purge_older_than(
        &mut self,
        cutoff_age: Duration,
        store: &mut HistoryStore,
        cleaner: &dyn AssetCleaner,
        now_ms: i64,
    ) -> Result<usize, StoreError> {
        let Some(cutoff) = RetentionPolicy::MaxAge(cutoff_age).cutoff(now_ms) else {
            return Ok(0);
        };

        let query = ItemQuery::all().pinned(false).captured_before(cutoff);
        let deleted = match store.delete_matching(&query) {
            Ok(deleted) => deleted,
            Err(e) => {
                store.rollback();
                warn!(error = %e, "Retention purge failed, rolled back");
                return Err(e);
            }
        };

        if deleted.is_empty() {
            debug!(cutoff, "Retention purge found nothing to delete");
            return Ok(0);
        }

        match store.save() {
            Ok(SaveOutcome::Committed) => {}
            Ok(SaveOutcome::Conflict) => {
                // Deletes cannot violate the hash constraint
                crate::debug_panic!("conflict while committing a retention purge");
                store.rollback();
                return Err(StoreError::InvalidItem(
                    "unexpected conflict during retention purge".to_string(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "Retention purge commit failed");
                return Err(e);
            }
        }

        let assets: Vec<String> = deleted.iter().flat_map(|item| item.asset_names()).collect();
        cleaner.release(assets);

        self.cycles = self.cycles.wrapping_add(1);
        let checkpoint = self.cycles % CHECKPOINT_EVERY == 0;
        if let Err(e) = store.run_maintenance(checkpoint) {
            warn!(error = %e, "Store maintenance after purge failed");
        }

        info!(count = deleted.len(), cutoff, checkpoint, "Purged expired history");
        Ok(deleted.len())
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
