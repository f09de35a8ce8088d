//! Concealed-item expiry
//!
//! Every concealed item gets a one-shot timer. The timer only posts the item
//! id back to the engine; the engine calls [`ExpirationScheduler::fire`] on
//! its own thread, which re-resolves the item and deletes it. Items whose
//! timers were lost to a restart are handled by `sweep_overdue` and
//! `arm_pending` at start-up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::asset_worker::AssetCleaner;
use super::database::{HistoryStore, ItemQuery, SaveOutcome};
use super::types::ItemId;
use crate::error::StoreError;
use crate::scheduler::{Scheduler, TimerHandle};

/// Default lifetime of concealed items, measured from capture.
pub const DEFAULT_CONCEALED_TTL: Duration = Duration::from_secs(60);

/// Callback a fired timer uses to hand the id back to the owning context.
pub type ExpiryNotifier = Arc<dyn Fn(ItemId) + Send + Sync>;

pub struct ExpirationScheduler {
    scheduler: Arc<dyn Scheduler>,
    notify: ExpiryNotifier,
    timers: HashMap<ItemId, TimerHandle>,
}

impl ExpirationScheduler {
    pub fn new(scheduler: Arc<dyn Scheduler>, notify: ExpiryNotifier) -> Self {
        Self {
            scheduler,
            notify,
            timers: HashMap::new(),
        }
    }

    /// Arm (or re-arm) the expiry timer for `id`.
    pub fn schedule(&mut self, id: ItemId, ttl: Duration) {
        if let Some(previous) = self.timers.remove(&id) {
            previous.cancel();
        }
        let notify = Arc::clone(&self.notify);
        let fired = id.clone();
        let handle = self.scheduler.after(ttl, Box::new(move || notify(fired)));
        debug!(id = %id, ttl_ms = ttl.as_millis() as u64, "Scheduled concealed item expiry");
        self.timers.insert(id, handle);
    }

    pub fn cancel(&mut self, id: &ItemId) -> bool {
        match self.timers.remove(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.cancel();
        }
    }

    pub fn is_scheduled(&self, id: &ItemId) -> bool {
        self.timers.contains_key(id)
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Expire `id` now. A missing or no-longer-concealed item is a no-op.
    pub fn fire(
        &mut self,
        id: &ItemId,
        store: &mut HistoryStore,
        cleaner: &dyn AssetCleaner,
    ) -> Result<bool, StoreError> {
        self.timers.remove(id);

        match store.get(id)? {
            Some(item) if item.concealed => {}
            Some(_) => {
                debug!(id = %id, "Item no longer concealed, nothing to expire");
                return Ok(false);
            }
            None => {
                debug!(id = %id, "Expired item already gone");
                return Ok(false);
            }
        }

        let deleted = match store.delete(id) {
            Ok(deleted) => deleted,
            Err(e) => {
                store.rollback();
                return Err(e);
            }
        };
        commit(store)?;

        if let Some(item) = deleted {
            cleaner.release(item.asset_names());
            debug!(id = %id, "Expired concealed item");
            return Ok(true);
        }
        Ok(false)
    }

    /// Delete every concealed item whose expiry is at or before `now_ms`, in
    /// one unit of work.
    pub fn sweep_overdue(
        &mut self,
        store: &mut HistoryStore,
        cleaner: &dyn AssetCleaner,
        now_ms: i64,
    ) -> Result<usize, StoreError> {
        let query = ItemQuery::all().concealed(true).expires_at_or_before(now_ms);
        let deleted = match store.delete_matching(&query) {
            Ok(deleted) => deleted,
            Err(e) => {
                store.rollback();
                return Err(e);
            }
        };
        if deleted.is_empty() {
            return Ok(0);
        }
        commit(store)?;

        for item in &deleted {
            self.cancel(&item.id);
            cleaner.release(item.asset_names());
        }
        info!(count = deleted.len(), "Swept overdue concealed items");
        Ok(deleted.len())
    }

    /// Arm timers for concealed items that have not expired yet, e.g. after a
    /// restart.
    pub fn arm_pending(&mut self, store: &HistoryStore, now_ms: i64) -> Result<usize, StoreError> {
        let concealed = store.query(&ItemQuery::all().concealed(true))?;
        let mut armed = 0;
        for item in concealed {
            let Some(expires_at) = item.expires_at else {
                continue;
            };
            if expires_at > now_ms && !self.is_scheduled(&item.id) {
                let remaining = Duration::from_millis((expires_at - now_ms) as u64);
                self.schedule(item.id, remaining);
                armed += 1;
            }
        }
        Ok(armed)
    }
}

fn commit(store: &mut HistoryStore) -> Result<(), StoreError> {
    match store.save() {
        Ok(SaveOutcome::Committed) => Ok(()),
        Ok(SaveOutcome::Conflict) => {
            store.rollback();
            Err(StoreError::InvalidItem(
                "unexpected conflict while deleting".to_string(),
            ))
        }
        Err(e) => Err(e),
    }
}
