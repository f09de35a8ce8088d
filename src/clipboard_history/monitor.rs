//! Clipboard engine
//!
//! One owning context for the history store. Poll ticks, wake events, asset
//! completions, expiry fires, retention sweeps, enrichment and user commands
//! all arrive as [`EngineMessage`]s on a single queue and are handled in
//! order on the engine thread. Timers and the asset worker only send
//! messages; they never touch the store.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

use super::asset_worker::{AssetCleaner, AssetCompletion, AssetJob, AssetWorker};
use super::blob_store::{ImageAssetStore, SavedAssets};
use super::change_detection::{ClipboardChangeDetector, GenerationChange};
use super::classifier::{classify, Classification, ClassifiedContent, ClassifierLimits, RejectReason};
use super::clipboard::ClipboardBoundary;
use super::database::{HistoryStore, SaveOutcome};
use super::dedup::{check_consecutive, hash_content, DedupDecision};
use super::expiration::{ExpirationScheduler, DEFAULT_CONCEALED_TTL};
use super::paste::{
    representations_for, InputSynthesizer, PasteBackController, PasteMode, PasteOutcome,
    PendingPaste, PermissionBoundary, PresentingSurface, DEFAULT_PASTE_DELAY,
};
use super::retention::{RetentionPolicy, RetentionSweeper, RETENTION_INTERVAL};
use super::snapshot::ClipboardSnapshot;
use super::transfer::{export_to_file, import_from_file, ImportReport};
use super::types::{ClipboardItem, ContentKind, Enrichment, ItemId, SourceApp};
use crate::config::Config;
use crate::error::{ClipKeepError, StoreError, TransferError};
use crate::scheduler::{Clock, Scheduler, TimerHandle};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_TOLERANCE: Duration = Duration::from_millis(100);
/// A gap between poll ticks longer than the poll interval plus this slack
/// means the machine slept or the wall clock was changed.
pub const CLOCK_JUMP_SLACK: Duration = Duration::from_secs(5);

/// Reports which application is frontmost when a capture happens.
pub trait SourceAppProvider: Send + Sync {
    fn frontmost_app(&self) -> Option<SourceApp>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub poll_tolerance: Duration,
    pub concealed_ttl: Duration,
    pub retention: RetentionPolicy,
    pub retention_interval: Duration,
    pub classifier: ClassifierLimits,
    pub paste_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_tolerance: DEFAULT_POLL_TOLERANCE,
            concealed_ttl: DEFAULT_CONCEALED_TTL,
            retention: RetentionPolicy::default(),
            retention_interval: RETENTION_INTERVAL,
            classifier: ClassifierLimits::default(),
            paste_delay: DEFAULT_PASTE_DELAY,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            concealed_ttl: config.concealed_ttl(),
            retention: RetentionPolicy::from_days(config.retention_days),
            classifier: config.classifier_limits(),
            paste_delay: config.paste_delay(),
            ..Self::default()
        }
    }
}

/// Collaborators injected into the engine.
pub struct EngineDeps {
    pub clipboard: Arc<dyn ClipboardBoundary>,
    pub permissions: Arc<dyn PermissionBoundary>,
    pub synthesizer: Arc<dyn InputSynthesizer>,
    pub surface: Arc<dyn PresentingSurface>,
    pub source_apps: Arc<dyn SourceAppProvider>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
}

pub enum EngineMessage {
    PollTick,
    /// The machine woke from sleep; poll immediately and sweep overdue items.
    SystemWake,
    AssetCompleted(AssetCompletion),
    Expire(ItemId),
    RetentionSweep,
    /// Enricher output for an existing item.
    Enrich {
        id: ItemId,
        enrichment: Enrichment,
    },
    Paste {
        id: ItemId,
        mode: PasteMode,
        plain: bool,
        reply: Option<SyncSender<Result<PasteOutcome>>>,
    },
    Delete {
        id: ItemId,
        reply: Option<SyncSender<Result<bool, StoreError>>>,
    },
    Export {
        path: PathBuf,
        reply: SyncSender<Result<usize, TransferError>>,
    },
    Import {
        path: PathBuf,
        reply: SyncSender<Result<ImportReport, TransferError>>,
    },
    Shutdown,
}

impl std::fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PollTick => f.write_str("PollTick"),
            Self::SystemWake => f.write_str("SystemWake"),
            Self::AssetCompleted(_) => f.write_str("AssetCompleted"),
            Self::Expire(id) => write!(f, "Expire({id})"),
            Self::RetentionSweep => f.write_str("RetentionSweep"),
            Self::Enrich { id, .. } => write!(f, "Enrich({id})"),
            Self::Paste { id, mode, .. } => write!(f, "Paste({id}, {mode:?})"),
            Self::Delete { id, .. } => write!(f, "Delete({id})"),
            Self::Export { path, .. } => write!(f, "Export({})", path.display()),
            Self::Import { path, .. } => write!(f, "Import({})", path.display()),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// A classified capture waiting for its image assets. Carries everything
/// needed to build the item except the raw image bytes.
#[derive(Debug, Clone)]
pub struct PendingCapture {
    pub content: ClassifiedContent,
    pub hash: String,
    pub captured_at: i64,
    pub byte_size: usize,
    pub source_app: Option<SourceApp>,
}

impl PendingCapture {
    fn into_item(self, assets: SavedAssets, concealed_ttl: Duration) -> ClipboardItem {
        let mut item = ClipboardItem::new(self.content.kind, self.hash, self.captured_at);
        item.text = self.content.text;
        item.html = self.content.html;
        item.rtf = self.content.rtf;
        item.generation = self.content.generation;
        item.byte_size = self.byte_size as i64;
        item.source_app = self.source_app;
        item.image_asset = assets.full;
        item.thumbnail_asset = assets.thumbnail;
        if self.content.concealed {
            item.concealed = true;
            item.expires_at = Some(self.captured_at + concealed_ttl.as_millis() as i64);
        }
        item
    }
}

/// What happened to one clipboard change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Stored(ItemId),
    /// Image handed to the asset worker; the item appears on completion.
    ImagePending,
    Duplicate,
    Rejected(RejectReason),
    Failed,
}

pub struct ClipboardEngine {
    settings: EngineSettings,
    store: HistoryStore,
    assets: AssetWorker,
    detector: ClipboardChangeDetector,
    expiration: ExpirationScheduler,
    retention: RetentionSweeper,
    paste: PasteBackController,
    clipboard: Arc<dyn ClipboardBoundary>,
    source_apps: Arc<dyn SourceAppProvider>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    sender: Sender<EngineMessage>,
    receiver: Receiver<EngineMessage>,
    poll_timer: Option<TimerHandle>,
    last_tick_ms: Option<i64>,
}

impl ClipboardEngine {
    pub fn new(
        settings: EngineSettings,
        store: HistoryStore,
        asset_store: ImageAssetStore,
        deps: EngineDeps,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();

        let completions = sender.clone();
        let assets = AssetWorker::start(asset_store, move |completion| {
            let _ = completions.send(EngineMessage::AssetCompleted(completion));
        })
        .context("Failed to start asset worker")?;

        let expiries = sender.clone();
        let expiration = ExpirationScheduler::new(
            Arc::clone(&deps.scheduler),
            Arc::new(move |id| {
                let _ = expiries.send(EngineMessage::Expire(id));
            }),
        );

        let retention = RetentionSweeper::new(settings.retention, Arc::clone(&deps.scheduler));
        let paste = PasteBackController::new(
            Arc::clone(&deps.clipboard),
            deps.permissions,
            deps.synthesizer,
            deps.surface,
            Arc::clone(&deps.scheduler),
            settings.paste_delay,
        );

        Ok(Self {
            settings,
            store,
            assets,
            detector: ClipboardChangeDetector::new(),
            expiration,
            retention,
            paste,
            clipboard: deps.clipboard,
            source_apps: deps.source_apps,
            scheduler: deps.scheduler,
            clock: deps.clock,
            sender,
            receiver,
            poll_timer: None,
            last_tick_ms: None,
        })
    }

    /// Sender for posting messages to this engine.
    pub fn sender(&self) -> Sender<EngineMessage> {
        self.sender.clone()
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut HistoryStore {
        &mut self.store
    }

    pub fn detector(&self) -> &ClipboardChangeDetector {
        &self.detector
    }

    pub fn pending_expiries(&self) -> usize {
        self.expiration.pending()
    }

    /// Start-up sweeps, then arm the retention and poll timers.
    #[instrument(skip(self))]
    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        if let Err(e) = self.expiration.sweep_overdue(&mut self.store, &self.assets, now) {
            warn!(error = %e, "Start-up expiry sweep failed");
        }
        match self.expiration.arm_pending(&self.store, now) {
            Ok(armed) if armed > 0 => info!(armed, "Re-armed concealed item timers"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to re-arm concealed item timers"),
        }

        self.run_retention_sweep();

        match self.store.referenced_assets() {
            Ok(live) => {
                self.assets.submit(AssetJob::CollectGarbage { live });
            }
            Err(e) => warn!(error = %e, "Could not list live assets, skipping asset GC"),
        }

        let retention_tx = self.sender.clone();
        self.retention.start(
            self.settings.retention_interval,
            Box::new(move || {
                let _ = retention_tx.send(EngineMessage::RetentionSweep);
            }),
        );

        if let Some(previous) = self.poll_timer.take() {
            previous.cancel();
        }
        let poll_tx = self.sender.clone();
        self.poll_timer = Some(self.scheduler.every(
            self.settings.poll_interval,
            self.settings.poll_tolerance,
            Box::new(move || {
                let _ = poll_tx.send(EngineMessage::PollTick);
            }),
        ));

        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            retention = ?self.settings.retention,
            "Clipboard engine started"
        );
    }

    /// Cancel timers and stop the asset worker. Pending expiries are left to
    /// the next start-up sweep.
    pub fn stop(&mut self) {
        if let Some(timer) = self.poll_timer.take() {
            timer.cancel();
        }
        self.retention.stop();
        self.expiration.cancel_all();
        self.store.rollback();
        self.assets.shutdown();
        info!("Clipboard engine stopped");
    }

    /// Handle one message. Returns false on shutdown.
    pub fn handle(&mut self, message: EngineMessage) -> bool {
        trace!(message = ?message, "Engine message");
        match message {
            EngineMessage::PollTick => {
                self.poll_tick();
            }
            EngineMessage::SystemWake => {
                info!("System wake, polling immediately");
                let now = self.clock.now_ms();
                self.last_tick_ms = Some(now);
                self.resync_expiries(now);
                self.poll_tick();
            }
            EngineMessage::AssetCompleted(completion) => self.on_asset_completion(completion),
            EngineMessage::Expire(id) => {
                if let Err(e) = self.expiration.fire(&id, &mut self.store, &self.assets) {
                    warn!(id = %id, error = %e, "Failed to expire concealed item");
                }
            }
            EngineMessage::RetentionSweep => self.run_retention_sweep(),
            EngineMessage::Enrich { id, enrichment } => self.apply_enrichment(&id, &enrichment),
            EngineMessage::Paste {
                id,
                mode,
                plain,
                reply,
            } => self.paste_item(PendingPaste {
                item_id: id,
                mode,
                plain,
                reply,
            }),
            EngineMessage::Delete { id, reply } => {
                let result = self.delete_item(&id);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(id = %id, error = %e, "Delete failed");
                        }
                    }
                }
            }
            EngineMessage::Export { path, reply } => {
                let now = self.clock.now_ms();
                let _ = reply.send(export_to_file(&self.store, &path, now));
            }
            EngineMessage::Import { path, reply } => {
                let _ = reply.send(import_from_file(&mut self.store, &path));
            }
            EngineMessage::Shutdown => {
                info!("Clipboard engine shutdown requested");
                return false;
            }
        }
        true
    }

    /// Start, then process messages until shutdown.
    pub fn run(mut self) {
        self.start();
        while let Ok(message) = self.receiver.recv() {
            if !self.handle(message) {
                break;
            }
        }
        self.stop();
    }

    /// Handle every queued message without blocking.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.receiver.try_recv() {
            handled += 1;
            if !self.handle(message) {
                break;
            }
        }
        handled
    }

    /// Wait up to `timeout` for a message, then drain the queue.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => {
                if !self.handle(message) {
                    return 1;
                }
                1 + self.process_pending()
            }
            Err(_) => 0,
        }
    }

    /// Run the engine on its own thread.
    pub fn spawn(self) -> Result<EngineHandle> {
        let sender = self.sender.clone();
        let thread = thread::Builder::new()
            .name("clipkeep-engine".to_string())
            .spawn(move || self.run())
            .context("Failed to spawn engine thread")?;
        Ok(EngineHandle {
            sender,
            thread: Some(thread),
        })
    }

    /// Check the generation and capture the clipboard if it changed.
    ///
    /// Expiry timers run on a monotonic clock that stops while the machine
    /// sleeps, so a wall-clock jump between ticks resyncs them first.
    pub fn poll_tick(&mut self) -> Option<CaptureOutcome> {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_tick_ms.replace(now) {
            let gap = (now - last).abs();
            let limit = (self.settings.poll_interval + CLOCK_JUMP_SLACK).as_millis() as i64;
            if gap > limit {
                info!(gap_ms = gap, "Wall clock jumped between polls, resyncing expiries");
                self.resync_expiries(now);
            }
        }

        let Some(current) = self.clipboard.current_generation() else {
            trace!("Clipboard generation unavailable");
            return None;
        };
        if self.detector.observe(current) == GenerationChange::Unchanged {
            return None;
        }
        if self.detector.consume_suppression(current) {
            debug!(generation = current, "Skipping our own clipboard write");
            return None;
        }

        let snapshot = match self.clipboard.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, generation = current, "Failed to read clipboard");
                return Some(CaptureOutcome::Failed);
            }
        };
        Some(self.capture_snapshot(snapshot))
    }

    /// Classify, dedup and store one snapshot.
    pub fn capture_snapshot(&mut self, snapshot: ClipboardSnapshot) -> CaptureOutcome {
        let mut content = match classify(snapshot, &self.settings.classifier) {
            Classification::Accepted(content) => content,
            Classification::Rejected(reason) => return CaptureOutcome::Rejected(reason),
        };
        let Some(hash) = hash_content(&content) else {
            return CaptureOutcome::Rejected(RejectReason::Empty);
        };

        match check_consecutive(&self.store, &hash) {
            Ok(DedupDecision::ConsecutiveDuplicate) => return CaptureOutcome::Duplicate,
            Ok(DedupDecision::New) => {}
            Err(e) => {
                warn!(error = %e, "Dedup lookup failed, dropping capture");
                return CaptureOutcome::Failed;
            }
        }

        let byte_size = content.byte_size();
        let image = content.image.take();
        let capture = PendingCapture {
            content,
            hash,
            captured_at: self.clock.now_ms(),
            byte_size,
            source_app: self.source_apps.frontmost_app(),
        };

        if capture.content.kind != ContentKind::Image {
            return self.materialize(capture, SavedAssets::default());
        }
        let Some(bytes) = image else {
            return CaptureOutcome::Rejected(RejectReason::Empty);
        };
        if self.assets.submit(AssetJob::Save { capture, bytes }) {
            CaptureOutcome::ImagePending
        } else {
            CaptureOutcome::Failed
        }
    }

    /// Build the item, insert it and commit.
    fn materialize(&mut self, capture: PendingCapture, assets: SavedAssets) -> CaptureOutcome {
        let kind = capture.content.kind;
        if kind == ContentKind::Image && assets.full.is_none() {
            warn!(hash = %capture.hash, "Image asset save failed, dropping capture");
            return CaptureOutcome::Failed;
        }

        let item = capture.into_item(assets, self.settings.concealed_ttl);
        let asset_names = item.asset_names();

        if let Err(e) = self.store.insert(&item) {
            if !e.is_conflict() {
                self.store.rollback();
                self.assets.release(asset_names);
                warn!(error = %e, kind = kind.as_str(), "Failed to store capture");
                return CaptureOutcome::Failed;
            }
        }

        match self.store.save() {
            Ok(SaveOutcome::Committed) => {}
            Ok(SaveOutcome::Conflict) => {
                self.store.rollback();
                self.assets.release(asset_names);
                debug!(hash = %item.content_hash, "Content already in history");
                return CaptureOutcome::Duplicate;
            }
            Err(e) => {
                self.assets.release(asset_names);
                warn!(error = %e, "Failed to commit capture");
                return CaptureOutcome::Failed;
            }
        }

        if let Some(expires_at) = item.expires_at {
            let remaining = (expires_at - self.clock.now_ms()).max(0) as u64;
            self.expiration
                .schedule(item.id.clone(), Duration::from_millis(remaining));
        }

        info!(
            id = %item.id,
            kind = kind.as_str(),
            bytes = item.byte_size,
            concealed = item.concealed,
            "Captured clipboard item"
        );
        CaptureOutcome::Stored(item.id)
    }

    fn on_asset_completion(&mut self, completion: AssetCompletion) {
        match completion {
            AssetCompletion::Saved { capture, assets } => {
                self.materialize(capture, assets);
            }
            AssetCompletion::Loaded { paste, result } => {
                let item = match self.store.get(&paste.item_id) {
                    Ok(Some(item)) => item,
                    Ok(None) => {
                        debug!(id = %paste.item_id, "Item vanished before its image loaded");
                        let id = paste.item_id.clone();
                        paste.respond(Err(anyhow!("Item {id} no longer exists")));
                        return;
                    }
                    Err(e) => {
                        paste.respond(Err(e.into()));
                        return;
                    }
                };
                let outcome = result
                    .with_context(|| format!("Failed to load image for item {}", item.id))
                    .and_then(|bytes| self.write_item(&item, paste.mode, paste.plain, Some(bytes)));
                paste.respond(outcome);
            }
        }
    }

    fn write_item(
        &mut self,
        item: &ClipboardItem,
        mode: PasteMode,
        plain: bool,
        image: Option<Vec<u8>>,
    ) -> Result<PasteOutcome> {
        let write = representations_for(item, plain, image)?;
        self.paste.paste(&write, mode, &mut self.detector)
    }

    /// Write an item back to the clipboard. Image items load their asset on
    /// the worker first and finish on completion.
    pub fn paste_item(&mut self, paste: PendingPaste) {
        let item = match self.store.get(&paste.item_id) {
            Ok(Some(item)) => item,
            Ok(None) => {
                let id = paste.item_id.clone();
                paste.respond(Err(anyhow!("Item {id} not found")));
                return;
            }
            Err(e) => {
                paste.respond(Err(e.into()));
                return;
            }
        };

        if item.kind == ContentKind::Image {
            let Some(asset) = item.image_asset.clone() else {
                paste.respond(Err(anyhow!("Item {} has no image asset", item.id)));
                return;
            };
            self.assets.submit(AssetJob::Load { asset, paste });
            return;
        }

        let outcome = self.write_item(&item, paste.mode, paste.plain, None);
        paste.respond(outcome);
    }

    /// User-initiated delete.
    pub fn delete_item(&mut self, id: &ItemId) -> Result<bool, StoreError> {
        self.expiration.cancel(id);
        let deleted = match self.store.delete(id) {
            Ok(deleted) => deleted,
            Err(e) => {
                self.store.rollback();
                return Err(e);
            }
        };
        let Some(item) = deleted else {
            return Ok(false);
        };
        if self.store.save()? != SaveOutcome::Committed {
            self.store.rollback();
            return Ok(false);
        }
        self.assets.release(item.asset_names());
        Ok(true)
    }

    /// Delete concealed items that are already overdue and re-arm the rest
    /// against the current wall clock.
    fn resync_expiries(&mut self, now: i64) {
        if let Err(e) = self.expiration.sweep_overdue(&mut self.store, &self.assets, now) {
            warn!(error = %e, "Overdue expiry sweep failed");
        }
        self.expiration.cancel_all();
        if let Err(e) = self.expiration.arm_pending(&self.store, now) {
            warn!(error = %e, "Failed to re-arm concealed item timers");
        }
    }

    fn run_retention_sweep(&mut self) {
        let now = self.clock.now_ms();
        if let Err(e) = self.retention.sweep(&mut self.store, &self.assets, now) {
            warn!(error = %e, "Retention sweep failed");
        }
    }

    fn apply_enrichment(&mut self, id: &ItemId, enrichment: &Enrichment) {
        let applied = match self.store.apply_enrichment(id, enrichment) {
            Ok(applied) => applied,
            Err(e) => {
                self.store.rollback();
                warn!(id = %id, error = %e, "Failed to apply enrichment");
                return;
            }
        };
        if !applied {
            debug!(id = %id, "Enrichment for missing item ignored");
            return;
        }
        match self.store.save() {
            Ok(SaveOutcome::Committed) => debug!(id = %id, "Applied enrichment"),
            Ok(SaveOutcome::Conflict) => self.store.rollback(),
            Err(e) => warn!(id = %id, error = %e, "Failed to commit enrichment"),
        }
    }
}

/// Handle to an engine running on its own thread.
pub struct EngineHandle {
    sender: Sender<EngineMessage>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn sender(&self) -> Sender<EngineMessage> {
        self.sender.clone()
    }

    pub fn send(&self, message: EngineMessage) -> Result<(), ClipKeepError> {
        self.sender
            .send(message)
            .map_err(|_| ClipKeepError::EngineStopped)
    }

    pub fn wake(&self) -> Result<(), ClipKeepError> {
        self.send(EngineMessage::SystemWake)
    }

    /// Paste an item and wait for the outcome.
    pub fn paste(&self, id: ItemId, mode: PasteMode, plain: bool) -> Result<PasteOutcome> {
        let (reply, outcome) = mpsc::sync_channel(1);
        self.send(EngineMessage::Paste {
            id,
            mode,
            plain,
            reply: Some(reply),
        })?;
        outcome.recv().map_err(|_| ClipKeepError::EngineStopped)?
    }

    pub fn delete(&self, id: ItemId) -> Result<bool, ClipKeepError> {
        let (reply, outcome) = mpsc::sync_channel(1);
        self.send(EngineMessage::Delete {
            id,
            reply: Some(reply),
        })?;
        Ok(outcome.recv().map_err(|_| ClipKeepError::EngineStopped)??)
    }

    pub fn export(&self, path: PathBuf) -> Result<usize, ClipKeepError> {
        let (reply, outcome) = mpsc::sync_channel(1);
        self.send(EngineMessage::Export { path, reply })?;
        Ok(outcome.recv().map_err(|_| ClipKeepError::EngineStopped)??)
    }

    pub fn import(&self, path: PathBuf) -> Result<ImportReport, ClipKeepError> {
        let (reply, outcome) = mpsc::sync_channel(1);
        self.send(EngineMessage::Import { path, reply })?;
        Ok(outcome.recv().map_err(|_| ClipKeepError::EngineStopped)??)
    }

    /// Ask the engine to stop and wait for it.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.sender.send(EngineMessage::Shutdown);
        if thread.join().is_err() {
            warn!("Engine thread panicked");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
