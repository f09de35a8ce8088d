//! Asset worker thread
//!
//! All image asset disk I/O runs here, off the engine thread. Jobs arrive
//! over an mpsc channel; results go back through a completion callback
//! (the engine wires it to its own message queue). Failures travel as
//! values, the worker never panics the engine.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::blob_store::{ImageAssetStore, SavedAssets};
use super::monitor::PendingCapture;
use super::paste::PendingPaste;

pub enum AssetJob {
    /// Render and store a captured image.
    Save {
        capture: PendingCapture,
        bytes: Vec<u8>,
    },
    /// Read a full asset for paste-back.
    Load { asset: String, paste: PendingPaste },
    /// Best-effort removal of asset files.
    Delete { assets: Vec<String> },
    /// Remove files not in the live set.
    CollectGarbage { live: HashSet<String> },
    Shutdown,
}

pub enum AssetCompletion {
    Saved {
        capture: PendingCapture,
        assets: SavedAssets,
    },
    Loaded {
        paste: PendingPaste,
        result: Result<Vec<u8>>,
    },
}

/// Sink for asset files whose owning items are gone.
pub trait AssetCleaner {
    fn release(&self, assets: Vec<String>);
}

pub struct AssetWorker {
    sender: Sender<AssetJob>,
    handle: Option<JoinHandle<()>>,
}

impl AssetWorker {
    pub fn start<F>(store: ImageAssetStore, on_complete: F) -> Result<Self>
    where
        F: Fn(AssetCompletion) + Send + 'static,
    {
        let (tx, rx): (Sender<AssetJob>, Receiver<AssetJob>) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("clipkeep-assets".to_string())
            .spawn(move || asset_worker_loop(store, rx, on_complete))
            .context("Failed to spawn asset worker thread")?;

        info!("Asset worker thread started");
        Ok(Self {
            sender: tx,
            handle: Some(handle),
        })
    }

    /// Queue a job. Returns false if the worker is gone.
    pub fn submit(&self, job: AssetJob) -> bool {
        if self.sender.send(job).is_err() {
            warn!("Asset worker is not running, job dropped");
            return false;
        }
        true
    }

    /// Stop after draining queued jobs.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.sender.send(AssetJob::Shutdown);
        if handle.join().is_err() {
            warn!("Asset worker thread panicked");
        }
    }
}

impl AssetCleaner for AssetWorker {
    fn release(&self, assets: Vec<String>) {
        if !assets.is_empty() {
            self.submit(AssetJob::Delete { assets });
        }
    }
}

impl Drop for AssetWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn asset_worker_loop<F>(store: ImageAssetStore, rx: Receiver<AssetJob>, on_complete: F)
where
    F: Fn(AssetCompletion),
{
    debug!(dir = %store.dir().display(), "Asset worker loop started");
    for job in rx {
        match job {
            AssetJob::Save { capture, bytes } => {
                let assets = store.save(&bytes);
                on_complete(AssetCompletion::Saved { capture, assets });
            }
            AssetJob::Load { asset, paste } => {
                let result = store.load(&asset);
                on_complete(AssetCompletion::Loaded { paste, result });
            }
            AssetJob::Delete { assets } => {
                let deleted = store.delete(&assets);
                debug!(requested = assets.len(), deleted, "Released assets");
            }
            AssetJob::CollectGarbage { live } => match store.collect_garbage(&live) {
                Ok(deleted) if deleted > 0 => info!(deleted, "Removed orphaned assets"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Asset garbage collection failed"),
            },
            AssetJob::Shutdown => {
                info!("Asset worker shutdown");
                break;
            }
        }
    }
    debug!("Asset worker loop ended");
}
