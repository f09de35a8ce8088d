//! File-based image asset storage
//!
//! Full images and thumbnails live as files in one directory; items store
//! only the bare filenames. Every method here does disk I/O and is called
//! from the asset worker, never from the engine thread.
//!
//! Layout: `{dir}/{uuid}.img` (PNG, larger edge capped) and
//! `{dir}/{uuid}_thumb.img` (PNG thumbnail).

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::asset_worker::AssetCleaner;
use super::image::{render_assets, DEFAULT_MAX_IMAGE_EDGE, DEFAULT_THUMBNAIL_EDGE};
use crate::error::AssetError;

pub const ASSET_EXTENSION: &str = "img";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    pub max_edge: u32,
    pub thumbnail_edge: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_IMAGE_EDGE,
            thumbnail_edge: DEFAULT_THUMBNAIL_EDGE,
        }
    }
}

/// Filenames produced by [`ImageAssetStore::save`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedAssets {
    pub full: Option<String>,
    pub thumbnail: Option<String>,
}

impl SavedAssets {
    pub fn names(&self) -> Vec<String> {
        self.full.iter().chain(self.thumbnail.iter()).cloned().collect()
    }
}

pub fn full_asset_name(id: &Uuid) -> String {
    format!("{}.{}", id, ASSET_EXTENSION)
}

pub fn thumbnail_asset_name(id: &Uuid) -> String {
    format!("{}_thumb.{}", id, ASSET_EXTENSION)
}

#[derive(Debug, Clone)]
pub struct ImageAssetStore {
    dir: PathBuf,
    limits: ImageLimits,
}

impl ImageAssetStore {
    pub fn new(dir: impl Into<PathBuf>, limits: ImageLimits) -> Result<Self, AssetError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| AssetError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir, limits })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Store an image as a full asset plus thumbnail.
    ///
    /// Any failure of the full asset returns `(None, None)` and leaves nothing
    /// on disk. A thumbnail failure is logged and only the full asset is kept.
    pub fn save(&self, bytes: &[u8]) -> SavedAssets {
        let id = Uuid::new_v4();
        let full_name = full_asset_name(&id);
        let full_path = self.resolve(&full_name);

        let ImageLimits {
            max_edge,
            thumbnail_edge,
        } = self.limits;
        let rendered = match render_assets(bytes, max_edge, thumbnail_edge) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, size = bytes.len(), "Failed to render clipboard image");
                return SavedAssets::default();
            }
        };
        if let Err(e) = write_atomically(&full_path, &rendered.full) {
            warn!(error = %e, path = %full_path.display(), "Failed to write image asset");
            return SavedAssets::default();
        }
        debug!(asset = %full_name, size = rendered.full.len(), "Stored image asset");

        let thumb_name = thumbnail_asset_name(&id);
        let thumbnail = match rendered.thumbnail {
            Ok(png) => match write_atomically(&self.resolve(&thumb_name), &png) {
                Ok(()) => Some(thumb_name),
                Err(e) => {
                    warn!(error = %e, "Failed to write thumbnail, keeping full asset only");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to render thumbnail, keeping full asset only");
                None
            }
        };

        SavedAssets {
            full: Some(full_name),
            thumbnail,
        }
    }

    pub fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name);
        fs::read(&path).with_context(|| format!("Failed to read asset {}", path.display()))
    }

    /// Delete assets by filename. Best-effort and idempotent; returns how
    /// many files were actually removed.
    pub fn delete(&self, names: &[String]) -> usize {
        let mut deleted = 0;
        for name in names {
            if !is_plain_filename(name) {
                warn!(asset = %name, "Refusing to delete asset with path components");
                continue;
            }
            match fs::remove_file(self.resolve(name)) {
                Ok(()) => {
                    debug!(asset = %name, "Deleted asset file");
                    deleted += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(asset = %name, "Asset file not found, nothing to delete");
                }
                Err(e) => {
                    warn!(asset = %name, error = %e, "Failed to delete asset file");
                }
            }
        }
        deleted
    }

    /// Remove asset files no live item references.
    pub fn collect_garbage(&self, live: &HashSet<String>) -> Result<usize> {
        let mut deleted = 0;
        let entries = fs::read_dir(&self.dir).context("Failed to read asset directory")?;

        for entry in entries.flatten() {
            let path = entry.path();
            let is_asset = path.extension().is_some_and(|ext| ext == ASSET_EXTENSION)
                || path.extension().is_some_and(|ext| ext == "tmp");
            if !is_asset {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                if !live.contains(name) && fs::remove_file(&path).is_ok() {
                    debug!(asset = %name, "GC'd orphaned asset");
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            debug!(deleted, "Garbage collected orphaned assets");
        }
        Ok(deleted)
    }
}

/// Synchronous release, for callers with no asset worker (the offline CLI
/// commands).
impl AssetCleaner for ImageAssetStore {
    fn release(&self, assets: Vec<String>) {
        self.delete(&assets);
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && name != "." && name != ".."
}

/// Write through a temp file so a crash never leaves a truncated asset.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move asset into {}", path.display()));
    }
    Ok(())
}
