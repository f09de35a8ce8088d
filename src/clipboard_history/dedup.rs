//! Content hashing and duplicate detection
//!
//! Every item carries a SHA-256 of its canonical bytes. Two checks keep
//! history clean: the consecutive check against the newest item (cheap,
//! silent) and the store's unique constraint on `content_hash` (backstop).

use sha2::{Digest, Sha256};
use tracing::debug;

use super::classifier::ClassifiedContent;
use super::database::HistoryStore;
use super::types::ContentKind;
use crate::error::StoreError;

/// Images are identified by a prefix of their raw bytes, which is enough to
/// tell screenshots apart without hashing megabytes on every copy.
pub const IMAGE_HASH_PREFIX_LEN: usize = 1024;

/// Compute SHA-256 of `bytes` as lowercase hex
pub fn compute_content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical bytes for an item of `kind`.
///
/// Rich text hashes its plain text, falling back to markup and then the RTF
/// blob when no plain text exists.
pub fn canonical_bytes<'a>(
    kind: ContentKind,
    text: Option<&'a str>,
    html: Option<&'a str>,
    rtf: Option<&'a [u8]>,
    image: Option<&'a [u8]>,
) -> Option<&'a [u8]> {
    match kind {
        ContentKind::Text | ContentKind::Url | ContentKind::File => text.map(str::as_bytes),
        ContentKind::RichText => text
            .map(str::as_bytes)
            .or_else(|| html.map(str::as_bytes))
            .or(rtf),
        ContentKind::Image => image.map(|b| &b[..b.len().min(IMAGE_HASH_PREFIX_LEN)]),
    }
}

/// Content hash of classified clipboard content.
pub fn hash_content(content: &ClassifiedContent) -> Option<String> {
    canonical_bytes(
        content.kind,
        content.text.as_deref(),
        content.html.as_deref(),
        content.rtf.as_deref(),
        content.image.as_deref(),
    )
    .map(compute_content_hash)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    New,
    ConsecutiveDuplicate,
}

/// Compare `hash` against the most recent item.
pub fn check_consecutive(store: &HistoryStore, hash: &str) -> Result<DedupDecision, StoreError> {
    match store.latest_content_hash()? {
        Some(latest) if latest == hash => {
            debug!(hash = %hash, "Consecutive duplicate, discarding");
            Ok(DedupDecision::ConsecutiveDuplicate)
        }
        _ => Ok(DedupDecision::New),
    }
}
