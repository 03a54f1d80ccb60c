//! Preserved-block registry and buffer finalization.
//!
//! Some render paths run the marker through hostile content filters (HTML
//! sanitizers, attribute escapers) that would strip an `<esi:include/>` tag.
//! Such markers are parked here under a content hash, an opaque hex string
//! that survives any filter, and swapped back in one pass when the output
//! buffer is finalized.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Request-scoped map from content hash to the raw marker string.
#[derive(Debug, Default)]
pub struct PreserveRegistry {
    entries: HashMap<String, String>,
}

impl PreserveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a marker and return its hash stand-in.
    ///
    /// Idempotent: the same marker always hashes to the same key, and a
    /// second registration leaves the existing entry untouched.
    pub fn register(&mut self, marker: &str) -> String {
        let hash = content_hash(marker);
        if self.entries.insert(hash.clone(), marker.to_string()).is_none() {
            debug!(hash = %hash, "preserved fragment marker");
        }
        hash
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Substitute every registered hash back to its marker.
    ///
    /// Runs once at the final output-buffer stage, over the whole registry.
    /// With nothing registered the buffer passes through untouched, so pages
    /// without preserved fragments never pay for a scan.
    pub fn finalize(&self, buffer: String) -> String {
        if self.entries.is_empty() {
            return buffer;
        }

        debug!(count = self.entries.len(), "restoring preserved fragment markers");

        let mut restored = buffer;
        for (hash, marker) in &self.entries {
            restored = restored.replace(hash, marker);
        }
        restored
    }

    /// Quoted hash occurrences in `content`, without substituting.
    ///
    /// Upstream buffer stages use this as a guard: a quoted hash means the
    /// content still carries a disguised marker and must not be cached or
    /// re-filtered as-is. Both quote styles are probed because the stand-in
    /// is documented to sit inside an attribute.
    pub fn preserved_hits(&self, content: &str) -> Vec<String> {
        let mut hits = Vec::new();
        for hash in self.entries.keys() {
            for quote in ['"', '\''] {
                let quoted = format!("{quote}{hash}{quote}");
                if content.contains(&quoted) {
                    hits.push(quoted);
                }
            }
        }
        hits
    }
}

/// Stable hash of a marker string, hex-encoded.
///
/// The output is attribute-safe: lowercase hex only, no quoting hazards.
fn content_hash(marker: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(marker.as_bytes());
    hex::encode(hasher.finalize())
}
