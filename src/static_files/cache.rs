//! The in-memory file cache and its coherence protocol.
//!
//! The lock discipline -- one mutex, held only for lookup/mtime-stat/
//! mutation, with the actual file I/O and compression happening outside it
//! -- keeps the held-while-locked critical sections small plain-data
//! operations rather than RAII guards spanning I/O, matching the reader
//! pool's lock discipline in `server.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write as _;
use tokio::io::AsyncReadExt;

use crate::error::HttpError;
use crate::log::Logger;

pub struct FileCacheEntry {
    pub canonical_path: PathBuf,
    pub http_path: String,
    pub extension: String,
    pub mtime: SystemTime,
    pub uncompressed: Vec<u8>,
    pub gzip: Option<Vec<u8>>,
    pub brotli: Option<Vec<u8>>,
    hits: AtomicU64,
}

impl FileCacheEntry {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

pub struct FileCache {
    entries: Mutex<HashMap<String, std::sync::Arc<FileCacheEntry>>>,
}

/// What the caller (the handler in `mod.rs`) must do after the lock-held
/// part of `update_cache` returns: either the entry is fresh and usable as
/// is, or the caller must perform the unlocked path-resolution/read/compress
/// steps and call `insert`/`store_gzip_if_smaller`.
pub enum CacheStatus {
    Fresh(std::sync::Arc<FileCacheEntry>),
    Miss,
}

impl FileCache {
    pub fn new() -> Self {
        FileCache { entries: Mutex::new(HashMap::new()) }
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn lookup(&self, http_path: &str) -> Option<std::sync::Arc<FileCacheEntry>> {
        self.entries.lock().unwrap().get(http_path).cloned()
    }

    /// Under the lock: if an entry exists, stat its canonical path. Matching
    /// mtime means the cache is fresh. A differing mtime, or a vanished
    /// file, evicts the entry (which also discards its `.gz`/`.br` bytes,
    /// since they're fields of the same entry rather than separate map
    /// slots).
    pub fn check_freshness(&self, http_path: &str) -> CacheStatus {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(http_path).cloned() else {
            return CacheStatus::Miss;
        };

        match std::fs::metadata(&entry.canonical_path).and_then(|m| m.modified()) {
            Ok(mtime) if mtime == entry.mtime => CacheStatus::Fresh(entry),
            _ => {
                entries.remove(http_path);
                CacheStatus::Miss
            }
        }
    }

    pub fn insert(&self, entry: FileCacheEntry) -> std::sync::Arc<FileCacheEntry> {
        let arc = std::sync::Arc::new(entry);
        self.entries.lock().unwrap().insert(arc.http_path.clone(), arc.clone());
        arc
    }

    /// Replaces the stored entry's gzip bytes, but only if it's still the
    /// same file generation (same mtime) -- a concurrent reload may have
    /// already replaced it, in which case this is a no-op. Two concurrent
    /// first loads of the same path may both do the work; the later insert
    /// wins and the earlier one's bytes are simply discarded here.
    pub fn store_gzip_if_smaller(&self, http_path: &str, mtime: SystemTime, gzip_bytes: Vec<u8>, uncompressed_len: usize) {
        if gzip_bytes.len() >= uncompressed_len {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(http_path) {
            if existing.mtime == mtime {
                let replacement = FileCacheEntry {
                    canonical_path: existing.canonical_path.clone(),
                    http_path: existing.http_path.clone(),
                    extension: existing.extension.clone(),
                    mtime: existing.mtime,
                    uncompressed: existing.uncompressed.clone(),
                    gzip: Some(gzip_bytes),
                    brotli: existing.brotli.clone(),
                    hits: AtomicU64::new(existing.hit_count()),
                };
                entries.insert(http_path.to_string(), std::sync::Arc::new(replacement));
            }
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        FileCache::new()
    }
}

/// Reads `canonical_path` plus any adjacent `.gz`/`.br` sibling files, runs
/// template expansion if `extension` is template-enabled, and returns the
/// fields needed to build a `FileCacheEntry`. Does not touch the cache lock
/// -- the caller inserts the result under the lock.
pub async fn load_from_disk(
    canonical_path: &Path,
    http_path: &str,
    extension: &str,
    template_extensions: &std::collections::HashSet<String>,
    start_delim: &str,
    end_delim: &str,
    root: &Path,
    logger: &Logger,
) -> Result<(FileCacheEntry, bool), HttpError> {
    let metadata = tokio::fs::metadata(canonical_path).await.map_err(HttpError::from)?;
    let mtime = metadata.modified().map_err(HttpError::from)?;

    #[cfg(unix)]
    if let Err(reason) = super::check_permissions(&metadata) {
        return Err(crate::error::ProtocolError::new(403, format!("file permissions reject this request: {}", reason)).into());
    }

    let mut file = tokio::fs::File::open(canonical_path).await.map_err(HttpError::from)?;
    let mut raw = Vec::with_capacity(metadata.len() as usize);
    file.read_to_end(&mut raw).await.map_err(HttpError::from)?;

    let uncompressed = if template_extensions.contains(extension) {
        super::template::expand(&raw, root, start_delim, end_delim, logger).await?
    } else {
        raw
    };

    let gzip = read_sibling(canonical_path, "gz").await;
    let brotli = read_sibling(canonical_path, "br").await;
    let had_precompressed_gzip = gzip.is_some();

    let entry = FileCacheEntry {
        canonical_path: canonical_path.to_path_buf(),
        http_path: http_path.to_string(),
        extension: extension.to_string(),
        mtime,
        uncompressed,
        gzip,
        brotli,
        hits: AtomicU64::new(0),
    };

    Ok((entry, had_precompressed_gzip))
}

async fn read_sibling(canonical_path: &Path, suffix: &str) -> Option<Vec<u8>> {
    let mut sibling = canonical_path.as_os_str().to_os_string();
    sibling.push(".");
    sibling.push(suffix);
    let mut file = tokio::fs::File::open(&sibling).await.ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await.ok()?;
    Some(bytes)
}

/// Gzip-compresses `data` at the default compression level.
pub fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to an in-memory encoder cannot fail");
    encoder.finish().expect("finishing an in-memory encoder cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_compress_round_trips_through_flate2_decoder() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let compressed = gzip_compress(data);
        assert!(compressed.len() < data.len());

        use flate2::read::GzDecoder;
        use std::io::Read;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn cache_reports_miss_when_nothing_stored() {
        let cache = FileCache::new();
        assert!(matches!(cache.check_freshness("/nope"), CacheStatus::Miss));
    }
}
