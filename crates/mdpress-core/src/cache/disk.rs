use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use super::{
    CacheManifest, DiskCacheEntry, CACHE_VERSION, ENTRIES_DIR_NAME, MANIFEST_FILE_NAME,
};

/// Cross-invocation disk cache
///
/// Layout: a root directory holding `manifest.json` plus an `entries/`
/// subdirectory of per-file JSON blobs named by content hash. The
/// manifest is the index; an entry is valid only while the manifest
/// record's hash matches the current content hash of the source.
///
/// Every failure mode degrades instead of erroring: an unreadable cache
/// directory disables the cache for the rest of the process, a write
/// failure loses persistence for that entry, and a manifest record whose
/// backing blob disappeared self-heals into a miss.
pub struct DiskCache {
    cache_dir: PathBuf,
    entries_dir: PathBuf,
    manifest_path: PathBuf,
    manifest: CacheManifest,
    /// In-memory shadow of entry blobs keyed by content hash,
    /// populated lazily by get() and in bulk by preload_entries()
    shadow: FxHashMap<String, DiskCacheEntry>,
    /// Manifest has in-memory changes not yet flushed to disk
    dirty: bool,
    enabled: bool,
}

impl DiskCache {
    /// Open (or create) the cache rooted at `cache_dir`.
    ///
    /// Idempotent: opening an existing cache loads its manifest; opening
    /// twice in a row yields the same state. A manifest written by a
    /// different format version wipes the whole directory and starts
    /// empty. If the directory cannot be created or read the returned
    /// cache is disabled: every get is a miss, every set a no-op.
    pub fn init(cache_dir: &Path) -> Self {
        let entries_dir = cache_dir.join(ENTRIES_DIR_NAME);
        let manifest_path = cache_dir.join(MANIFEST_FILE_NAME);

        let mut cache = Self {
            cache_dir: cache_dir.to_path_buf(),
            entries_dir,
            manifest_path,
            manifest: CacheManifest::new(),
            shadow: FxHashMap::default(),
            dirty: false,
            enabled: true,
        };

        if let Err(e) = cache.open() {
            warn!(
                "disk cache disabled: failed to initialize {}: {}",
                cache_dir.display(),
                e
            );
            cache.enabled = false;
        }

        cache
    }

    /// A permanently disabled cache (used when the config turns
    /// persistence off)
    pub fn disabled() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            entries_dir: PathBuf::new(),
            manifest_path: PathBuf::new(),
            manifest: CacheManifest::new(),
            shadow: FxHashMap::default(),
            dirty: false,
            enabled: false,
        }
    }

    fn open(&mut self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.entries_dir)?;

        if !self.manifest_path.exists() {
            info!("no cache manifest found, creating new");
            self.manifest = CacheManifest::new();
            self.write_manifest()?;
            return Ok(());
        }

        let json = std::fs::read_to_string(&self.manifest_path)?;
        match CacheManifest::from_json(&json) {
            Ok(manifest) if manifest.is_version_compatible() => {
                info!("loaded cache manifest with {} entries", manifest.entries.len());
                self.manifest = manifest;
                Ok(())
            }
            Ok(manifest) => {
                warn!(
                    "cache version mismatch: expected {}, found {}; wiping cache",
                    CACHE_VERSION, manifest.version
                );
                self.wipe()
            }
            Err(e) => {
                warn!("corrupted cache manifest: {}; wiping cache", e);
                self.wipe()
            }
        }
    }

    /// Delete the cache directory and reinitialize empty
    fn wipe(&mut self) -> std::io::Result<()> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)?;
        }
        std::fs::create_dir_all(&self.entries_dir)?;
        self.manifest = CacheManifest::new();
        self.shadow.clear();
        self.dirty = false;
        self.write_manifest()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn entry_count(&self) -> usize {
        self.manifest.entries.len()
    }

    /// Hash recorded in the manifest for a path, if any
    pub fn stored_hash(&self, path: &Path) -> Option<&str> {
        self.manifest.get(&path_key(path)).map(|r| r.hash.as_str())
    }

    /// Iterate manifest records as (path, hash) pairs
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.manifest
            .entries
            .iter()
            .map(|(path, record)| (path.as_str(), record.hash.as_str()))
    }

    /// Bulk warm step: read every entry blob in parallel, keep the ones
    /// the manifest still references, and populate the shadow map.
    /// Best-effort; unreadable entries are skipped. Returns the number
    /// of entries loaded.
    pub fn preload_entries(&mut self) -> usize {
        if !self.enabled {
            return 0;
        }

        let files: Vec<PathBuf> = match std::fs::read_dir(&self.entries_dir) {
            Ok(iter) => iter
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
                .collect(),
            Err(e) => {
                warn!("failed to list cache entries: {}", e);
                return 0;
            }
        };

        let loaded: Vec<DiskCacheEntry> = files
            .par_iter()
            .filter_map(|path| {
                let json = std::fs::read_to_string(path).ok()?;
                DiskCacheEntry::from_json(&json).ok()
            })
            .collect();

        let mut count = 0;
        for entry in loaded {
            if self.manifest.references_hash(&entry.content_hash) {
                self.shadow.insert(entry.content_hash.clone(), entry);
                count += 1;
            }
        }

        debug!("preloaded {} cache entries", count);
        count
    }

    /// Look up the entry for `path`, valid only if the manifest record's
    /// hash equals `hash`. A manifest record whose backing blob is gone
    /// is pruned and reported as a miss.
    pub fn get(&mut self, path: &Path, hash: &str) -> Option<DiskCacheEntry> {
        if !self.enabled {
            return None;
        }

        let key = path_key(path);
        let record = self.manifest.get(&key)?;
        if record.hash != hash {
            return None;
        }

        if let Some(entry) = self.shadow.get(hash) {
            return Some(entry.clone());
        }

        let entry_path = self.entry_path(hash);
        if !entry_path.exists() {
            warn!("cache blob missing for {}, pruning stale record", key);
            self.manifest.remove(&key);
            self.dirty = true;
            return None;
        }

        match std::fs::read_to_string(&entry_path) {
            Ok(json) => match DiskCacheEntry::from_json(&json) {
                Ok(entry) => {
                    self.shadow.insert(hash.to_string(), entry.clone());
                    Some(entry)
                }
                Err(e) => {
                    warn!("corrupted cache blob for {}: {}", key, e);
                    None
                }
            },
            Err(e) => {
                warn!("failed to read cache blob for {}: {}", key, e);
                None
            }
        }
    }

    /// Persist one entry. Writes the blob atomically (temp then rename)
    /// and updates the manifest in memory; the manifest itself is only
    /// written by flush(). Write failures degrade to "no persistence"
    /// with a warning.
    pub fn set(&mut self, path: &Path, hash: &str, code: &str, map: Option<&str>) {
        if !self.enabled {
            return;
        }

        let entry = DiskCacheEntry::new(
            hash.to_string(),
            code.to_string(),
            map.map(|s| s.to_string()),
        );

        if let Err(e) = self.write_entry(hash, &entry) {
            warn!("failed to persist cache entry for {}: {}", path.display(), e);
            return;
        }

        self.manifest.insert(path_key(path), hash.to_string());
        self.shadow.insert(hash.to_string(), entry);
        self.dirty = true;
    }

    /// Persist a batch of `(path, hash, code, map)` entries
    pub fn set_batch<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (&'a Path, &'a str, &'a str, Option<&'a str>)>,
    {
        for (path, hash, code, map) in entries {
            self.set(path, hash, code, map);
        }
    }

    /// Persist the manifest if it has unflushed changes
    pub fn flush(&mut self) {
        if !self.enabled || !self.dirty {
            return;
        }

        match self.write_manifest() {
            Ok(()) => self.dirty = false,
            Err(e) => warn!("failed to flush cache manifest: {}", e),
        }
    }

    /// Drop manifest records (and unreferenced backing blobs) for any
    /// path not in `valid_paths`. Returns the number of records removed.
    pub fn cleanup(&mut self, valid_paths: &FxHashSet<PathBuf>) -> usize {
        if !self.enabled {
            return 0;
        }

        let valid_keys: FxHashSet<String> = valid_paths.iter().map(|p| path_key(p)).collect();

        let stale: Vec<String> = self
            .manifest
            .entries
            .keys()
            .filter(|key| !valid_keys.contains(*key))
            .cloned()
            .collect();

        let mut removed_hashes = Vec::new();
        for key in &stale {
            if let Some(record) = self.manifest.remove(key) {
                removed_hashes.push(record.hash);
            }
        }

        // Blobs are content-addressed and may be shared by several
        // paths; only delete blobs nothing references anymore.
        for hash in removed_hashes {
            if !self.manifest.references_hash(&hash) {
                let _ = std::fs::remove_file(self.entry_path(&hash));
                self.shadow.remove(&hash);
            }
        }

        if !stale.is_empty() {
            self.dirty = true;
            info!("cleaned up {} stale cache entries", stale.len());
        }
        stale.len()
    }

    /// Delete the entire cache directory and reinitialize empty
    pub fn clear(&mut self) {
        if !self.enabled {
            return;
        }

        if let Err(e) = self.wipe() {
            warn!("disk cache disabled: failed to clear: {}", e);
            self.enabled = false;
        } else {
            info!("cache cleared");
        }
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.entries_dir.join(format!("{hash}.json"))
    }

    fn write_entry(&self, hash: &str, entry: &DiskCacheEntry) -> std::io::Result<()> {
        let json = entry
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        let final_path = self.entry_path(hash);
        let tmp_path = self.entries_dir.join(format!("{hash}.json.tmp"));
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &final_path)
    }

    fn write_manifest(&self) -> std::io::Result<()> {
        let json = self
            .manifest
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        let tmp_path = self.cache_dir.join(format!("{MANIFEST_FILE_NAME}.tmp"));
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.manifest_path)
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
