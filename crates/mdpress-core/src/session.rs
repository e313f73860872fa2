//! Build session: the owner of all per-invocation mutable state
//!
//! One session lives for one build invocation (which may span several
//! build passes). Every cache tier is an explicit field here, passed
//! to the orchestrator and resolver by reference; nothing is static.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cache::{content_hash, DiskCache};
use crate::compiler::CompiledModule;
use crate::config::{EnvToggles, PipelineConfig};
use crate::errors::LoadError;
use crate::fs::FileSystem;
use crate::pipeline::TransformPipeline;
use crate::registry::ComponentRegistry;
use crate::stats::BuildStats;

/// Whether the invocation is a one-shot build or a long-lived dev serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Build,
    Serve,
}

/// Terminal cache tier: fully bundled module code for the host's loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedOutput {
    pub code: String,
    pub map: Option<String>,
}

/// The in-memory cache tiers, scoped to one build invocation
///
/// `fallback` membership and the upper tiers are mutually exclusive:
/// marking a file fallback evicts it everywhere else, and the resolver
/// checks the fallback gate first.
#[derive(Default, Clone)]
pub struct TieredCaches {
    pub raw_source: FxHashMap<PathBuf, String>,
    pub preprocessed: FxHashMap<PathBuf, String>,
    pub content_hashes: FxHashMap<PathBuf, String>,
    /// Output of the first-stage compiler
    pub first_stage: FxHashMap<PathBuf, CompiledModule>,
    /// Output of the second-stage (MDX) compiler
    pub mdx: FxHashMap<PathBuf, CompiledModule>,
    pub finalized: FxHashMap<PathBuf, FinalizedOutput>,
    /// Files routed to the permissive compiler, with reasons
    pub fallback: FxHashMap<PathBuf, String>,
}

impl TieredCaches {
    pub fn is_empty(&self) -> bool {
        self.finalized.is_empty()
            && self.first_stage.is_empty()
            && self.mdx.is_empty()
            && self.fallback.is_empty()
    }
}

pub struct BuildSession {
    pub config: Arc<PipelineConfig>,
    pub toggles: EnvToggles,
    pub registry: Arc<ComponentRegistry>,
    pub fs: Arc<dyn FileSystem>,
    pub mode: BuildMode,
    pub stats: BuildStats,
    pub caches: TieredCaches,
    /// Snapshot carried between passes of the same invocation
    persisted: TieredCaches,
    pass: u32,
    disk: Option<DiskCache>,
}

impl BuildSession {
    pub fn new(
        config: PipelineConfig,
        toggles: EnvToggles,
        fs: Arc<dyn FileSystem>,
        mode: BuildMode,
    ) -> Self {
        let registry = Arc::new(ComponentRegistry::new(config.registry.clone()));
        Self {
            config: Arc::new(config),
            toggles,
            registry,
            fs,
            mode,
            stats: BuildStats::new(),
            caches: TieredCaches::default(),
            persisted: TieredCaches::default(),
            pass: 0,
            disk: None,
        }
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Start a new build pass; returns the new pass number
    pub fn begin_pass(&mut self) -> u32 {
        self.pass += 1;
        debug!("starting build pass {}", self.pass);
        self.pass
    }

    /// Lazily construct the disk cache. Safe to call every pass; only
    /// the first call does work. Returns the number of preloaded
    /// entries.
    pub fn init_disk_cache(&mut self, content_root: &Path) -> usize {
        if self.disk.is_some() {
            return 0;
        }

        if !self.toggles.cache_enabled(&self.config) {
            self.disk = Some(DiskCache::disabled());
            return 0;
        }

        let mut cache = DiskCache::init(&self.config.cache_dir(content_root));
        let preloaded = cache.preload_entries();
        self.disk = Some(cache);
        preloaded
    }

    pub fn disk_cache(&mut self) -> Option<&mut DiskCache> {
        self.disk.as_mut()
    }

    /// Restore the caches persisted by a previous pass. Sound because
    /// the build tool guarantees sources do not change between passes
    /// of one invocation; no file is re-read or re-hashed. Returns
    /// false when there is nothing to restore.
    pub fn restore_persisted(&mut self) -> bool {
        if self.persisted.is_empty() {
            return false;
        }
        self.caches = self.persisted.clone();
        debug!(
            "pass {}: restored {} finalized, {} fallback entries from previous pass",
            self.pass,
            self.caches.finalized.len(),
            self.caches.fallback.len()
        );
        true
    }

    /// Snapshot the active caches for the next pass
    pub fn persist(&mut self) {
        self.persisted = self.caches.clone();
    }

    /// Route a file to the permissive compiler for the rest of the
    /// invocation, evicting it from every upper tier
    pub fn mark_fallback(&mut self, path: &Path, reason: String) {
        self.caches.first_stage.remove(path);
        self.caches.mdx.remove(path);
        self.caches.finalized.remove(path);
        self.stats.record_fallback(path.to_path_buf(), reason.clone());
        self.caches.fallback.insert(path.to_path_buf(), reason);
    }

    pub fn is_fallback(&self, path: &Path) -> bool {
        self.caches.fallback.contains_key(path)
    }

    /// Drop a file from every tier (host watcher hook for changed or
    /// deleted files in serve mode)
    pub fn invalidate(&mut self, path: &Path) {
        self.caches.raw_source.remove(path);
        self.caches.preprocessed.remove(path);
        self.caches.content_hashes.remove(path);
        self.caches.first_stage.remove(path);
        self.caches.mdx.remove(path);
        self.caches.finalized.remove(path);
        self.caches.fallback.remove(path);
    }

    /// Preprocessed source and content hash for a file, reading and
    /// preprocessing at most once per invocation
    pub fn preprocessed_source(
        &mut self,
        pipeline: &TransformPipeline,
        path: &Path,
    ) -> crate::errors::Result<(String, String)> {
        if let Some(pre) = self.caches.preprocessed.get(path) {
            let hash = self
                .caches
                .content_hashes
                .get(path)
                .cloned()
                .unwrap_or_else(|| content_hash(pre));
            return Ok((pre.clone(), hash));
        }

        let raw = match self.caches.raw_source.get(path) {
            Some(raw) => raw.clone(),
            None => {
                let raw = self.fs.read_file(path).map_err(|source| LoadError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                self.caches.raw_source.insert(path.to_path_buf(), raw.clone());
                raw
            }
        };

        let pre = pipeline
            .run_preprocess(raw, path)
            .map_err(|e| LoadError::Transform {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let hash = content_hash(&pre);

        self.caches.preprocessed.insert(path.to_path_buf(), pre.clone());
        self.caches.content_hashes.insert(path.to_path_buf(), hash.clone());
        Ok((pre, hash))
    }
}
