//! Build-pass orchestrator: the batch path
//!
//! Coordinates discovery, classification, the disk cache, batch
//! compilation, the transform pipeline, and bundling for one build
//! pass, then persists the in-memory caches so a later pass of the
//! same invocation restores them without any file I/O.
//!
//! Parallel stages produce immutable per-file results that are merged
//! into the session caches on the orchestrating thread; no cache map is
//! ever written from two paths at once.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::bundler::{bundle_batch, BundleInput, Bundler};
use crate::cache::content_hash;
use crate::classifier;
use crate::compiler::{
    is_mdx, BatchInput, BatchOptions, BatchOutcome, CompiledModule, CompilerService,
};
use crate::discovery;
use crate::pipeline::{TransformContext, TransformPipeline};
use crate::session::{BuildMode, BuildSession, FinalizedOutput};
use crate::stats::PhaseTimer;

/// What one pass did, for logging and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub pass: u32,
    /// Pass ≥ 2 short-circuit: caches restored, nothing recompiled
    pub restored: bool,
    pub discovered: usize,
    pub disk_hits: usize,
    pub compiled: usize,
    pub fallback: usize,
    pub bundled: usize,
}

/// Per-file result of the parallel read-and-classify stage
enum Classified {
    Fallback { path: PathBuf, reason: String },
    Ready { path: PathBuf, raw: String, pre: String, hash: String },
    Failed { path: PathBuf },
}

pub struct BuildOrchestrator<'a> {
    pub session: &'a mut BuildSession,
    pub compiler: &'a dyn CompilerService,
    pub pipeline: &'a TransformPipeline,
    pub bundler: &'a dyn Bundler,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(
        session: &'a mut BuildSession,
        compiler: &'a dyn CompilerService,
        pipeline: &'a TransformPipeline,
        bundler: &'a dyn Bundler,
    ) -> Self {
        Self {
            session,
            compiler,
            pipeline,
            bundler,
        }
    }

    /// Run one build pass over the content tree
    pub fn run_pass(&mut self, content_root: &Path) -> PassSummary {
        let pass = self.session.begin_pass();
        let mut summary = PassSummary {
            pass,
            ..Default::default()
        };

        if pass == 1 {
            let preloaded = self.session.init_disk_cache(content_root);
            if preloaded > 0 {
                info!("preloaded {preloaded} disk cache entries");
            }
        }

        // Sound only because sources are immutable within an invocation
        if pass >= 2 && self.session.restore_persisted() {
            summary.restored = true;
            summary.fallback = self.session.caches.fallback.len();
            summary.bundled = self.session.caches.finalized.len();
            return summary;
        }

        let timer = PhaseTimer::start("discover");
        let files = discovery::discover_files(
            content_root,
            &self.session.config.include,
            &self.session.config.exclude,
        );
        timer.stop(&mut self.session.stats);
        summary.discovered = files.len();
        info!("pass {pass}: discovered {} source file(s)", files.len());

        let queue = self.read_and_classify(&files, &mut summary);
        self.batch_compile(queue, &mut summary);
        let bundle_inputs = self.run_pipeline();
        self.bundle_and_persist(bundle_inputs, &mut summary);

        // One-shot builds reclaim entries for files deleted or renamed
        // since the cache was written; a serve session keeps them, the
        // file may come back
        if self.session.mode == BuildMode::Build {
            let valid: rustc_hash::FxHashSet<PathBuf> = files.iter().cloned().collect();
            if let Some(disk) = self.session.disk_cache() {
                if disk.cleanup(&valid) > 0 {
                    disk.flush();
                }
            }
        }

        self.session.persist();
        summary.fallback = self.session.caches.fallback.len();

        self.session.stats.log_summary();
        if self.session.toggles.timing {
            self.session.stats.log_timings();
        }
        if let Some(stats_file) = self.session.toggles.stats_file.clone() {
            self.session.stats.write_to_file(&stats_file);
        }

        summary
    }

    /// Step 4: read, preprocess, and classify all discovered files in
    /// parallel, then consult the disk cache sequentially. Returns the
    /// paths queued for batch compilation.
    fn read_and_classify(&mut self, files: &[PathBuf], summary: &mut PassSummary) -> Vec<PathBuf> {
        let timer = PhaseTimer::start("classify");

        let fs = self.session.fs.clone();
        let pipeline = self.pipeline;
        let allowed = self.session.config.pipeline_options.allowed_imports.clone();

        let classified: Vec<Classified> = files
            .par_iter()
            .map(|path| {
                let raw = match fs.read_file(path) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("skipping unreadable file {}: {}", path.display(), e);
                        return Classified::Failed { path: path.clone() };
                    }
                };
                let pre = match pipeline.run_preprocess(raw.clone(), path) {
                    Ok(pre) => pre,
                    Err(e) => {
                        error!("preprocess failed for {}: {}", path.display(), e);
                        return Classified::Failed { path: path.clone() };
                    }
                };
                let detection = classifier::detect(&pre, allowed.as_deref(), path);
                if detection.has_problematic_patterns {
                    Classified::Fallback {
                        path: path.clone(),
                        reason: detection.reason.unwrap_or_else(|| "unknown".to_string()),
                    }
                } else {
                    let hash = content_hash(&pre);
                    Classified::Ready {
                        path: path.clone(),
                        raw,
                        pre,
                        hash,
                    }
                }
            })
            .collect();

        let mut queue = Vec::new();
        for item in classified {
            match item {
                Classified::Fallback { path, reason } => {
                    self.session.mark_fallback(&path, reason);
                }
                Classified::Failed { .. } => {}
                Classified::Ready { path, raw, pre, hash } => {
                    self.session.caches.raw_source.insert(path.clone(), raw);
                    self.session
                        .caches
                        .preprocessed
                        .insert(path.clone(), pre);
                    self.session
                        .caches
                        .content_hashes
                        .insert(path.clone(), hash.clone());

                    let disk_hit = self
                        .session
                        .disk_cache()
                        .and_then(|disk| disk.get(&path, &hash));
                    match disk_hit {
                        Some(entry) => {
                            debug!("disk cache hit: {}", path.display());
                            self.session.caches.finalized.insert(
                                path,
                                FinalizedOutput {
                                    code: entry.code,
                                    map: entry.map,
                                },
                            );
                            self.session.stats.disk_hits += 1;
                            self.session.stats.processed += 1;
                            summary.disk_hits += 1;
                        }
                        None => queue.push(path),
                    }
                }
            }
        }

        timer.stop(&mut self.session.stats);
        queue
    }

    /// Step 5: partition the queue by file kind and invoke the external
    /// compiler once per group. A per-file failure reroutes that file
    /// to fallback; a failure of the invocation itself skips the whole
    /// batch step with a warning (per-file loads still work later).
    fn batch_compile(&mut self, queue: Vec<PathBuf>, summary: &mut PassSummary) {
        if queue.is_empty() {
            return;
        }
        let timer = PhaseTimer::start("compile");

        let (mdx_paths, md_paths): (Vec<PathBuf>, Vec<PathBuf>) =
            queue.into_iter().partition(|p| is_mdx(p));

        let options = BatchOptions {
            continue_on_error: true,
        };

        for (paths, label) in [(md_paths, "first-stage"), (mdx_paths, "mdx")] {
            if paths.is_empty() {
                continue;
            }

            let inputs: Vec<BatchInput> = paths
                .iter()
                .map(|path| BatchInput {
                    id: path.clone(),
                    source: self
                        .session
                        .caches
                        .preprocessed
                        .get(path)
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect();

            let outcome = if label == "mdx" {
                self.compiler.compile_many_mdx(&inputs, &options)
            } else {
                self.compiler.compile_many_first_stage(&inputs, &options)
            };

            match outcome {
                Ok(outcome) => self.merge_batch_outcome(outcome, label, summary),
                Err(e) => {
                    warn!("{label} compiler unavailable, skipping batch compile: {e}");
                }
            }
        }

        timer.stop(&mut self.session.stats);
    }

    fn merge_batch_outcome(
        &mut self,
        outcome: BatchOutcome,
        label: &str,
        summary: &mut PassSummary,
    ) {
        debug!(
            "{label} batch: {} ok, {} failed",
            outcome.stats.succeeded, outcome.stats.failed
        );
        for item in outcome.results {
            match item.result {
                Ok(module) => {
                    summary.compiled += 1;
                    if label == "mdx" {
                        self.session.stats.compiled_mdx += 1;
                        self.session.caches.mdx.insert(item.id, module);
                    } else {
                        self.session.stats.compiled_first_stage += 1;
                        self.session.caches.first_stage.insert(item.id, module);
                    }
                }
                Err(e) => {
                    self.session.mark_fallback(&item.id, e.to_string());
                }
            }
        }
    }

    /// Step 6: run every newly compiled module through the transform
    /// pipeline, in bounded-size chunks processed concurrently within a
    /// chunk. A hook failure drops that file from the batch with an
    /// error; the per-file resolver will surface it to the host.
    fn run_pipeline(&mut self) -> Vec<BundleInput> {
        let jobs: Vec<(PathBuf, CompiledModule, String)> = self
            .session
            .caches
            .first_stage
            .iter()
            .chain(self.session.caches.mdx.iter())
            .filter(|(path, _)| !self.session.caches.finalized.contains_key(*path))
            .map(|(path, module)| {
                let source = self
                    .session
                    .caches
                    .preprocessed
                    .get(path)
                    .cloned()
                    .unwrap_or_default();
                (path.clone(), module.clone(), source)
            })
            .collect();

        if jobs.is_empty() {
            return Vec::new();
        }
        let timer = PhaseTimer::start("pipeline");

        let registry = self.session.registry.clone();
        let config = self.session.config.clone();
        let pipeline = self.pipeline;
        let chunk_size = config.pipeline_options.chunk_size.max(1);

        let mut inputs = Vec::with_capacity(jobs.len());
        for chunk in jobs.chunks(chunk_size) {
            let processed: Vec<(PathBuf, Result<TransformContext, String>)> = chunk
                .par_iter()
                .map(|(path, module, source)| {
                    let ctx = TransformContext {
                        code: module.code.clone(),
                        source: source.clone(),
                        filename: path.clone(),
                        frontmatter: module.frontmatter.clone(),
                        headings: module.headings.clone(),
                        registry: registry.clone(),
                        config: config.clone(),
                    };
                    (path.clone(), pipeline.run(ctx).map_err(|e| e.to_string()))
                })
                .collect();

            for (path, result) in processed {
                match result {
                    Ok(ctx) => inputs.push(BundleInput {
                        id: path,
                        jsx: ctx.code,
                    }),
                    Err(message) => {
                        error!("pipeline failed for {}: {}", path.display(), message);
                    }
                }
            }
        }

        timer.stop(&mut self.session.stats);
        inputs
    }

    /// Steps 7-8: bundle all pipeline outputs as one batch, populate
    /// the finalized cache, and persist new entries to the disk cache
    fn bundle_and_persist(&mut self, inputs: Vec<BundleInput>, summary: &mut PassSummary) {
        if inputs.is_empty() {
            if let Some(disk) = self.session.disk_cache() {
                disk.flush();
            }
            return;
        }
        let timer = PhaseTimer::start("bundle");

        let threshold = self.session.config.pipeline_options.worker_threshold;
        let results = bundle_batch(self.bundler, &inputs, threshold);

        let mut to_persist: Vec<(PathBuf, String, String, Option<String>)> = Vec::new();
        for item in results {
            match item.result {
                Ok(output) => {
                    if let Some(hash) = self.session.caches.content_hashes.get(&item.id) {
                        to_persist.push((
                            item.id.clone(),
                            hash.clone(),
                            output.code.clone(),
                            output.map.clone(),
                        ));
                    }
                    self.session.caches.finalized.insert(
                        item.id,
                        FinalizedOutput {
                            code: output.code,
                            map: output.map,
                        },
                    );
                    self.session.stats.processed += 1;
                    summary.bundled += 1;
                }
                Err(e) => {
                    warn!("bundling failed for {}: {}", item.id.display(), e);
                }
            }
        }

        if let Some(disk) = self.session.disk_cache() {
            for (path, hash, code, map) in &to_persist {
                disk.set(path, hash, code, map.as_deref());
            }
            disk.flush();
        }

        timer.stop(&mut self.session.stats);
    }
}
