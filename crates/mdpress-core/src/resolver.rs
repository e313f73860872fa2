//! Per-file load resolver: the incremental path
//!
//! Services individual load requests from the host, checking cache
//! tiers top-down before falling through to on-demand single-file
//! compilation. Consulted even after the batch path ran, because a
//! serve-mode reload can target a file the batch never saw.

use std::path::Path;

use tracing::debug;

use crate::bundler::Bundler;
use crate::classifier;
use crate::compiler::{is_mdx, CompiledModule, CompilerService, FallbackCompiler, FileOptions};
use crate::errors::{LoadError, Result};
use crate::pipeline::{TransformContext, TransformPipeline};
use crate::session::{BuildSession, FinalizedOutput};
use crate::transforms;

pub struct LoadResolver<'a> {
    pub session: &'a mut BuildSession,
    pub compiler: &'a dyn CompilerService,
    pub fallback: &'a FallbackCompiler,
    pub pipeline: &'a TransformPipeline,
    pub bundler: &'a dyn Bundler,
}

impl<'a> LoadResolver<'a> {
    pub fn new(
        session: &'a mut BuildSession,
        compiler: &'a dyn CompilerService,
        fallback: &'a FallbackCompiler,
        pipeline: &'a TransformPipeline,
        bundler: &'a dyn Bundler,
    ) -> Self {
        Self {
            session,
            compiler,
            fallback,
            pipeline,
            bundler,
        }
    }

    /// Host load-hook entry point: accepts a virtual module id and
    /// round-trips it back to the source path
    pub fn load_virtual(&mut self, id: &str) -> Result<FinalizedOutput> {
        let path = crate::vmod::parse_virtual_id(id).ok_or_else(|| LoadError::InvalidVirtualId {
            id: id.to_string(),
        })?;
        self.load(&path)
    }

    /// Resolve one file to finalized module code.
    ///
    /// Tier order is fixed: fallback gate, finalized output, compiled
    /// module (per file kind), then full single-file compilation. A
    /// compile failure with a recoverable signature reclassifies the
    /// file as fallback and retries; anything else is a fatal load
    /// error naming the file.
    pub fn load(&mut self, path: &Path) -> Result<FinalizedOutput> {
        // 1. Designated fallback files bypass every other tier
        if self.session.is_fallback(path) {
            return self.load_via_fallback(path);
        }

        // 2. Finalized output: the fastest path
        if let Some(output) = self.session.caches.finalized.get(path) {
            debug!("finalized cache hit: {}", path.display());
            return Ok(output.clone());
        }

        // 3/4. Compiled-module tier for the file's kind
        let cached = if is_mdx(path) {
            self.session.caches.mdx.get(path).cloned()
        } else {
            self.session.caches.first_stage.get(path).cloned()
        };
        if let Some(module) = cached {
            debug!("module cache hit: {}", path.display());
            return self.finish(path, module);
        }

        // 5. Full miss: read, preprocess, re-classify, compile
        let (pre, _hash) = self.session.preprocessed_source(self.pipeline, path)?;

        // Preprocessing hooks can reveal patterns the batch-time scan
        // missed, so classify again
        let allowed = self.session.config.pipeline_options.allowed_imports.clone();
        let detection = classifier::detect(&pre, allowed.as_deref(), path);
        if detection.has_problematic_patterns {
            let reason = detection.reason.unwrap_or_else(|| "unknown".to_string());
            self.session.mark_fallback(path, reason);
            return self.load_via_fallback(path);
        }

        let options = FileOptions {
            source_map: self.session.config.pipeline_options.source_map,
        };
        match self.compiler.compile_one(&pre, path, &options) {
            Ok(module) => {
                if is_mdx(path) {
                    self.session.stats.compiled_mdx += 1;
                    self.session
                        .caches
                        .mdx
                        .insert(path.to_path_buf(), module.clone());
                } else {
                    self.session.stats.compiled_first_stage += 1;
                    self.session
                        .caches
                        .first_stage
                        .insert(path.to_path_buf(), module.clone());
                }
                self.finish(path, module)
            }
            Err(e) if e.is_recoverable() => {
                debug!(
                    "recoverable compile failure for {}, rerouting to fallback: {}",
                    path.display(),
                    e
                );
                self.session.mark_fallback(path, e.to_string());
                self.load_via_fallback(path)
            }
            Err(e) => Err(LoadError::Compile {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Pipeline + bundle a compiled module and record the finalized
    /// output
    fn finish(&mut self, path: &Path, module: CompiledModule) -> Result<FinalizedOutput> {
        let source = self
            .session
            .caches
            .preprocessed
            .get(path)
            .cloned()
            .unwrap_or_default();

        let ctx = TransformContext {
            code: module.code,
            source,
            filename: path.to_path_buf(),
            frontmatter: module.frontmatter,
            headings: module.headings,
            registry: self.session.registry.clone(),
            config: self.session.config.clone(),
        };

        let ctx = self.pipeline.run(ctx).map_err(|e| LoadError::Transform {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let output = self
            .bundler
            .transform(path, &ctx.code)
            .map_err(|e| LoadError::Bundle {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let finalized = FinalizedOutput {
            code: output.code,
            map: output.map,
        };
        if let Some(hash) = self.session.caches.content_hashes.get(path).cloned() {
            if let Some(disk) = self.session.disk_cache() {
                disk.set(path, &hash, &finalized.code, finalized.map.as_deref());
            }
        }
        self.session
            .caches
            .finalized
            .insert(path.to_path_buf(), finalized.clone());
        self.session.stats.processed += 1;
        Ok(finalized)
    }

    /// Compile via the permissive path. The result is returned
    /// directly, never written into the upper tiers: fallback
    /// membership and finalized-cache membership are mutually
    /// exclusive.
    fn load_via_fallback(&mut self, path: &Path) -> Result<FinalizedOutput> {
        let (pre, _hash) = self.session.preprocessed_source(self.pipeline, path)?;
        let module = self.fallback.compile(&pre, path);
        let wrapped = transforms::wrap_module(&module.code, &module.frontmatter, &module.headings);

        let output = self
            .bundler
            .transform(path, &wrapped)
            .map_err(|e| LoadError::Bundle {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(FinalizedOutput {
            code: output.code,
            map: output.map,
        })
    }
}
