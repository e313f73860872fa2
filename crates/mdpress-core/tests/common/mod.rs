//! Shared test doubles for the integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use mdpress_core::compiler::{
    BatchInput, BatchOptions, BatchOutcome, BatchResult, CompileError, CompileStats,
    CompiledModule, CompilerService, DirectiveBlocks, FileOptions,
};

/// Scriptable compiler service: counts invocations and fails the paths
/// it is told to fail
pub struct MockCompiler {
    invocations: AtomicUsize,
    failures: Mutex<Vec<(PathBuf, CompileError)>>,
    unavailable: bool,
}

impl MockCompiler {
    pub fn new() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            unavailable: false,
        }
    }

    /// A compiler whose binding could not be loaded at all
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn fail_path(self, path: impl Into<PathBuf>, error: CompileError) -> Self {
        self.failures.lock().unwrap().push((path.into(), error));
        self
    }

    /// Number of per-file compilations performed (batch items included)
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn compile(&self, source: &str, path: &Path) -> Result<CompiledModule, CompileError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some((_, error)) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| p == path)
        {
            return Err(error.clone());
        }
        Ok(CompiledModule {
            code: format!("<article>{source}</article>"),
            frontmatter: "{}".to_string(),
            headings: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    fn compile_many(
        &self,
        inputs: &[BatchInput],
        options: &BatchOptions,
    ) -> Result<BatchOutcome, CompileError> {
        if self.unavailable {
            return Err(CompileError::Unavailable("binding not loaded".to_string()));
        }

        let mut outcome = BatchOutcome::default();
        outcome.stats.total = inputs.len();
        for input in inputs {
            let result = self.compile(&input.source, &input.id);
            match &result {
                Ok(_) => outcome.stats.succeeded += 1,
                Err(e) => {
                    if !options.continue_on_error {
                        return Err(e.clone());
                    }
                    outcome.stats.failed += 1;
                }
            }
            outcome.results.push(BatchResult {
                id: input.id.clone(),
                result,
            });
        }
        Ok(outcome)
    }
}

impl CompilerService for MockCompiler {
    fn compile_one(
        &self,
        source: &str,
        path: &Path,
        _options: &FileOptions,
    ) -> Result<CompiledModule, CompileError> {
        if self.unavailable {
            return Err(CompileError::Unavailable("binding not loaded".to_string()));
        }
        self.compile(source, path)
    }

    fn compile_many_first_stage(
        &self,
        inputs: &[BatchInput],
        options: &BatchOptions,
    ) -> Result<BatchOutcome, CompileError> {
        self.compile_many(inputs, options)
    }

    fn compile_many_mdx(
        &self,
        inputs: &[BatchInput],
        options: &BatchOptions,
    ) -> Result<BatchOutcome, CompileError> {
        self.compile_many(inputs, options)
    }

    fn parse_directive_blocks(&self, _source: &str) -> Result<DirectiveBlocks, CompileError> {
        if self.unavailable {
            return Err(CompileError::Unavailable("binding not loaded".to_string()));
        }
        Ok(DirectiveBlocks::default())
    }
}

/// Stats shape sanity check used by a couple of suites
pub fn assert_stats_total(stats: &CompileStats) {
    assert_eq!(stats.total, stats.succeeded + stats.failed);
}
