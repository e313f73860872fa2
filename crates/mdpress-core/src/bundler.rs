//! Final-stage bundler invocation
//!
//! Turns pipeline output (JSX text) into loadable module code. Batches
//! at or above the worker threshold run on the rayon pool; smaller
//! batches run single-threaded as one multi-entry pass. A pool failure
//! is signalled distinctly from per-file errors so the caller can retry
//! the same batch single-threaded.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

/// One entry of a bundling batch
#[derive(Debug, Clone)]
pub struct BundleInput {
    pub id: PathBuf,
    pub jsx: String,
}

/// Loadable module code, ready for the host's loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub code: String,
    pub map: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum BundleError {
    #[error("bundling failed: {0}")]
    Transform(String),
}

/// Strategy-level failure: the pool itself died, not any single file
#[derive(Debug, Error)]
#[error("worker pool failure: {0}")]
pub struct PoolFailure(pub String);

/// Per-file outcome within a batch
pub struct BundleResult {
    pub id: PathBuf,
    pub result: std::result::Result<BundleOutput, BundleError>,
}

/// Final-stage transform of one module
pub trait Bundler: Send + Sync {
    fn transform(&self, id: &Path, jsx: &str) -> std::result::Result<BundleOutput, BundleError>;
}

/// Default bundler: emits the finished ES module by appending the
/// default export to the wrapped JSX produced by the rendering step
pub struct JsxModuleEmitter;

impl Bundler for JsxModuleEmitter {
    fn transform(&self, _id: &Path, jsx: &str) -> std::result::Result<BundleOutput, BundleError> {
        let mut code = jsx.to_string();
        if !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str("\nexport default MDXContent;\n");
        Ok(BundleOutput { code, map: None })
    }
}

/// Which strategy a batch of the given size takes. Pure function so the
/// decision is testable apart from the execution.
pub fn select_strategy(batch_size: usize, threshold: usize) -> StrategyKind {
    if batch_size >= threshold {
        StrategyKind::Pooled
    } else {
        StrategyKind::SingleThread
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Pooled,
    SingleThread,
}

/// Bundle a whole batch, selecting the strategy by size and degrading
/// from the pool to single-threaded execution on pool failure
pub fn bundle_batch(
    bundler: &dyn Bundler,
    inputs: &[BundleInput],
    threshold: usize,
) -> Vec<BundleResult> {
    match select_strategy(inputs.len(), threshold) {
        StrategyKind::Pooled => {
            debug!("bundling {} modules on the worker pool", inputs.len());
            match run_pooled(bundler, inputs) {
                Ok(results) => results,
                Err(failure) => {
                    warn!("{failure}; retrying batch single-threaded");
                    run_single_threaded(bundler, inputs)
                }
            }
        }
        StrategyKind::SingleThread => {
            debug!("bundling {} modules single-threaded", inputs.len());
            run_single_threaded(bundler, inputs)
        }
    }
}

/// Pooled execution. Worker inputs and outputs are immutable values;
/// no shared state crosses the pool boundary. A panic anywhere in the
/// pool surfaces as a PoolFailure, never as a torn partial result.
fn run_pooled(
    bundler: &dyn Bundler,
    inputs: &[BundleInput],
) -> std::result::Result<Vec<BundleResult>, PoolFailure> {
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        inputs
            .par_iter()
            .map(|input| BundleResult {
                id: input.id.clone(),
                result: bundler.transform(&input.id, &input.jsx),
            })
            .collect()
    }))
    .map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string());
        PoolFailure(message)
    })
}

/// Single-threaded execution: one pass over all entries, amortizing
/// start-up across many small files
fn run_single_threaded(bundler: &dyn Bundler, inputs: &[BundleInput]) -> Vec<BundleResult> {
    inputs
        .iter()
        .map(|input| BundleResult {
            id: input.id.clone(),
            result: bundler.transform(&input.id, &input.jsx),
        })
        .collect()
}
