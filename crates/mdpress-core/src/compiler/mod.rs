//! Boundary to the external Markdown/MDX compiler service
//!
//! The first-stage and MDX compilers are native services reached
//! through the `CompilerService` trait; this crate never links them.
//! The permissive fallback compiler lives in `fallback` and is in-repo.

mod fallback;

pub use fallback::FallbackCompiler;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A heading extracted from a compiled document, in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub depth: u8,
    pub slug: String,
    pub text: String,
}

/// Output of one compiler invocation on one source file.
/// Never mutated after creation; transforms produce new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    /// Generated JSX text
    pub code: String,
    /// Frontmatter serialized as JSON
    pub frontmatter: String,
    pub headings: Vec<Heading>,
    pub diagnostics: Vec<String>,
}

/// Per-file options forwarded to the compiler
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub source_map: bool,
}

/// One input to a bulk compile call
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub id: PathBuf,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// A per-file failure yields a per-file error result instead of
    /// aborting the batch
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
        }
    }
}

/// Per-file result within a batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub id: PathBuf,
    pub result: std::result::Result<CompiledModule, CompileError>,
}

#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Outcome of a bulk compile call
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<BatchResult>,
    pub stats: CompileStats,
}

/// Errors raised at the compiler boundary
///
/// The typed variants cover the failure classes the service is known to
/// produce; `Other` carries verbatim messages from the binding and is
/// classified by the substring shim below.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("compiler returned no output")]
    EmptyOutput,

    #[error("missing property in compiler result: {0}")]
    MissingProperty(String),

    #[error("compiler service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl CompileError {
    /// Whether this failure should reroute the file to the permissive
    /// compiler instead of failing the load
    pub fn is_recoverable(&self) -> bool {
        match self {
            CompileError::Parse(_)
            | CompileError::Transform(_)
            | CompileError::EmptyOutput
            | CompileError::MissingProperty(_)
            | CompileError::Unavailable(_) => true,
            CompileError::Other(message) => is_recoverable_message(message),
        }
    }
}

/// Compatibility shim: the historical allowlist of message substrings
/// that identify a recoverable compiler failure. Services that predate
/// the typed variants report everything as `Other`, so their messages
/// are matched verbatim against this list.
pub fn is_recoverable_message(message: &str) -> bool {
    const RECOVERABLE: &[&str] = &[
        "parse error",
        "unexpected token",
        "transform failed",
        "compiler returned undefined",
        "cannot read propert",
        "undefined is not an object",
    ];

    let lower = message.to_lowercase();
    RECOVERABLE.iter().any(|needle| lower.contains(needle))
}

/// A directive block surfaced by the service's structural parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveBlock {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct DirectiveBlocks {
    pub blocks: Vec<DirectiveBlock>,
    pub headings: Vec<Heading>,
}

/// External compiler service
///
/// Calls are synchronous from the caller's perspective; the service may
/// be backed by a separate runtime or process. Batch calls honor
/// `continue_on_error`: an `Err` from the call itself means the binding
/// is unusable and the whole batch step should be skipped.
pub trait CompilerService: Send + Sync {
    fn compile_one(
        &self,
        source: &str,
        path: &Path,
        options: &FileOptions,
    ) -> std::result::Result<CompiledModule, CompileError>;

    fn compile_many_first_stage(
        &self,
        inputs: &[BatchInput],
        options: &BatchOptions,
    ) -> std::result::Result<BatchOutcome, CompileError>;

    fn compile_many_mdx(
        &self,
        inputs: &[BatchInput],
        options: &BatchOptions,
    ) -> std::result::Result<BatchOutcome, CompileError>;

    fn parse_directive_blocks(
        &self,
        source: &str,
    ) -> std::result::Result<DirectiveBlocks, CompileError>;
}

/// Whether a path takes the second-stage (MDX) compiler
pub fn is_mdx(path: &Path) -> bool {
    path.extension().map(|ext| ext == "mdx").unwrap_or(false)
}
