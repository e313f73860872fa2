//! User-extensible transform pipeline
//!
//! Plugins contribute hooks to named phases; a stable priority sort
//! (`Pre` < `Normal` < `Post`, registration order within a tier)
//! flattens them into per-phase lists once at construction. Hooks run
//! strictly sequentially within a phase: hook n+1 receives exactly the
//! value hook n returned, and a hook error aborts the pipeline for that
//! file. Built-in steps run in fixed slots between the user phases:
//!
//! preprocess -> (compile) -> after_parse -> inject(built-in)
//!   -> before_inject -> render(built-in) -> before_output

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::compiler::Heading;
use crate::config::PipelineConfig;
use crate::registry::ComponentRegistry;

/// Where a plugin's hooks sort relative to others
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Pre,
    #[default]
    Normal,
    Post,
}

/// Pipeline phase names, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preprocess,
    AfterParse,
    BeforeInject,
    BeforeOutput,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Preprocess => "preprocess",
            Phase::AfterParse => "afterParse",
            Phase::BeforeInject => "beforeInject",
            Phase::BeforeOutput => "beforeOutput",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("hook failed in {phase} phase: {message}")]
    Hook { phase: Phase, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Everything a transform hook can observe and rewrite.
/// Hooks take the context by value and return a (possibly new) value;
/// cached compiler output is never handed to them directly.
#[derive(Clone, Debug)]
pub struct TransformContext {
    pub code: String,
    pub source: String,
    pub filename: PathBuf,
    pub frontmatter: String,
    pub headings: Vec<Heading>,
    pub registry: Arc<ComponentRegistry>,
    pub config: Arc<PipelineConfig>,
}

/// A transform hook: pure function of its input context to an output
/// context
pub type TransformHook =
    Arc<dyn Fn(TransformContext) -> std::result::Result<TransformContext, String> + Send + Sync>;

/// A preprocess hook: rewrites raw source before compilation
pub type PreprocessHook =
    Arc<dyn Fn(String, &Path) -> std::result::Result<String, String> + Send + Sync>;

/// A plugin: optional hooks for each phase plus a priority tag
#[derive(Clone, Default)]
pub struct Plugin {
    pub name: String,
    pub priority: Priority,
    pub preprocess: Option<PreprocessHook>,
    pub after_parse: Option<TransformHook>,
    pub before_inject: Option<TransformHook>,
    pub before_output: Option<TransformHook>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn preprocess<F>(mut self, hook: F) -> Self
    where
        F: Fn(String, &Path) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        self.preprocess = Some(Arc::new(hook));
        self
    }

    pub fn after_parse<F>(mut self, hook: F) -> Self
    where
        F: Fn(TransformContext) -> std::result::Result<TransformContext, String>
            + Send
            + Sync
            + 'static,
    {
        self.after_parse = Some(Arc::new(hook));
        self
    }

    pub fn before_inject<F>(mut self, hook: F) -> Self
    where
        F: Fn(TransformContext) -> std::result::Result<TransformContext, String>
            + Send
            + Sync
            + 'static,
    {
        self.before_inject = Some(Arc::new(hook));
        self
    }

    pub fn before_output<F>(mut self, hook: F) -> Self
    where
        F: Fn(TransformContext) -> std::result::Result<TransformContext, String>
            + Send
            + Sync
            + 'static,
    {
        self.before_output = Some(Arc::new(hook));
        self
    }
}

/// The composed pipeline: per-phase hook lists built once from the
/// sorted plugin set, plus the built-in steps in their fixed slots
pub struct TransformPipeline {
    preprocess: Vec<PreprocessHook>,
    after_parse: Vec<TransformHook>,
    before_inject: Vec<TransformHook>,
    before_output: Vec<TransformHook>,
    inject: Option<TransformHook>,
    render: Option<TransformHook>,
}

impl TransformPipeline {
    /// Sort plugins by priority (stable, preserving registration order
    /// within a tier) and flatten their hooks into phase lists
    pub fn new(mut plugins: Vec<Plugin>) -> Self {
        plugins.sort_by_key(|p| p.priority);

        let mut pipeline = Self {
            preprocess: Vec::new(),
            after_parse: Vec::new(),
            before_inject: Vec::new(),
            before_output: Vec::new(),
            inject: None,
            render: None,
        };

        for plugin in plugins {
            if let Some(hook) = plugin.preprocess {
                pipeline.preprocess.push(hook);
            }
            if let Some(hook) = plugin.after_parse {
                pipeline.after_parse.push(hook);
            }
            if let Some(hook) = plugin.before_inject {
                pipeline.before_inject.push(hook);
            }
            if let Some(hook) = plugin.before_output {
                pipeline.before_output.push(hook);
            }
        }

        pipeline
    }

    /// Install the built-in component-injection step (runs between
    /// afterParse and beforeInject)
    pub fn with_injection(mut self, hook: TransformHook) -> Self {
        self.inject = Some(hook);
        self
    }

    /// Install the built-in rendering step (runs between beforeInject
    /// and beforeOutput)
    pub fn with_rendering(mut self, hook: TransformHook) -> Self {
        self.render = Some(hook);
        self
    }

    /// Run the preprocess phase over raw source
    pub fn run_preprocess(&self, source: String, path: &Path) -> Result<String> {
        let mut current = source;
        for hook in &self.preprocess {
            current = hook(current, path).map_err(|message| PipelineError::Hook {
                phase: Phase::Preprocess,
                message,
            })?;
        }
        Ok(current)
    }

    /// Run all post-compile phases over a transform context
    pub fn run(&self, ctx: TransformContext) -> Result<TransformContext> {
        let ctx = run_phase(Phase::AfterParse, &self.after_parse, ctx)?;
        let ctx = run_builtin(Phase::AfterParse, self.inject.as_ref(), ctx)?;
        let ctx = run_phase(Phase::BeforeInject, &self.before_inject, ctx)?;
        let ctx = run_builtin(Phase::BeforeInject, self.render.as_ref(), ctx)?;
        run_phase(Phase::BeforeOutput, &self.before_output, ctx)
    }

    pub fn is_empty(&self) -> bool {
        self.preprocess.is_empty()
            && self.after_parse.is_empty()
            && self.before_inject.is_empty()
            && self.before_output.is_empty()
            && self.inject.is_none()
            && self.render.is_none()
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn run_phase(
    phase: Phase,
    hooks: &[TransformHook],
    mut ctx: TransformContext,
) -> Result<TransformContext> {
    for hook in hooks {
        ctx = hook(ctx).map_err(|message| PipelineError::Hook { phase, message })?;
    }
    Ok(ctx)
}

fn run_builtin(
    phase: Phase,
    hook: Option<&TransformHook>,
    ctx: TransformContext,
) -> Result<TransformContext> {
    match hook {
        Some(hook) => hook(ctx).map_err(|message| PipelineError::Hook { phase, message }),
        None => Ok(ctx),
    }
}
