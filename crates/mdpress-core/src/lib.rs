//! mdpress-core: build-time Markdown/MDX content pipeline
//!
//! Compiles content files into component-renderable JSX modules through
//! an external compiler service, caching results across build passes
//! (in memory) and build invocations (on disk). The host build tool
//! drives two entry points: the batch orchestrator for full builds and
//! the per-file resolver for incremental loads.

pub mod bundler;
pub mod cache;
pub mod classifier;
pub mod compiler;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod fs;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod stats;
pub mod transforms;
pub mod vmod;

pub use bundler::{Bundler, JsxModuleEmitter};
pub use cache::{content_hash, DiskCache};
pub use compiler::{CompiledModule, CompilerService, FallbackCompiler, Heading};
pub use config::{EnvToggles, PipelineConfig, PipelineOptions};
pub use errors::LoadError;
pub use fs::{FileSystem, MockFileSystem, RealFileSystem};
pub use orchestrator::{BuildOrchestrator, PassSummary};
pub use pipeline::{Plugin, Priority, TransformContext, TransformPipeline};
pub use registry::ComponentRegistry;
pub use resolver::LoadResolver;
pub use session::{BuildMode, BuildSession, FinalizedOutput};
pub use stats::BuildStats;
pub use transforms::standard_pipeline;
