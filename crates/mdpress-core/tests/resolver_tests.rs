mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::MockCompiler;
use mdpress_core::bundler::JsxModuleEmitter;
use mdpress_core::compiler::{CompileError, CompiledModule, CompilerService, FallbackCompiler};
use mdpress_core::config::{EnvToggles, PipelineConfig};
use mdpress_core::errors::LoadError;
use mdpress_core::fs::MockFileSystem;
use mdpress_core::pipeline::TransformPipeline;
use mdpress_core::registry::ComponentRegistry;
use mdpress_core::resolver::LoadResolver;
use mdpress_core::session::{BuildMode, BuildSession, FinalizedOutput};
use mdpress_core::transforms;

struct Fixture {
    session: BuildSession,
    fallback: FallbackCompiler,
    pipeline: TransformPipeline,
    bundler: JsxModuleEmitter,
    fs: Arc<MockFileSystem>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    fn with_config(mut config: PipelineConfig) -> Self {
        // Keep resolver tests off the real disk cache
        config.pipeline_options.cache = false;
        let fs = Arc::new(MockFileSystem::new());
        let session = BuildSession::new(
            config,
            EnvToggles::default(),
            fs.clone(),
            BuildMode::Serve,
        );
        let pipeline = TransformPipeline::new(Vec::new())
            .with_injection(transforms::injection_step(session.registry.clone()))
            .with_rendering(transforms::render_step());
        Self {
            session,
            fallback: FallbackCompiler::new(ComponentRegistry::default()),
            pipeline,
            bundler: JsxModuleEmitter,
            fs,
        }
    }

    fn load(
        &mut self,
        compiler: &dyn CompilerService,
        path: &Path,
    ) -> Result<FinalizedOutput, LoadError> {
        let mut resolver = LoadResolver::new(
            &mut self.session,
            compiler,
            &self.fallback,
            &self.pipeline,
            &self.bundler,
        );
        resolver.load(path)
    }
}

#[test]
fn test_full_miss_compiles_and_caches() {
    let mut fixture = Fixture::new();
    fixture.fs.insert("/docs/a.md", "# A");
    let compiler = MockCompiler::new();

    let first = fixture.load(&compiler, Path::new("/docs/a.md")).unwrap();
    assert!(first.code.contains("export default MDXContent;"));
    assert_eq!(compiler.invocations(), 1);

    // Second load comes out of the finalized cache
    let second = fixture.load(&compiler, Path::new("/docs/a.md")).unwrap();
    assert_eq!(first, second);
    assert_eq!(compiler.invocations(), 1);
    assert_eq!(fixture.fs.read_count(), 1);
}

#[test]
fn test_module_cache_hit_skips_compilation() {
    let mut fixture = Fixture::new();
    let path = PathBuf::from("/docs/cached.md");
    fixture.session.caches.preprocessed.insert(
        path.clone(),
        "# Cached".to_string(),
    );
    fixture.session.caches.first_stage.insert(
        path.clone(),
        CompiledModule {
            code: "<article>cached</article>".to_string(),
            frontmatter: "{}".to_string(),
            headings: Vec::new(),
            diagnostics: Vec::new(),
        },
    );

    let compiler = MockCompiler::new();
    let output = fixture.load(&compiler, &path).unwrap();

    assert!(output.code.contains("cached"));
    assert_eq!(compiler.invocations(), 0);
    assert_eq!(fixture.fs.read_count(), 0);
    assert!(fixture.session.caches.finalized.contains_key(&path));
}

#[test]
fn test_mdx_cache_tier_respects_file_kind() {
    let mut fixture = Fixture::new();
    let path = PathBuf::from("/docs/page.mdx");
    fixture.fs.insert(path.clone(), "# Fresh");
    // A first-stage entry must not satisfy an MDX file
    fixture.session.caches.first_stage.insert(
        path.clone(),
        CompiledModule {
            code: "<article>wrong tier</article>".to_string(),
            frontmatter: "{}".to_string(),
            headings: Vec::new(),
            diagnostics: Vec::new(),
        },
    );

    let compiler = MockCompiler::new();
    let output = fixture.load(&compiler, &path).unwrap();

    assert_eq!(compiler.invocations(), 1);
    assert!(output.code.contains("# Fresh"));
    assert!(fixture.session.caches.mdx.contains_key(&path));
}

#[test]
fn test_recoverable_failure_reroutes_to_fallback() {
    let mut fixture = Fixture::new();
    let path = PathBuf::from("/docs/broken.md");
    fixture.fs.insert(path.clone(), "# Broken\n\nSome *text*.");

    let compiler = MockCompiler::new().fail_path(
        path.clone(),
        CompileError::Other("compiler returned undefined".to_string()),
    );

    let output = fixture.load(&compiler, &path).unwrap();

    // Permissive output still renders the document
    assert!(output.code.contains("<h1>Broken</h1>"));
    assert!(fixture.session.is_fallback(&path));
    assert!(fixture.session.caches.fallback[&path].contains("undefined"));
    // Fallback results never enter the finalized tier
    assert!(!fixture.session.caches.finalized.contains_key(&path));
}

#[test]
fn test_unknown_failure_is_fatal_and_names_the_file() {
    let mut fixture = Fixture::new();
    let path = PathBuf::from("/docs/cursed.md");
    fixture.fs.insert(path.clone(), "# Cursed");

    let compiler = MockCompiler::new().fail_path(
        path.clone(),
        CompileError::Other("segmentation fault".to_string()),
    );

    let err = fixture.load(&compiler, &path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("/docs/cursed.md"));
    assert!(message.contains("segmentation fault"));
    assert!(!fixture.session.is_fallback(&path));
}

#[test]
fn test_designated_fallback_bypasses_all_tiers() {
    let mut fixture = Fixture::new();
    let path = PathBuf::from("/docs/odd.md");
    fixture.fs.insert(path.clone(), "# Odd");
    fixture
        .session
        .mark_fallback(&path, "disallowed import source(s): x".to_string());

    let compiler = MockCompiler::new();
    let output = fixture.load(&compiler, &path).unwrap();

    assert!(output.code.contains("<h1>Odd</h1>"));
    assert_eq!(compiler.invocations(), 0);
}

#[test]
fn test_reclassification_after_preprocess() {
    // The raw source is clean; a preprocess hook introduces a
    // directive, so the post-preprocess classification must catch it
    let mut config = PipelineConfig::default();
    config.pipeline_options.cache = false;
    let fs = Arc::new(MockFileSystem::new());
    let session = BuildSession::new(
        config,
        EnvToggles::default(),
        fs.clone(),
        BuildMode::Serve,
    );
    let pipeline = TransformPipeline::new(vec![mdpress_core::pipeline::Plugin::new(
        "inject-directive",
    )
    .preprocess(|source, _| Ok(format!(":::note\n{source}\n:::\n")))])
    .with_rendering(transforms::render_step());

    let mut fixture = Fixture {
        session,
        fallback: FallbackCompiler::new(ComponentRegistry::default()),
        pipeline,
        bundler: JsxModuleEmitter,
        fs,
    };

    let path = PathBuf::from("/docs/clean.md");
    fixture.fs.insert(path.clone(), "# Clean");

    let compiler = MockCompiler::new();
    let output = fixture.load(&compiler, &path).unwrap();

    assert!(fixture.session.is_fallback(&path));
    assert_eq!(compiler.invocations(), 0);
    assert!(output.code.contains("Clean"));
}

#[test]
fn test_load_virtual_roundtrips_the_id() {
    let mut fixture = Fixture::new();
    fixture.fs.insert("/docs/a.md", "# A");
    let compiler = MockCompiler::new();

    let id = mdpress_core::vmod::to_virtual_id(Path::new("/docs/a.md"));
    let mut resolver = LoadResolver::new(
        &mut fixture.session,
        &compiler,
        &fixture.fallback,
        &fixture.pipeline,
        &fixture.bundler,
    );

    let output = resolver.load_virtual(&id).unwrap();
    assert!(output.code.contains("# A"));

    let err = resolver.load_virtual("/docs/a.md").unwrap_err();
    assert!(matches!(err, LoadError::InvalidVirtualId { .. }));
}

#[test]
fn test_missing_file_propagates_read_error() {
    let mut fixture = Fixture::new();
    let compiler = MockCompiler::new();

    let err = fixture
        .load(&compiler, Path::new("/docs/ghost.md"))
        .unwrap_err();
    assert!(matches!(err, LoadError::Read { .. }));
    assert!(err.to_string().contains("/docs/ghost.md"));
}

#[test]
fn test_hook_failure_propagates() {
    let mut config = PipelineConfig::default();
    config.pipeline_options.cache = false;
    let fs = Arc::new(MockFileSystem::new());
    let session = BuildSession::new(
        config,
        EnvToggles::default(),
        fs.clone(),
        BuildMode::Serve,
    );
    let pipeline = TransformPipeline::new(vec![mdpress_core::pipeline::Plugin::new("boom")
        .after_parse(|_| Err("hook exploded".to_string()))]);

    let mut fixture = Fixture {
        session,
        fallback: FallbackCompiler::new(ComponentRegistry::default()),
        pipeline,
        bundler: JsxModuleEmitter,
        fs,
    };

    let path = PathBuf::from("/docs/a.md");
    fixture.fs.insert(path.clone(), "# A");

    let err = fixture.load(&MockCompiler::new(), &path).unwrap_err();
    assert!(matches!(err, LoadError::Transform { .. }));
    assert!(err.to_string().contains("hook exploded"));
}
