use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::registry::RegistryConfig;

/// Options that control cache behavior and batch shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOptions {
    /// Persist compiled output across build invocations (default: true)
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Override for the cache directory (default: .mdpress-cache under
    /// the content root)
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// How many files run through the transform pipeline concurrently
    /// (default: 50)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Batch size at which bundling switches to the worker pool
    /// (default: 100)
    #[serde(default = "default_worker_threshold")]
    pub worker_threshold: usize,

    /// Import sources the first-stage compiler can handle. When set,
    /// any other import routes the file to the fallback compiler; when
    /// absent, imports are not checked.
    #[serde(default)]
    pub allowed_imports: Option<Vec<String>>,

    /// Emit source maps (default: false)
    #[serde(default)]
    pub source_map: bool,
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    50
}

fn default_worker_threshold() -> usize {
    100
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            cache: true,
            cache_dir: None,
            chunk_size: 50,
            worker_threshold: 100,
            allowed_imports: None,
            source_map: false,
        }
    }
}

/// Main pipeline configuration, loaded from mdpress.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline_options: PipelineOptions,

    /// Files to include (glob patterns)
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Files to exclude (glob patterns)
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Directive and component mappings for the injection step
    #[serde(default)]
    pub registry: RegistryConfig,
}

fn default_include() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec!["**/node_modules/**".to_string(), "**/dist/**".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_options: PipelineOptions::default(),
            include: default_include(),
            exclude: default_exclude(),
            registry: RegistryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn cache_dir(&self, content_root: &Path) -> PathBuf {
        match &self.pipeline_options.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => content_root.join(crate::cache::CACHE_DIR_NAME),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Process-environment toggles, read once at startup
///
/// MDPRESS_CACHE=0 disables the disk cache regardless of config,
/// MDPRESS_TIMING=1 enables per-phase timing diagnostics,
/// MDPRESS_PLAIN_DIRECTIVES=1 selects the plain directive pipeline
/// (skips the built-in injection step), and MDPRESS_STATS names a JSON
/// file to write end-of-build statistics into.
#[derive(Debug, Clone, Default)]
pub struct EnvToggles {
    pub cache_override: Option<bool>,
    pub timing: bool,
    pub plain_directives: bool,
    pub stats_file: Option<PathBuf>,
}

impl EnvToggles {
    pub fn from_env() -> Self {
        Self {
            cache_override: std::env::var("MDPRESS_CACHE")
                .ok()
                .map(|v| v != "0" && v != "false"),
            timing: flag_set("MDPRESS_TIMING"),
            plain_directives: flag_set("MDPRESS_PLAIN_DIRECTIVES"),
            stats_file: std::env::var("MDPRESS_STATS").ok().map(PathBuf::from),
        }
    }

    /// Effective cache switch: environment wins over config
    pub fn cache_enabled(&self, config: &PipelineConfig) -> bool {
        self.cache_override.unwrap_or(config.pipeline_options.cache)
    }
}

fn flag_set(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}
