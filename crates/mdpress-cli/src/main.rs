use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mdpress_core::cache::{content_hash, DiskCache};
use mdpress_core::classifier;
use mdpress_core::config::PipelineConfig;
use mdpress_core::discovery;

/// mdpress - content pipeline maintenance and diagnostics
#[derive(Parser, Debug)]
#[command(name = "mdpress")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to an mdpress.yaml configuration file
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report files that would take the permissive fallback path
    Scan {
        /// Content root to scan
        dir: PathBuf,

        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Disk cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the content hash of a file
    Hash {
        file: PathBuf,
    },

    /// Watch a content tree and report cache entries edits invalidate
    Watch {
        dir: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show entry counts for the cache under DIR
    Stats { dir: PathBuf },

    /// Drop cache entries for files that no longer exist under DIR
    Clean { dir: PathBuf },

    /// Delete the entire cache under DIR
    Clear { dir: PathBuf },
}

fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for detailed logs
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Scan { ref dir, json } => scan(&load_config(cli.project.as_deref(), dir)?, dir, json),
        Command::Cache { ref action } => match action {
            CacheAction::Stats { dir } => {
                cache_stats(&load_config(cli.project.as_deref(), dir)?, dir)
            }
            CacheAction::Clean { dir } => {
                cache_clean(&load_config(cli.project.as_deref(), dir)?, dir)
            }
            CacheAction::Clear { dir } => {
                cache_clear(&load_config(cli.project.as_deref(), dir)?, dir)
            }
        },
        Command::Hash { ref file } => hash_file(file),
        Command::Watch { ref dir } => watch(&load_config(cli.project.as_deref(), dir)?, dir),
    }
}

/// Load configuration: an explicit --project file, else mdpress.yaml
/// under the content root, else defaults
fn load_config(project: Option<&Path>, dir: &Path) -> anyhow::Result<PipelineConfig> {
    if let Some(path) = project {
        return PipelineConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e));
    }

    let default_path = dir.join("mdpress.yaml");
    if default_path.exists() {
        PipelineConfig::from_file(&default_path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", default_path.display(), e))
    } else {
        Ok(PipelineConfig::default())
    }
}

/// One fallback finding for the scan report
struct Finding {
    path: String,
    reason: String,
}

fn scan(config: &PipelineConfig, dir: &Path, json: bool) -> anyhow::Result<()> {
    let files = discovery::discover_files(dir, &config.include, &config.exclude);
    let allowed = config.pipeline_options.allowed_imports.as_deref();

    let mut findings = Vec::new();
    for path in &files {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                warn!("skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };
        let detection = classifier::detect(&source, allowed, path);
        if detection.has_problematic_patterns {
            findings.push(Finding {
                path: path.display().to_string(),
                reason: detection.reason.unwrap_or_else(|| "unknown".to_string()),
            });
        }
    }

    if json {
        let report: Vec<serde_json::Value> = findings
            .iter()
            .map(|f| serde_json::json!({ "path": f.path, "reason": f.reason }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} of {} file(s) would take the fallback path",
            findings.len(),
            files.len()
        );
        for finding in &findings {
            println!("  {}: {}", finding.path, finding.reason);
        }
    }

    Ok(())
}

fn cache_stats(config: &PipelineConfig, dir: &Path) -> anyhow::Result<()> {
    let cache = DiskCache::init(&config.cache_dir(dir));
    if !cache.is_enabled() {
        anyhow::bail!("cache at {} is not usable", config.cache_dir(dir).display());
    }

    println!("cache directory: {}", cache.cache_dir().display());
    println!("entries: {}", cache.entry_count());
    Ok(())
}

fn cache_clean(config: &PipelineConfig, dir: &Path) -> anyhow::Result<()> {
    let mut cache = DiskCache::init(&config.cache_dir(dir));
    if !cache.is_enabled() {
        anyhow::bail!("cache at {} is not usable", config.cache_dir(dir).display());
    }

    let current: rustc_hash::FxHashSet<PathBuf> =
        discovery::discover_files(dir, &config.include, &config.exclude)
            .into_iter()
            .collect();
    let removed = cache.cleanup(&current);
    cache.flush();

    println!("removed {removed} stale cache entr{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

fn cache_clear(config: &PipelineConfig, dir: &Path) -> anyhow::Result<()> {
    let mut cache = DiskCache::init(&config.cache_dir(dir));
    cache.clear();
    println!("cache cleared: {}", config.cache_dir(dir).display());
    Ok(())
}

fn hash_file(file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", file.display(), e))?;
    println!("{}", content_hash(&content));
    Ok(())
}

/// Watch mode - report which cache entries become stale as files change
fn watch(config: &PipelineConfig, dir: &Path) -> anyhow::Result<()> {
    use notify::{
        event::{EventKind, ModifyKind},
        Event, RecursiveMode, Watcher,
    };
    use std::sync::mpsc::channel;
    use std::time::Duration;

    let cache = DiskCache::init(&config.cache_dir(dir));
    if !cache.is_enabled() {
        anyhow::bail!("cache at {} is not usable", config.cache_dir(dir).display());
    }

    println!("Watching {} for changes... (Press Ctrl+C to stop)", dir.display());

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(dir, RecursiveMode::Recursive)?;

    let mut last_report = std::time::Instant::now();
    let debounce = Duration::from_millis(100);

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Modify(ModifyKind::Data(_)) | EventKind::Create(_)
                );
                if !relevant {
                    continue;
                }

                let now = std::time::Instant::now();
                if now.duration_since(last_report) < debounce {
                    continue;
                }
                last_report = now;

                for path in &event.paths {
                    let is_content = path
                        .extension()
                        .map(|ext| ext == "md" || ext == "mdx")
                        .unwrap_or(false);
                    if !is_content {
                        continue;
                    }

                    let Ok(content) = std::fs::read_to_string(path) else {
                        continue;
                    };
                    let hash = content_hash(&content);
                    match cache.stored_hash(path) {
                        Some(stored) if stored == hash => {
                            info!("unchanged: {}", path.display());
                        }
                        Some(_) => {
                            println!("stale: {}", path.display());
                        }
                        None => {
                            println!("uncached: {}", path.display());
                        }
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                return Err(anyhow::anyhow!("file watcher disconnected"));
            }
        }
    }
}
