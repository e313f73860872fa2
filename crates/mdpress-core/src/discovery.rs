//! Candidate file enumeration under include/exclude glob rules

use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::warn;
use walkdir::WalkDir;

/// Enumerate source files under `root` matching the include patterns
/// and not matching the exclude patterns. Patterns are evaluated
/// against the root-relative path. Deterministic ordering.
pub fn discover_files(root: &Path, include: &[String], exclude: &[String]) -> Vec<PathBuf> {
    let include = compile_patterns(include);
    let exclude = compile_patterns(exclude);

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(root).ok()?.to_path_buf();
            if matches_any(&include, &rel) && !matches_any(&exclude, &rel) {
                Some(entry.path().to_path_buf())
            } else {
                None
            }
        })
        .collect();

    files.sort();
    files
}

fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    let mut compiled = Vec::new();
    for raw in patterns {
        match Pattern::new(raw) {
            Ok(pattern) => {
                compiled.push(pattern);
                // "**/x" should also match a top-level "x"
                if let Some(rest) = raw.strip_prefix("**/") {
                    if let Ok(pattern) = Pattern::new(rest) {
                        compiled.push(pattern);
                    }
                }
            }
            Err(e) => warn!("ignoring invalid glob pattern {raw:?}: {e}"),
        }
    }
    compiled
}

fn matches_any(patterns: &[Pattern], rel: &Path) -> bool {
    patterns.iter().any(|p| p.matches_path(rel))
}
