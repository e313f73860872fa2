//! End-of-build statistics
//!
//! Tracks processed/fallback counts and per-phase timing; logged at the
//! end of every pass and optionally written to a JSON file so users can
//! find the files that triggered the permissive path.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::info;

#[derive(Debug, Default)]
pub struct BuildStats {
    /// Files that reached a finalized output this invocation
    pub processed: usize,
    /// Files short-circuited by the disk cache
    pub disk_hits: usize,
    pub compiled_first_stage: usize,
    pub compiled_mdx: usize,
    /// Fallback files with the reason each one was rerouted
    pub fallback: IndexMap<PathBuf, String>,
    /// Accumulated wall time per pipeline phase
    timings: IndexMap<&'static str, Duration>,
}

impl BuildStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fallback(&mut self, path: PathBuf, reason: String) {
        self.fallback.insert(path, reason);
    }

    pub fn record_timing(&mut self, phase: &'static str, elapsed: Duration) {
        *self.timings.entry(phase).or_default() += elapsed;
    }

    pub fn fallback_count(&self) -> usize {
        self.fallback.len()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let timings: IndexMap<&str, u128> = self
            .timings
            .iter()
            .map(|(phase, d)| (*phase, d.as_millis()))
            .collect();
        let fallback: IndexMap<String, &String> = self
            .fallback
            .iter()
            .map(|(path, reason)| (path.display().to_string(), reason))
            .collect();

        serde_json::json!({
            "processed": self.processed,
            "diskCacheHits": self.disk_hits,
            "compiledFirstStage": self.compiled_first_stage,
            "compiledMdx": self.compiled_mdx,
            "fallbackCount": self.fallback_count(),
            "fallback": fallback,
            "phaseTimingsMs": timings,
        })
    }

    /// Write the JSON summary; failures are logged, never escalated
    pub fn write_to_file(&self, path: &Path) {
        match serde_json::to_string_pretty(&self.to_json()) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!("failed to write stats file {}: {}", path.display(), e);
                }
            }
            Err(e) => tracing::warn!("failed to serialize stats: {}", e),
        }
    }

    /// Per-phase timing breakdown, printed when timing diagnostics are
    /// enabled
    pub fn log_timings(&self) {
        for (phase, elapsed) in &self.timings {
            info!("phase {phase}: {}ms", elapsed.as_millis());
        }
    }

    pub fn log_summary(&self) {
        info!(
            "processed {} file(s): {} disk cache hit(s), {} first-stage, {} MDX, {} fallback",
            self.processed,
            self.disk_hits,
            self.compiled_first_stage,
            self.compiled_mdx,
            self.fallback_count()
        );
        for (path, reason) in &self.fallback {
            info!("  fallback {}: {}", path.display(), reason);
        }
    }
}

/// Scope timer for one phase; stop() folds the elapsed time into stats
pub struct PhaseTimer {
    phase: &'static str,
    start: Instant,
}

impl PhaseTimer {
    pub fn start(phase: &'static str) -> Self {
        Self {
            phase,
            start: Instant::now(),
        }
    }

    pub fn stop(self, stats: &mut BuildStats) {
        stats.record_timing(self.phase, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_json_shape() {
        let mut stats = BuildStats::new();
        stats.processed = 3;
        stats.disk_hits = 1;
        stats.record_fallback(PathBuf::from("/docs/bad.mdx"), "parse error".to_string());
        stats.record_timing("compile", Duration::from_millis(12));

        let json = stats.to_json();
        assert_eq!(json["processed"], 3);
        assert_eq!(json["diskCacheHits"], 1);
        assert_eq!(json["fallbackCount"], 1);
        assert_eq!(json["fallback"]["/docs/bad.mdx"], "parse error");
        assert!(json["phaseTimingsMs"]["compile"].as_u64().unwrap() >= 12);
    }

    #[test]
    fn test_timings_accumulate() {
        let mut stats = BuildStats::new();
        stats.record_timing("bundle", Duration::from_millis(5));
        stats.record_timing("bundle", Duration::from_millis(7));

        assert_eq!(stats.to_json()["phaseTimingsMs"]["bundle"], 12);
    }

    #[test]
    fn test_write_to_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("stats.json");

        let mut stats = BuildStats::new();
        stats.processed = 1;
        stats.write_to_file(&path);

        let loaded: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded["processed"], 1);
    }
}
