use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned to the build-tool host for a single file.
///
/// Recoverable conditions (fallback reclassification, cache misses, disk
/// cache I/O trouble) are handled inside the pipeline and never surface
/// here; a `LoadError` always names the offending file and wraps the
/// root cause.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile {path}: {message}")]
    Compile { path: PathBuf, message: String },

    #[error("transform hook failed for {path}: {message}")]
    Transform { path: PathBuf, message: String },

    #[error("bundling failed for {path}: {message}")]
    Bundle { path: PathBuf, message: String },

    #[error("invalid virtual module id: {id}")]
    InvalidVirtualId { id: String },
}

pub type Result<T> = std::result::Result<T, LoadError>;
