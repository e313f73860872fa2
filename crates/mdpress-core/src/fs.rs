use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rustc_hash::FxHashMap;

/// File system abstraction
/// Allows dependency injection for testing without touching real disk
pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> std::io::Result<String>;
    fn exists(&self, path: &Path) -> bool;
}

/// Production file system backed by std::fs
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RealFileSystem {
    fn read_file(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory file system for tests
///
/// Counts reads so tests can assert that cached paths perform no file
/// I/O (e.g. pass-2 restoration must not re-read sources).
pub struct MockFileSystem {
    files: Mutex<FxHashMap<PathBuf, String>>,
    read_count: AtomicUsize,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(FxHashMap::default()),
            read_count: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), content.into());
    }

    /// Number of read_file calls made so far
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn read_file(&self, path: &Path) -> std::io::Result<String> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such file: {}", path.display()),
                )
            })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}
