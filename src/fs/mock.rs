// src/fs/mock.rs

use super::FileSystem;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A fake filesystem backing only the one thing a `FileSystem` is asked:
/// whether a path exists. Tests register paths with [`add_path`](Self::add_path)
/// instead of touching real disk.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    existing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_path(&self, path: impl AsRef<Path>) {
        self.existing.lock().unwrap().insert(path.as_ref().to_path_buf());
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.existing.lock().unwrap().contains(path)
    }
}
