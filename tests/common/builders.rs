//! Scratch source trees for registry tests

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trice_rs::id::{SourceWalker, SyncOptions};
use trice_rs::IdRange;

/// Temporary firmware tree with its own `til.json` and `li.json`
pub struct SourceTree {
    dir: TempDir,
}

impl SourceTree {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir(dir.path().join("src")).expect("src dir");
        Self { dir }
    }

    /// Add a file below `src/`
    pub fn file(self, relative: &str, content: &str) -> Self {
        let path = self.src().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("parent dir");
        }
        std::fs::write(path, content).expect("write source");
        self
    }

    /// Add a file below `src/` with raw contents
    pub fn file_bytes(self, relative: &str, content: &[u8]) -> Self {
        let path = self.src().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("parent dir");
        }
        std::fs::write(path, content).expect("write source");
        self
    }

    pub fn src(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Read a file below `src/`
    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.src().join(relative)).expect("read source")
    }

    pub fn read_bytes(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.src().join(relative)).expect("read source")
    }

    pub fn read_root(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).expect("read table")
    }

    pub fn walker(&self) -> SourceWalker {
        SourceWalker::new([self.src()])
    }

    /// Options pointing at this tree's tables
    pub fn options(&self, range: IdRange) -> SyncOptions {
        SyncOptions {
            range,
            til: self.path("til.json"),
            li: self.path("li.json"),
            ..SyncOptions::default()
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
