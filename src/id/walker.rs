//! Source tree traversal
//!
//! Visits every file below the configured roots that looks like firmware
//! source, in lexicographic path order so repeated runs see call sites in
//! the same order.
//!
//! Names are relative to the tree root. With more than one root the root is
//! kept in the name, so equal relative paths in different trees stay apart.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// File extensions treated as firmware source
pub const SOURCE_EXTENSIONS: [&str; 9] = ["c", "h", "cpp", "hpp", "cc", "hh", "cxx", "hxx", "inc"];

/// Check whether a path looks like a firmware source file
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// A source file found by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Full path to the file
    pub path: PathBuf,
    /// Path relative to its tree root (root included when the walker has
    /// several), `/` separated
    pub relative: String,
}

/// Deterministic walker over one or more source trees
#[derive(Debug, Clone)]
pub struct SourceWalker {
    roots: Vec<PathBuf>,
}

impl SourceWalker {
    /// Create a walker over `roots`, visited in the given order
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Roots of this walker
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Collect all matching files. Unreadable directories are logged and skipped.
    pub fn files(&self) -> Vec<SourceEntry> {
        let qualify = self.roots.len() > 1;
        let mut files = Vec::new();
        for root in &self.roots {
            let walk = WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_hidden(e));

            for entry in walk {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable path below {:?}: {}", root, e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !is_source_file(entry.path()) {
                    continue;
                }
                files.push(SourceEntry {
                    relative: if qualify {
                        path_name(entry.path())
                    } else {
                        relative_name(root, entry.path())
                    },
                    path: entry.into_path(),
                });
            }
        }
        files
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel,
        _ => path.file_name().map(Path::new).unwrap_or(path),
    };
    path_name(rel)
}

/// `/` separated name of `path` without `.` components
fn path_name(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| match c {
            Component::RootDir => Cow::Borrowed(""),
            c => c.as_os_str().to_string_lossy(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
