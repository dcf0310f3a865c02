//! In-memory file index.
//!
//! Maps project-root-relative paths to file descriptors; this is the source
//! of truth for what builders see. Populated by an initial scan, then
//! mutated only by the filesystem-event aggregator.

mod ignore;

pub use ignore::{IGNORE_FILE, IgnoreRules};

use anyhow::{Context, Result};
use jwalk::WalkDir;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::utils::path::to_rel;

/// Descriptor of one project file. Identity is `rel_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub rel_path: String,
    pub fs_path: PathBuf,
    pub mode: u32,
}

/// The project file index.
pub struct FileIndex {
    root: PathBuf,
    ignore: IgnoreRules,
    files: RwLock<FxHashMap<String, FileRef>>,
}

impl FileIndex {
    pub fn new(root: PathBuf) -> Result<Self> {
        let ignore = IgnoreRules::load(&root)?;
        Ok(Self {
            root,
            ignore,
            files: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ignore(&self) -> &IgnoreRules {
        &self.ignore
    }

    /// Enumerate the project and populate the index. Returns the file count.
    pub fn scan(&self) -> Result<usize> {
        let mut files = FxHashMap::default();
        for entry in WalkDir::new(&self.root)
            .skip_hidden(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let fs_path = entry.path();
            let Some(rel_path) = to_rel(&self.root, &fs_path) else {
                continue;
            };
            if self.ignore.is_ignored(&rel_path) {
                continue;
            }
            let metadata = entry
                .metadata()
                .with_context(|| format!("failed to stat {}", fs_path.display()))?;
            files.insert(
                rel_path.clone(),
                FileRef {
                    rel_path,
                    fs_path,
                    mode: file_mode(&metadata),
                },
            );
        }

        let count = files.len();
        *self.files.write() = files;
        Ok(count)
    }

    /// Shallow copy of the current index, handed to builders.
    pub fn snapshot(&self) -> FxHashMap<String, FileRef> {
        self.files.read().clone()
    }

    pub fn contains(&self, rel_path: &str) -> bool {
        self.files.read().contains_key(rel_path)
    }

    pub fn get(&self, rel_path: &str) -> Option<FileRef> {
        self.files.read().get(rel_path).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Re-stat one path and refresh its entry. Returns `false` when the
    /// file no longer exists (the entry is dropped, i.e. net unlink).
    pub fn refresh(&self, rel_path: &str) -> bool {
        let fs_path = self.root.join(rel_path);
        match std::fs::metadata(&fs_path) {
            Ok(metadata) if metadata.is_file() => {
                self.files.write().insert(
                    rel_path.to_string(),
                    FileRef {
                        rel_path: rel_path.to_string(),
                        fs_path,
                        mode: file_mode(&metadata),
                    },
                );
                true
            }
            _ => {
                self.files.write().remove(rel_path);
                false
            }
        }
    }

    /// Drop one entry.
    pub fn remove(&self, rel_path: &str) {
        self.files.write().remove(rel_path);
    }
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_project() -> (TempDir, FileIndex) {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<html></html>").unwrap();
        std::fs::create_dir_all(temp.path().join("api")).unwrap();
        std::fs::write(temp.path().join("api/fn.js"), "module.exports = 1").unwrap();
        std::fs::create_dir_all(temp.path().join("node_modules/dep")).unwrap();
        std::fs::write(temp.path().join("node_modules/dep/i.js"), "x").unwrap();

        let index = FileIndex::new(temp.path().to_path_buf()).unwrap();
        (temp, index)
    }

    #[test]
    fn test_scan_respects_ignores() {
        let (_temp, index) = make_project();
        let count = index.scan().unwrap();

        assert_eq!(count, 2);
        assert!(index.contains("index.html"));
        assert!(index.contains("api/fn.js"));
        assert!(!index.contains("node_modules/dep/i.js"));
    }

    #[test]
    fn test_refresh_tracks_disk() {
        let (temp, index) = make_project();
        index.scan().unwrap();

        std::fs::write(temp.path().join("new.txt"), "hi").unwrap();
        assert!(index.refresh("new.txt"));
        assert!(index.contains("new.txt"));

        std::fs::remove_file(temp.path().join("new.txt")).unwrap();
        assert!(!index.refresh("new.txt"));
        assert!(!index.contains("new.txt"));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let (_temp, index) = make_project();
        index.scan().unwrap();

        let snapshot = index.snapshot();
        index.remove("index.html");

        assert!(snapshot.contains_key("index.html"));
        assert!(!index.contains("index.html"));
    }
}
