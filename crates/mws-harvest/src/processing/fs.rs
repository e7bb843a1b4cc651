//! Filesystem abstraction used by the harvester
//!
//! Paths handed to a [`HarvestFs`] are relative to the filesystem root; the
//! root itself is the empty path.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

/// A single entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Read-only filesystem the harvester walks
///
/// Implementations:
/// - `LocalFs`: a directory on disk
/// - `MemoryFs`: an in-memory tree
#[async_trait]
pub trait HarvestFs: Send + Sync {
    /// List a directory, sorted by name
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Read the full content of a file
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Filesystem rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl HarvestFs for LocalFs {
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(self.resolve(path)).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!("Ignoring non UTF-8 file name {:?} in {}", raw, path.display());
                    continue;
                }
            };
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(DirEntry { name, is_dir });
        }

        entries.sort();
        Ok(entries)
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.resolve(path)).await
    }
}

#[derive(Debug, Clone)]
enum MemoryFile {
    Content(Vec<u8>),
    Unreadable,
}

/// In-memory filesystem; directories exist implicitly as parents of files
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<PathBuf, MemoryFile>>,
    unlistable: RwLock<BTreeSet<PathBuf>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files
            .write()
            .insert(path.into(), MemoryFile::Content(content.into()));
    }

    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add a file that is listed but fails to open
    #[must_use]
    pub fn with_unreadable_file(self, path: impl Into<PathBuf>) -> Self {
        self.files.write().insert(path.into(), MemoryFile::Unreadable);
        self
    }

    /// Make listing a directory fail
    #[must_use]
    pub fn with_unlistable_dir(self, path: impl Into<PathBuf>) -> Self {
        self.unlistable.write().insert(path.into());
        self
    }
}

#[async_trait]
impl HarvestFs for MemoryFs {
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        if self.unlistable.read().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot list {}", path.display()),
            ));
        }

        let mut entries = BTreeSet::new();
        for file in self.files.read().keys() {
            let Ok(rest) = file.strip_prefix(path) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let name = first.as_os_str().to_string_lossy().into_owned();
            let is_dir = components.next().is_some();
            entries.insert(DirEntry { name, is_dir });
        }

        if entries.is_empty() && !path.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such directory: {}", path.display()),
            ));
        }

        Ok(entries.into_iter().collect())
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.files.read().get(path) {
            Some(MemoryFile::Content(content)) => Ok(content.clone()),
            Some(MemoryFile::Unreadable) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot open {}", path.display()),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fs_listing() {
        let fs = MemoryFs::new()
            .with_file("a.xhtml", "<a/>")
            .with_file("sub/b.xhtml", "<b/>")
            .with_file("sub/deep/c.xhtml", "<c/>");

        let root = fs.read_dir(Path::new("")).await.unwrap();
        assert_eq!(root, vec![DirEntry::file("a.xhtml"), DirEntry::dir("sub")]);

        let sub = fs.read_dir(Path::new("sub")).await.unwrap();
        assert_eq!(sub, vec![DirEntry::file("b.xhtml"), DirEntry::dir("deep")]);

        assert!(fs.read_dir(Path::new("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_fs_read_failures() {
        let fs = MemoryFs::new()
            .with_file("ok.xhtml", "<ok/>")
            .with_unreadable_file("locked.xhtml")
            .with_unlistable_dir("");

        assert_eq!(fs.read(Path::new("ok.xhtml")).await.unwrap(), b"<ok/>");
        assert!(fs.read(Path::new("locked.xhtml")).await.is_err());
        assert!(fs.read(Path::new("missing.xhtml")).await.is_err());
        assert!(fs.read_dir(Path::new("")).await.is_err());
    }

    #[tokio::test]
    async fn test_local_fs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.xhtml"), "<b/>").unwrap();
        std::fs::write(dir.path().join("sub").join("a.xhtml"), "<a/>").unwrap();

        let fs = LocalFs::new(dir.path());
        assert_eq!(fs.root(), dir.path());
        let root = fs.read_dir(Path::new("")).await.unwrap();
        assert_eq!(root, vec![DirEntry::file("b.xhtml"), DirEntry::dir("sub")]);

        let content = fs.read(Path::new("sub/a.xhtml")).await.unwrap();
        assert_eq!(content, b"<a/>");
        assert!(fs.read_dir(Path::new("nope")).await.is_err());
    }
}
