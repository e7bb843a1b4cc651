//! Destinations for per-directory harvests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::serializer::HarvestSerializer;
use crate::error::{Error, Result};
use crate::types::Harvest;

/// Receives the harvest of each directory that contained accepted files
///
/// `path` is the directory relative to the harvest root; the root itself is
/// the empty path. Sinks are called concurrently from different branches.
#[async_trait]
pub trait HarvestSink: Send + Sync {
    async fn write(&self, path: &Path, harvest: Harvest) -> Result<()>;
}

/// File name stem for the harvest of a relative directory
pub fn harvest_file_stem(path: &Path) -> String {
    let stem = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("_");

    if stem.is_empty() {
        "root".to_string()
    } else {
        stem
    }
}

/// Writes each harvest to `<directory>/<stem>.<extension>`
#[derive(Debug, Clone)]
pub struct FileSink {
    directory: PathBuf,
    extension: String,
    serializer: HarvestSerializer,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: "harvest".to_string(),
            serializer: HarvestSerializer::default(),
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    #[must_use]
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.serializer = HarvestSerializer::new(indent);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Output file for the harvest of `path`
    pub fn target(&self, path: &Path) -> PathBuf {
        self.directory
            .join(format!("{}.{}", harvest_file_stem(path), self.extension))
    }
}

#[async_trait]
impl HarvestSink for FileSink {
    async fn write(&self, path: &Path, harvest: Harvest) -> Result<()> {
        let target = self.target(path);
        let temp = target.with_extension(format!("{}.tmp", self.extension));

        let serializer = self.serializer;
        let bytes = tokio::task::spawn_blocking(move || serializer.to_bytes(&harvest)).await??;

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| Error::sink(&self.directory, e.to_string()))?;
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| Error::sink(&temp, e.to_string()))?;
        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|e| Error::sink(&target, e.to_string()))?;

        tracing::debug!("Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(())
    }
}

/// Keeps harvests in memory, keyed by directory
#[derive(Debug, Default)]
pub struct MemorySink {
    harvests: Mutex<BTreeMap<PathBuf, Harvest>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Harvest written for `path`, if any
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Harvest> {
        self.harvests.lock().get(path.as_ref()).cloned()
    }

    /// Directories that received a harvest, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        self.harvests.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.harvests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.harvests.lock().is_empty()
    }

    pub fn take(&self) -> BTreeMap<PathBuf, Harvest> {
        std::mem::take(&mut *self.harvests.lock())
    }
}

#[async_trait]
impl HarvestSink for MemorySink {
    async fn write(&self, path: &Path, harvest: Harvest) -> Result<()> {
        self.harvests.lock().insert(path.to_path_buf(), harvest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fragment;

    fn harvest(uri: &str) -> Harvest {
        Harvest::from(Fragment {
            id: "0".to_string(),
            uri: uri.to_string(),
            xhtml_content: "text".to_string(),
            formulae: Vec::new(),
        })
    }

    #[test]
    fn test_harvest_file_stem() {
        assert_eq!(harvest_file_stem(Path::new("")), "root");
        assert_eq!(harvest_file_stem(Path::new("a")), "a");
        assert_eq!(harvest_file_stem(Path::new("a/b/c")), "a_b_c");
    }

    #[test]
    fn test_file_sink_target() {
        let sink = FileSink::new("/out").with_extension(".xml");
        assert_eq!(sink.directory(), Path::new("/out"));
        assert_eq!(sink.target(Path::new("x/y")), PathBuf::from("/out/x_y.xml"));
        assert_eq!(sink.target(Path::new("")), PathBuf::from("/out/root.xml"));
    }

    #[tokio::test]
    async fn test_file_sink_writes_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let sink = FileSink::new(&out);

        sink.write(Path::new("a/b"), harvest("first.xhtml")).await.unwrap();
        sink.write(Path::new("a/b"), harvest("second.xhtml")).await.unwrap();

        let written = std::fs::read_to_string(out.join("a_b.harvest")).unwrap();
        assert!(written.starts_with("<mws:harvest"));
        assert!(written.contains("<id>second.xhtml</id>"));
        assert!(!written.contains("first.xhtml"));

        let names: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a_b.harvest".to_string()]);
    }

    #[tokio::test]
    async fn test_file_sink_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let sink = FileSink::new(blocker.join("out"));
        let result = sink.write(Path::new(""), harvest("a")).await;
        assert!(matches!(result, Err(Error::Sink { .. })));
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.write(Path::new("b"), harvest("b/1.xhtml")).await.unwrap();
        sink.write(Path::new(""), harvest("0.xhtml")).await.unwrap();

        assert_eq!(sink.paths(), vec![PathBuf::from(""), PathBuf::from("b")]);
        assert_eq!(sink.get("b").unwrap()[0].uri, "b/1.xhtml");
        assert!(sink.get("c").is_none());

        let taken = sink.take();
        assert_eq!(taken.len(), 2);
        assert!(sink.is_empty());
    }
}
