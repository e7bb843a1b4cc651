//! File acceptance and URI mapping for harvested paths

use std::path::{Component, Path};

/// Default extensions of harvested documents
pub const DEFAULT_EXTENSIONS: &[&str] = &["xhtml", "html", "htm"];

/// Accepts files by extension, case-insensitively
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

/// Maps relative document paths to the URIs stored in fragments
#[derive(Debug, Clone, Default)]
pub struct UriMapper {
    base: Option<String>,
}

impl UriMapper {
    /// Mapper yielding the relative path itself
    pub fn relative() -> Self {
        Self { base: None }
    }

    /// Mapper prefixing `base` to the relative path
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    pub fn map(&self, path: &Path) -> String {
        let relative = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                Component::ParentDir => Some("..".into()),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        match &self.base {
            Some(base) if base.ends_with('/') => format!("{}{}", base, relative),
            Some(base) => format!("{}/{}", base, relative),
            None if path.has_root() => format!("/{}", relative),
            None => relative,
        }
    }
}

/// Display form of a relative directory path; the root shows as `.`
pub fn display_path(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.display().to_string()
    }
}
