//! Configuration for the harvester

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::output::{FileSink, DEFAULT_INDENT};
use crate::processing::{ExtensionFilter, JobRunner, UriMapper, DEFAULT_EXTENSIONS};

/// Largest accepted indentation width
pub const MAX_INDENT: usize = 16;

/// Main harvester configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Which files are harvested and how they are named
    pub input: InputConfig,
    /// Where and how harvests are written
    pub output: OutputConfig,
    /// Job concurrency
    pub processing: ProcessingConfig,
    /// Log filtering
    pub logging: LoggingConfig,
}

/// Input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// File extensions to harvest, without the leading dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Prefix for fragment URIs; relative paths are used when unset
    #[serde(default)]
    pub base_uri: Option<String>,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            base_uri: None,
        }
    }
}

impl InputConfig {
    pub fn filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(&self.extensions)
    }

    pub fn uri_mapper(&self) -> UriMapper {
        match &self.base_uri {
            Some(base) => UriMapper::with_base(base.clone()),
            None => UriMapper::relative(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one file per harvested directory
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    /// Indentation width of the written XML, 0 for a single line
    #[serde(default = "default_indent")]
    pub indent: usize,
    /// Extension of written files
    #[serde(default = "default_output_extension")]
    pub extension: String,
}

fn default_output_directory() -> PathBuf { PathBuf::from("harvests") }
fn default_indent() -> usize { DEFAULT_INDENT }
fn default_output_extension() -> String { "harvest".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            indent: default_indent(),
            extension: default_output_extension(),
        }
    }
}

impl OutputConfig {
    pub fn file_sink(&self) -> FileSink {
        FileSink::new(&self.directory)
            .with_extension(&self.extension)
            .with_indent(self.indent)
    }
}

/// Processing configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum number of extraction jobs running at once, across all directories.
    /// Unbounded when unset.
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
}

impl ProcessingConfig {
    pub fn runner(&self) -> JobRunner {
        JobRunner::with_limit(self.max_concurrent_jobs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String { "mws_harvest=info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl HarvestConfig {
    /// Load configuration from a TOML file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.extensions.is_empty() {
            return Err(Error::config("input.extensions must not be empty"));
        }
        if self.input.extensions.iter().any(|ext| ext.trim_start_matches('.').is_empty()) {
            return Err(Error::config("input.extensions contains an empty extension"));
        }
        if self.processing.max_concurrent_jobs == Some(0) {
            return Err(Error::config("processing.max_concurrent_jobs must be at least 1"));
        }
        if self.output.indent > MAX_INDENT {
            return Err(Error::config(format!(
                "output.indent must be at most {}, got {}",
                MAX_INDENT, self.output.indent
            )));
        }
        if self.output.extension.trim_start_matches('.').is_empty() {
            return Err(Error::config("output.extension must not be empty"));
        }
        Ok(())
    }
}
