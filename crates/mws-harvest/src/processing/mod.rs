//! Filesystem walking and concurrent extraction

pub mod filter;
pub mod fs;
mod harvester;
mod job;

pub use filter::{display_path, ExtensionFilter, UriMapper, DEFAULT_EXTENSIONS};
pub use fs::{DirEntry, HarvestFs, LocalFs, MemoryFs};
pub use harvester::{DirectoryHarvester, HarvestSummary};
pub use job::{harvest_document, BatchResult, Job, JobOutcome, JobRunner};
