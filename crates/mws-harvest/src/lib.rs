//! mws-harvest: MathWebSearch harvests from LaTeXML XHTML documents
//!
//! Documents are parsed into an element tree, every formula carrying a
//! content MathML annotation is replaced by a `math{id}` placeholder, and the
//! flattened text plus the formulae form a [`Fragment`]. Fragments of one
//! directory are merged into a [`Harvest`] and written in the `mws:harvest`
//! ingestion format.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod output;
pub mod processing;
pub mod types;

pub use config::HarvestConfig;
pub use error::{Error, Result};
pub use ingestion::DocumentExtractor;
pub use output::{write_harvest, FileSink, HarvestSerializer, HarvestSink, MemorySink};
pub use processing::{
    harvest_document, DirectoryHarvester, HarvestFs, HarvestSummary, Job, JobRunner, LocalFs,
    MemoryFs,
};
pub use types::{Formula, Fragment, Harvest};
