//! Harvest serialization and sinks

mod serializer;
mod sink;

pub use serializer::{write_harvest, HarvestSerializer, DEFAULT_INDENT, NAMESPACE_MWS};
pub use sink::{harvest_file_stem, FileSink, HarvestSink, MemorySink};
