//! Document parsing and formula extraction

mod extractor;
pub mod tree;

pub use extractor::{
    collapse_whitespace, DocumentExtractor, Extraction, SkipReason, CONTENT_ENCODING,
    NAMESPACE_MATHML,
};
pub use tree::{Attribute, Document, Element, Node};
