//! Harvest, fragment and formula records

use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A single formula found within a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    /// Document-local identifier, taken from the `id` attribute of the formula node
    pub id: String,
    /// Dual (presentation + content) MathML of the whole formula node.
    /// Presentation and content parts are linked using `xref` attributes.
    pub dual_mathml: String,
    /// Content MathML corresponding to `dual_mathml`, whitespace-collapsed
    pub content_mathml: String,
}

/// A single document within a harvest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Identifier of this fragment, unique within its harvest.
    /// Assigned by whoever aggregates fragments, typically a running index.
    pub id: String,
    /// URI of the source document
    pub uri: String,
    /// Flattened text of the document, with `"math" + id` substituted for formulae
    pub xhtml_content: String,
    /// Formulae in document order
    pub formulae: Vec<Formula>,
}

impl Fragment {
    /// Placeholder token that replaces a formula in `xhtml_content`
    pub fn placeholder(formula_id: &str) -> String {
        format!("math{}", formula_id)
    }

    /// Stamp the aggregator-assigned id and source URI
    #[must_use]
    pub fn with_identity(mut self, id: impl Into<String>, uri: impl Into<String>) -> Self {
        self.id = id.into();
        self.uri = uri.into();
        self
    }
}

/// An ordered set of fragments, serialized as one ingestion document.
///
/// Fragments are kept sorted by URI so that output does not depend on the
/// order in which extraction jobs complete. Deserialized harvests are sorted
/// the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Fragment>", into = "Vec<Fragment>")]
pub struct Harvest {
    fragments: Vec<Fragment>,
}

impl Harvest {
    /// Build a harvest from fragments in any order
    pub fn new(mut fragments: Vec<Fragment>) -> Self {
        // stable: fragments sharing a URI keep their relative order
        fragments.sort_by(|a, b| a.uri.cmp(&b.uri));
        Self { fragments }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn into_fragments(self) -> Vec<Fragment> {
        self.fragments
    }

    /// Total number of formulae across all fragments
    pub fn formula_count(&self) -> usize {
        self.fragments.iter().map(|f| f.formulae.len()).sum()
    }
}

impl Deref for Harvest {
    type Target = [Fragment];

    fn deref(&self) -> &Self::Target {
        &self.fragments
    }
}

impl From<Vec<Fragment>> for Harvest {
    fn from(fragments: Vec<Fragment>) -> Self {
        Self::new(fragments)
    }
}

impl From<Harvest> for Vec<Fragment> {
    fn from(harvest: Harvest) -> Self {
        harvest.into_fragments()
    }
}

impl From<Fragment> for Harvest {
    fn from(fragment: Fragment) -> Self {
        Self {
            fragments: vec![fragment],
        }
    }
}

impl FromIterator<Fragment> for Harvest {
    fn from_iter<I: IntoIterator<Item = Fragment>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Harvest {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.iter()
    }
}
