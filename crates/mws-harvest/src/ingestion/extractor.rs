//! Formula extraction from LaTeXML-generated XHTML
//!
//! Every `<math>` element in the MathML namespace that carries an `id` and a
//! `semantics/annotation-xml[@encoding='MathML-Content']` child becomes a
//! [`Formula`]. The element is then replaced in the tree by the text
//! `"math" + id`, and the rewritten tree is flattened into plain text.

use std::collections::HashSet;
use thiserror::Error;

use super::tree::{Document, Element, Node};
use crate::error::Result;
use crate::types::{Formula, Fragment};

/// MathML namespace URI
pub const NAMESPACE_MATHML: &str = "http://www.w3.org/1998/Math/MathML";

/// Value of the `encoding` attribute marking the content annotation
pub const CONTENT_ENCODING: &str = "MathML-Content";

/// Why a formula node was left out of a fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("missing Content MathML annotation")]
    MissingContent,
    #[error("missing formula id")]
    MissingId,
    #[error("formula id already used in this document")]
    DuplicateId,
}

/// Result of extracting a single document
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Extracted fragment; `id` and `uri` are left empty for the caller to stamp
    pub fragment: Fragment,
    /// Number of formula nodes that were skipped
    pub skipped: usize,
}

/// Extracts fragments from XHTML documents
pub struct DocumentExtractor;

impl DocumentExtractor {
    /// Parse a document and extract its formulae and text
    pub fn extract(bytes: &[u8]) -> Result<Extraction> {
        let mut document = Document::parse(bytes)?;

        let mut walk = FormulaWalk::default();
        walk.replace(&mut document.nodes);
        let FormulaWalk {
            formulae, skipped, ..
        } = walk;

        let mut text = String::new();
        render_text(&document.nodes, &mut text);

        Ok(Extraction {
            fragment: Fragment {
                xhtml_content: collapse_whitespace(&text),
                formulae,
                ..Fragment::default()
            },
            skipped,
        })
    }

    /// Read a single formula node without modifying it
    pub fn read_formula(math: &Element) -> std::result::Result<Formula, SkipReason> {
        let annotation = math
            .children_named("semantics")
            .flat_map(|semantics| semantics.children_named("annotation-xml"))
            .find(|annotation| annotation.attribute("encoding") == Some(CONTENT_ENCODING))
            .ok_or(SkipReason::MissingContent)?;

        let id = match math.attribute("id") {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(SkipReason::MissingId),
        };

        Ok(Formula {
            id,
            dual_mathml: math.outer_xml(),
            content_mathml: collapse_whitespace(&annotation.inner_xml()),
        })
    }
}

/// Collapse runs of whitespace into single spaces and trim both ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// State of the pre-order walk replacing formula nodes with placeholders
#[derive(Default)]
struct FormulaWalk {
    formulae: Vec<Formula>,
    seen: HashSet<String>,
    skipped: usize,
}

impl FormulaWalk {
    /// Replace every readable formula node with its placeholder.
    /// Formula nodes are never descended into; a repeated id is skipped so
    /// each placeholder stays unique within the document.
    fn replace(&mut self, nodes: &mut [Node]) {
        for node in nodes.iter_mut() {
            let Node::Element(element) = node else {
                continue;
            };

            if !element.is(NAMESPACE_MATHML, "math") {
                self.replace(&mut element.children);
                continue;
            }

            let result = DocumentExtractor::read_formula(element).and_then(|formula| {
                if self.seen.contains(&formula.id) {
                    Err(SkipReason::DuplicateId)
                } else {
                    Ok(formula)
                }
            });

            match result {
                Ok(formula) => {
                    *node = Node::Text(Fragment::placeholder(&formula.id));
                    self.seen.insert(formula.id.clone());
                    self.formulae.push(formula);
                }
                Err(reason) => {
                    tracing::warn!(
                        "Skipping formula {}: {}",
                        element.attribute("id").unwrap_or("<no id>"),
                        reason
                    );
                    self.skipped += 1;
                }
            }
        }
    }
}

/// Flatten nodes to text; every element contributes a separator before its content
fn render_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(element) => {
                out.push(' ');
                render_text(&element.children, out);
            }
            Node::Text(text) | Node::CData(text) => out.push_str(text),
            Node::Comment(_) | Node::ProcessingInstruction(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"<html><body>See <math xmlns="http://www.w3.org/1998/Math/MathML" id="f1"><mi>x</mi><semantics><annotation-xml encoding="MathML-Content"><ci>x</ci></annotation-xml></semantics></math> below.</body></html>"#;

    #[test]
    fn test_extract_single_formula() {
        let extraction = DocumentExtractor::extract(SCENARIO.as_bytes()).unwrap();
        let fragment = extraction.fragment;

        assert!(fragment.xhtml_content.contains("See mathf1 below."));
        assert_eq!(fragment.formulae.len(), 1);
        assert_eq!(extraction.skipped, 0);

        let formula = &fragment.formulae[0];
        assert_eq!(formula.id, "f1");
        assert_eq!(formula.content_mathml, "<ci>x</ci>");
        assert_eq!(
            formula.dual_mathml,
            r#"<math xmlns="http://www.w3.org/1998/Math/MathML" id="f1"><mi>x</mi><semantics><annotation-xml encoding="MathML-Content"><ci>x</ci></annotation-xml></semantics></math>"#
        );
    }

    #[test]
    fn test_missing_annotation_is_skipped() {
        let source = r#"<html><body>Let <math xmlns="http://www.w3.org/1998/Math/MathML" id="f1"><mi>y</mi></math> hold.</body></html>"#;
        let extraction = DocumentExtractor::extract(source.as_bytes()).unwrap();

        assert!(extraction.fragment.formulae.is_empty());
        assert_eq!(extraction.skipped, 1);
        // node stays in the tree, so its text is rendered instead of a placeholder
        assert!(!extraction.fragment.xhtml_content.contains("mathf1"));
        assert!(extraction.fragment.xhtml_content.contains("y"));
    }

    #[test]
    fn test_missing_or_empty_id_is_skipped() {
        let source = r#"<html><body>
            <math xmlns="http://www.w3.org/1998/Math/MathML"><semantics><annotation-xml encoding="MathML-Content"><ci>a</ci></annotation-xml></semantics></math>
            <math xmlns="http://www.w3.org/1998/Math/MathML" id=""><semantics><annotation-xml encoding="MathML-Content"><ci>b</ci></annotation-xml></semantics></math>
            <math xmlns="http://www.w3.org/1998/Math/MathML" id="ok"><semantics><annotation-xml encoding="MathML-Content"><ci>c</ci></annotation-xml></semantics></math>
        </body></html>"#;
        let extraction = DocumentExtractor::extract(source.as_bytes()).unwrap();

        assert_eq!(extraction.skipped, 2);
        assert_eq!(extraction.fragment.formulae.len(), 1);
        assert_eq!(extraction.fragment.formulae[0].id, "ok");
        assert!(extraction.fragment.xhtml_content.ends_with("mathok"));
    }

    #[test]
    fn test_wrong_encoding_is_skipped() {
        let source = r#"<p><math xmlns="http://www.w3.org/1998/Math/MathML" id="f2"><semantics><mi>z</mi><annotation-xml encoding="MathML-Presentation"><mi>z</mi></annotation-xml></semantics></math></p>"#;
        let extraction = DocumentExtractor::extract(source.as_bytes()).unwrap();

        assert!(extraction.fragment.formulae.is_empty());
        assert_eq!(extraction.skipped, 1);
    }

    #[test]
    fn test_formulae_in_document_order() {
        let source = r#"<html xmlns:m="http://www.w3.org/1998/Math/MathML"><body>
            <p>first <m:math id="a"><m:semantics><m:mi>a</m:mi><m:annotation-xml encoding="MathML-Content"><m:ci>a</m:ci></m:annotation-xml></m:semantics></m:math></p>
            <div><p>second <m:math id="b"><m:semantics><m:mi>b</m:mi><m:annotation-xml encoding="MathML-Content"><m:ci>b</m:ci></m:annotation-xml></m:semantics></m:math></p></div>
            <p>third <m:math id="c"><m:semantics><m:mi>c</m:mi><m:annotation-xml encoding="MathML-Content"><m:ci>c</m:ci></m:annotation-xml></m:semantics></m:math></p>
        </body></html>"#;
        let fragment = DocumentExtractor::extract(source.as_bytes()).unwrap().fragment;

        let ids: Vec<_> = fragment.formulae.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(fragment.xhtml_content, "first matha second mathb third mathc");
        assert_eq!(
            fragment.formulae[1].content_mathml,
            r#"<m:ci xmlns:m="http://www.w3.org/1998/Math/MathML">b</m:ci>"#
        );
    }

    #[test]
    fn test_duplicate_id_is_skipped() {
        let formula = r#"<math xmlns="http://www.w3.org/1998/Math/MathML" id="f1"><semantics><mi>x</mi><annotation-xml encoding="MathML-Content"><ci>x</ci></annotation-xml></semantics></math>"#;
        let source = format!("<html><body>a {formula} b {formula} c</body></html>");
        let extraction = DocumentExtractor::extract(source.as_bytes()).unwrap();
        let fragment = extraction.fragment;

        let ids: Vec<_> = fragment.formulae.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f1"]);
        assert_eq!(extraction.skipped, 1);
        // the second node stays in place and renders as text
        assert_eq!(fragment.xhtml_content, "a mathf1 b x x c");
        assert_eq!(fragment.xhtml_content.matches("mathf1").count(), 1);
    }

    #[test]
    fn test_prefix_declared_on_ancestor() {
        let source = r#"<html xmlns:mml="http://www.w3.org/1998/Math/MathML"><body>see <mml:math id="f1"><mml:semantics><mml:mi>x</mml:mi><mml:annotation-xml encoding="MathML-Content"><mml:ci>x</mml:ci></mml:annotation-xml></mml:semantics></mml:math></body></html>"#;
        let fragment = DocumentExtractor::extract(source.as_bytes()).unwrap().fragment;
        let formula = &fragment.formulae[0];

        assert_eq!(fragment.xhtml_content, "see mathf1");

        let dual = Document::parse(formula.dual_mathml.as_bytes()).unwrap();
        assert!(dual.root().unwrap().is(NAMESPACE_MATHML, "math"));

        let wrapped = format!("<expr>{}</expr>", formula.content_mathml);
        let content = Document::parse(wrapped.as_bytes()).unwrap();
        let ci = content.root().unwrap().child_elements().next().unwrap();
        assert!(ci.is(NAMESPACE_MATHML, "ci"));
    }

    #[test]
    fn test_placeholder_appears_once() {
        let fragment = DocumentExtractor::extract(SCENARIO.as_bytes()).unwrap().fragment;

        for formula in &fragment.formulae {
            let token = Fragment::placeholder(&formula.id);
            assert_eq!(fragment.xhtml_content.matches(token.as_str()).count(), 1);
        }
    }

    #[test]
    fn test_math_outside_namespace_ignored() {
        let source = r#"<html><body><math id="f1"><semantics><annotation-xml encoding="MathML-Content"><ci>x</ci></annotation-xml></semantics></math></body></html>"#;
        let extraction = DocumentExtractor::extract(source.as_bytes()).unwrap();

        assert!(extraction.fragment.formulae.is_empty());
        assert_eq!(extraction.skipped, 0);
    }

    #[test]
    fn test_content_mathml_whitespace_collapsed() {
        let source = r#"<p><math xmlns="http://www.w3.org/1998/Math/MathML" id="e1">
            <semantics>
                <mrow><mi>x</mi><mo>+</mo><mn>1</mn></mrow>
                <annotation-xml encoding="MathML-Content">
                    <apply>
                        <plus/>
                        <ci>x</ci>
                        <cn>1</cn>
                    </apply>
                </annotation-xml>
            </semantics>
        </math></p>"#;
        let fragment = DocumentExtractor::extract(source.as_bytes()).unwrap().fragment;

        assert_eq!(
            fragment.formulae[0].content_mathml,
            "<apply> <plus/> <ci>x</ci> <cn>1</cn> </apply>"
        );
        // the dual form is kept verbatim
        assert!(fragment.formulae[0].dual_mathml.contains("\n"));
    }

    #[test]
    fn test_extraction_idempotent_without_formulae() {
        let first = DocumentExtractor::extract(SCENARIO.as_bytes()).unwrap().fragment;

        let rewritten = format!("<html><body>{}</body></html>", first.xhtml_content);
        let second = DocumentExtractor::extract(rewritten.as_bytes()).unwrap().fragment;

        assert!(second.formulae.is_empty());
        assert_eq!(second.xhtml_content, first.xhtml_content);
    }

    #[test]
    fn test_escaped_text_is_unescaped() {
        let fragment = DocumentExtractor::extract(b"<p>a &lt; b &amp;&#32;c</p>")
            .unwrap()
            .fragment;

        assert_eq!(fragment.xhtml_content, "a < b & c");
    }

    #[test]
    fn test_parse_failure() {
        assert!(DocumentExtractor::extract(b"<html><body></html>").is_err());
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(collapse_whitespace(""), "");
    }
}
