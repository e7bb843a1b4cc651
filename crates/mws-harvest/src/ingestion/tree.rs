//! Owned XML element tree built on top of `quick-xml`
//!
//! The extractor needs to find elements by namespace, rewrite the tree in
//! place and re-serialize individual subtrees exactly as they were read, so
//! documents are materialized into a small DOM instead of being streamed.

use quick_xml::escape::{escape, partial_escape};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A node in the element tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, stored unescaped
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// An attribute as it appeared on its element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name, including any prefix
    pub name: String,
    /// Unescaped value
    pub value: String,
}

impl Attribute {
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }
}

/// Prefix to namespace URI bindings
pub type PrefixBindings = BTreeMap<String, String>;

/// An element with its resolved namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written in the source, e.g. `m:math`
    pub name: String,
    /// Namespace URI the name resolved to, if any
    pub namespace: Option<String>,
    /// Attributes in source order, namespace declarations included
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Prefixed namespace bindings in scope here, own declarations included.
    /// Shared with descendants that declare nothing new.
    pub prefixes: Arc<PrefixBindings>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
            children: Vec::new(),
            prefixes: Arc::default(),
        }
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Check both the resolved namespace and the local name
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name() == local_name
    }

    /// Value of the first attribute with the given local name
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.local_name() == local_name)
            .map(|attr| attr.value.as_str())
    }

    /// Direct child elements
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Direct child elements with the given local name
    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.child_elements()
            .filter(move |child| child.local_name() == local_name)
    }

    /// Prefix of the qualified name, if any
    pub fn prefix(&self) -> Option<&str> {
        prefix_part(&self.name)
    }

    /// Whether this element itself declares `prefix`
    pub fn declares(&self, prefix: &str) -> bool {
        self.attributes
            .iter()
            .any(|attr| attr.name.strip_prefix("xmlns:") == Some(prefix))
    }

    /// Serialize this element and its subtree as a standalone fragment.
    ///
    /// Prefixes bound on an ancestor are declared on the element so that the
    /// fragment resolves the same way outside its document. The default
    /// namespace is written only where the source declared it.
    pub fn outer_xml(&self) -> String {
        let mut out = String::new();
        write_element(self, &self.missing_declarations(), &mut out);
        out
    }

    /// Serialize the children of this element, each child element standalone
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Element(element) => {
                    write_element(element, &element.missing_declarations(), &mut out)
                }
                other => write_node(other, &mut out),
            }
        }
        out
    }

    /// Bindings for prefixes used in this subtree but declared above it
    fn missing_declarations(&self) -> Vec<(&str, &str)> {
        let mut used = BTreeSet::new();
        collect_prefixes(self, &mut used);

        used.into_iter()
            .filter(|prefix| !self.declares(prefix))
            .filter_map(|prefix| {
                self.prefixes
                    .get_key_value(prefix)
                    .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
            })
            .collect()
    }
}

fn collect_prefixes<'a>(element: &'a Element, used: &mut BTreeSet<&'a str>) {
    used.extend(element.prefix());
    used.extend(
        element
            .attributes
            .iter()
            .filter_map(|attr| prefix_part(&attr.name))
            .filter(|prefix| *prefix != "xmlns" && *prefix != "xml"),
    );
    for child in element.child_elements() {
        collect_prefixes(child, used);
    }
}

/// A parsed document: top-level nodes with exactly one root element among them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    /// Parse a complete XML document.
    ///
    /// The XML declaration and doctype are dropped; everything else is kept.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = NsReader::from_reader(bytes);
        let decoder = reader.decoder();

        let mut nodes: Vec<Node> = Vec::new();
        let mut open: Vec<Element> = Vec::new();

        loop {
            let (resolved, event) = reader.read_resolved_event()?;
            let namespace = match resolved {
                ResolveResult::Bound(ns) => {
                    Some(String::from_utf8_lossy(ns.as_ref()).into_owned())
                }
                _ => None,
            };
            let inherited = open
                .last()
                .map(|parent| Arc::clone(&parent.prefixes))
                .unwrap_or_default();

            let node = match event {
                Event::Start(start) => {
                    open.push(element_from_start(&start, namespace, inherited, decoder)?);
                    continue;
                }
                Event::Empty(start) => {
                    Node::Element(element_from_start(&start, namespace, inherited, decoder)?)
                }
                Event::End(_) => match open.pop() {
                    Some(element) => Node::Element(element),
                    None => return Err(Error::xml_parse("unexpected closing tag")),
                },
                Event::Text(text) => Node::Text(text.unescape()?.into_owned()),
                Event::CData(data) => Node::CData(decoder.decode(&data)?.into_owned()),
                Event::Comment(comment) => Node::Comment(decoder.decode(&comment)?.into_owned()),
                Event::PI(pi) => Node::ProcessingInstruction(decoder.decode(&pi)?.into_owned()),
                Event::Decl(_) | Event::DocType(_) => continue,
                Event::Eof => break,
            };

            match open.last_mut() {
                Some(parent) => parent.children.push(node),
                None => nodes.push(node),
            }
        }

        if let Some(element) = open.last() {
            return Err(Error::xml_parse(format!(
                "unexpected end of document inside <{}>",
                element.name
            )));
        }

        let roots = nodes
            .iter()
            .filter(|node| matches!(node, Node::Element(_)))
            .count();
        if roots != 1 {
            return Err(Error::xml_parse(format!(
                "expected exactly one root element, found {}",
                roots
            )));
        }

        Ok(Self { nodes })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Serialize the whole document
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            write_node(node, &mut out);
        }
        out
    }
}

fn element_from_start(
    start: &BytesStart<'_>,
    namespace: Option<String>,
    inherited: Arc<PrefixBindings>,
    decoder: Decoder,
) -> Result<Element> {
    let mut element = Element::new(decoder.decode(start.name().as_ref())?);
    element.namespace = namespace;
    for attr in start.attributes() {
        let attr = attr?;
        element.attributes.push(Attribute {
            name: decoder.decode(attr.key.as_ref())?.into_owned(),
            value: attr.decode_and_unescape_value(decoder)?.into_owned(),
        });
    }

    let declared: Vec<(String, String)> = element
        .attributes
        .iter()
        .filter_map(|attr| {
            let prefix = attr.name.strip_prefix("xmlns:")?;
            Some((prefix.to_string(), attr.value.clone()))
        })
        .collect();
    element.prefixes = if declared.is_empty() {
        inherited
    } else {
        let mut bindings = (*inherited).clone();
        bindings.extend(declared);
        Arc::new(bindings)
    };

    Ok(element)
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

fn prefix_part(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(element) => write_element(element, &[], out),
        Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
        Node::CData(data) => {
            out.push_str("<![CDATA[");
            out.push_str(data);
            out.push_str("]]>");
        }
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::ProcessingInstruction(pi) => {
            out.push_str("<?");
            out.push_str(pi);
            out.push_str("?>");
        }
    }
}

/// Write an element; `extra` prefix declarations follow its own attributes
fn write_element(element: &Element, extra: &[(&str, &str)], out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    let declarations = extra
        .iter()
        .map(|(prefix, uri)| (format!("xmlns:{}", prefix), *uri));
    let attributes = element
        .attributes
        .iter()
        .map(|attr| (attr.name.clone(), attr.value.as_str()));
    for (name, value) in attributes.chain(declarations) {
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in &element.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}
