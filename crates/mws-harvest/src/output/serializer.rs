//! Serialization of harvests into the MathWebSearch ingestion format
//!
//! ```text
//! <mws:harvest xmlns:mws="http://search.mathweb.org/ns" xmlns:m="http://www.w3.org/1998/Math/MathML">
//!   <mws:data mws:data_id="{fragment id}">
//!     <id>{fragment uri}</id>
//!     <text>{fragment text}</text>
//!     <metadata/>
//!     <math local_id="{formula id}">{dual mathml}</math>
//!   </mws:data>
//!   <mws:expr url="{formula id}" mws:data_id="{fragment id}">{content mathml}</mws:expr>
//! </mws:harvest>
//! ```
//!
//! MathML is embedded as raw markup, not as escaped text, which is why this
//! is written event by event rather than derived from the data types.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use crate::error::Result;
use crate::ingestion::NAMESPACE_MATHML;
use crate::types::{Fragment, Harvest};

/// MathWebSearch namespace URI
pub const NAMESPACE_MWS: &str = "http://search.mathweb.org/ns";

/// Default indentation width
pub const DEFAULT_INDENT: usize = 2;

/// Writes harvests as pretty-printed ingestion XML
#[derive(Debug, Clone, Copy)]
pub struct HarvestSerializer {
    indent: usize,
}

impl Default for HarvestSerializer {
    fn default() -> Self {
        Self::new(DEFAULT_INDENT)
    }
}

impl HarvestSerializer {
    /// Serializer indenting nested elements by `indent` spaces; 0 writes everything on one line
    pub fn new(indent: usize) -> Self {
        Self { indent }
    }

    /// Write `harvest` to `out`
    pub fn write<W: Write>(&self, harvest: &Harvest, out: W) -> Result<()> {
        if self.indent == 0 {
            write_harvest_to(&mut Writer::new(out), harvest)
        } else {
            write_harvest_to(&mut Writer::new_with_indent(out, b' ', self.indent), harvest)
        }
    }

    pub fn to_bytes(&self, harvest: &Harvest) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write(harvest, &mut buffer)?;
        Ok(buffer)
    }

    pub fn to_string(&self, harvest: &Harvest) -> Result<String> {
        let bytes = self.to_bytes(harvest)?;
        // all input to the writer is valid UTF-8
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Write `harvest` to `out` with the given indentation width
pub fn write_harvest<W: Write>(harvest: &Harvest, out: W, indent: usize) -> Result<()> {
    HarvestSerializer::new(indent).write(harvest, out)
}

fn write_harvest_to<W: Write>(writer: &mut Writer<W>, harvest: &Harvest) -> Result<()> {
    let mut root = BytesStart::new("mws:harvest");
    root.push_attribute(("xmlns:mws", NAMESPACE_MWS));
    root.push_attribute(("xmlns:m", NAMESPACE_MATHML));
    writer.write_event(Event::Start(root))?;

    for fragment in harvest {
        write_fragment(writer, fragment)?;
    }

    writer.write_event(Event::End(BytesEnd::new("mws:harvest")))?;
    Ok(())
}

fn write_fragment<W: Write>(writer: &mut Writer<W>, fragment: &Fragment) -> Result<()> {
    // <mws:data>
    let mut data = BytesStart::new("mws:data");
    data.push_attribute(("mws:data_id", fragment.id.as_str()));
    writer.write_event(Event::Start(data))?;

    write_text_element(writer, "id", &fragment.uri)?;
    write_text_element(writer, "text", &fragment.xhtml_content)?;
    writer.write_event(Event::Empty(BytesStart::new("metadata")))?;

    for formula in &fragment.formulae {
        let mut math = BytesStart::new("math");
        math.push_attribute(("local_id", formula.id.as_str()));
        write_raw_element(writer, math, &formula.dual_mathml)?;
    }

    writer.write_event(Event::End(BytesEnd::new("mws:data")))?;

    // <mws:expr>, one per formula
    for formula in &fragment.formulae {
        let mut expr = BytesStart::new("mws:expr");
        expr.push_attribute(("url", formula.id.as_str()));
        expr.push_attribute(("mws:data_id", fragment.id.as_str()));
        write_raw_element(writer, expr, &formula.content_mathml)?;
    }

    Ok(())
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Start tag, markup copied verbatim, end tag
fn write_raw_element<W: Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    raw: &str,
) -> Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::from_escaped(raw)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}
