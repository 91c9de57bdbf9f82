//! Indented XML output for whole subtrees or for one tag at a time.
//!
//! `open_tag` and `close_tag` write exactly the lines `render` would put
//! around an element's children, so a document written piecewise reads back
//! the same as one written whole.

use std::io::Write;

use quick_xml::escape::escape;

use crate::codec::DEFAULT_DECIMAL_PRECISION;
use crate::error::Result;
use crate::node::{Document, Element, NodeId};
use crate::options::RecorderOptions;
use crate::registry::ElementKind;

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Repeated once per nesting level.
    pub indent: String,
    pub decimal_precision: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: "\t".to_string(),
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
        }
    }
}

impl From<&RecorderOptions> for RenderOptions {
    fn from(options: &RecorderOptions) -> Self {
        Self {
            indent: options.indent.clone(),
            decimal_precision: options.decimal_precision,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Serializer {
    options: RenderOptions,
}

impl Serializer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// XML declaration followed by the root subtree.
    pub fn render_document<W: Write>(&self, doc: &Document, out: &mut W) -> Result<()> {
        out.write_all(XML_DECLARATION.as_bytes())?;
        self.render(doc, doc.root(), 0, out)
    }

    /// The subtree rooted at `id`, starting at nesting level `depth`.
    pub fn render<W: Write>(&self, doc: &Document, id: NodeId, depth: usize, out: &mut W) -> Result<()> {
        let element = &doc[id];
        if element.children().is_empty() {
            let content = self.content(doc, id);
            self.write_indent(depth, out)?;
            self.write_start(doc, id, out)?;
            if content.is_empty() {
                out.write_all(b"/>\n")?;
            } else {
                writeln!(out, ">{}</{}>", escape(content.as_str()), element.name())?;
            }
            return Ok(());
        }

        self.open_tag(doc, id, depth, out)?;
        for (index, child) in element.children().iter().enumerate() {
            self.write_text_runs(element, index, depth + 1, out)?;
            self.render(doc, *child, depth + 1, out)?;
        }
        self.write_text_runs(element, element.children().len(), depth + 1, out)?;
        self.close_tag(doc, id, depth, out)
    }

    /// The start-tag line of `id`, children not included.
    pub fn open_tag<W: Write>(&self, doc: &Document, id: NodeId, depth: usize, out: &mut W) -> Result<()> {
        self.write_indent(depth, out)?;
        self.write_start(doc, id, out)?;
        out.write_all(b">\n")?;
        Ok(())
    }

    pub fn close_tag<W: Write>(&self, doc: &Document, id: NodeId, depth: usize, out: &mut W) -> Result<()> {
        self.write_indent(depth, out)?;
        writeln!(out, "</{}>", doc[id].name())?;
        Ok(())
    }

    /// Text content of a childless element.
    fn content(&self, doc: &Document, id: NodeId) -> String {
        let element = &doc[id];
        match (element.kind(), element.value()) {
            (ElementKind::Leaf(_), Some(value)) => value.encode(self.options.decimal_precision),
            (ElementKind::Leaf(_) | ElementKind::Opaque, None) => element.text().to_string(),
            _ => String::new(),
        }
    }

    fn write_start<W: Write>(&self, doc: &Document, id: NodeId, out: &mut W) -> Result<()> {
        let element = &doc[id];
        write!(out, "<{}", element.name())?;
        for (key, value) in element.attributes() {
            let text = element.attribute_text(key, value, self.options.decimal_precision);
            write!(out, " {}=\"{}\"", key, escape(text.as_ref()))?;
        }
        Ok(())
    }

    /// Mixed-content text that sits before child number `position`.
    fn write_text_runs<W: Write>(
        &self,
        element: &Element,
        position: usize,
        depth: usize,
        out: &mut W,
    ) -> Result<()> {
        for (_, text) in element.text_runs().iter().filter(|(at, _)| *at == position) {
            self.write_indent(depth, out)?;
            writeln!(out, "{}", escape(text.as_str()))?;
        }
        Ok(())
    }

    fn write_indent<W: Write>(&self, depth: usize, out: &mut W) -> Result<()> {
        for _ in 0..depth {
            out.write_all(self.options.indent.as_bytes())?;
        }
        Ok(())
    }
}

impl Document {
    /// Serialize the whole document with default options.
    pub fn to_xml_string(&self) -> Result<String> {
        self.to_xml_string_with(RenderOptions::default())
    }

    pub fn to_xml_string_with(&self, options: RenderOptions) -> Result<String> {
        let mut out = Vec::new();
        Serializer::new(options).render_document(self, &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
