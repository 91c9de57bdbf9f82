//! Event-driven tree construction.
//!
//! [`TreeBuilder`] consumes start/characters/end events and grows a
//! [`Document`], picking each element's kind through the registry from the
//! kind of the element it appears in. [`parse_reader`] feeds it from
//! quick-xml.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::codec::decode;
use crate::error::{GpxError, Result};
use crate::node::{Document, NodeId};
use crate::registry::{ElementKind, class_for};

/// Stack of in-progress elements over a growing document.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    document: Option<Document>,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_element(&mut self, name: &str, attributes: Vec<(String, String)>) -> Result<()> {
        let Some(parent) = self.stack.last().copied() else {
            if self.document.is_some() {
                return Err(GpxError::MultipleRoots(name.to_string()));
            }
            let mut doc = Document::new(name);
            let root = doc.root();
            doc.get_mut(root).attributes = attributes;
            self.stack.push(root);
            self.document = Some(doc);
            return Ok(());
        };
        let Some(doc) = self.document.as_mut() else {
            return Err(GpxError::MissingRoot);
        };

        if doc[parent].is_leaf_text() {
            tracing::debug!(
                element = doc[parent].name(),
                child = name,
                "text element has child elements, keeping it opaque"
            );
            doc.get_mut(parent).kind = ElementKind::Opaque;
        }

        let kind = class_for(name, doc[parent].kind());
        let id = doc.create_element(name, kind);
        doc.get_mut(id).attributes = attributes;
        let position = doc[parent].children().len();
        doc.attach(parent, id, position);
        self.stack.push(id);
        Ok(())
    }

    /// Append character data to the innermost open element. Successive calls
    /// before the end tag concatenate.
    pub fn characters(&mut self, text: &str) {
        let (Some(doc), Some(top)) = (self.document.as_mut(), self.stack.last()) else {
            return;
        };
        let element = doc.get_mut(*top);
        match element.kind {
            ElementKind::Leaf(_) => element.text.push_str(text),
            ElementKind::Opaque if element.children.is_empty() => element.text.push_str(text),
            ElementKind::Opaque => {
                let position = element.children.len();
                match element.text_runs.last_mut() {
                    Some((at, run)) if *at == position => run.push_str(text),
                    _ => element.text_runs.push((position, text.to_string())),
                }
            }
            _ => {}
        }
    }

    pub fn end_element(&mut self, name: &str) -> Result<()> {
        let (Some(doc), Some(id)) = (self.document.as_mut(), self.stack.pop()) else {
            return Err(GpxError::UnmatchedEndTag(name.to_string()));
        };
        if doc[id].name() != name {
            return Err(GpxError::MismatchedEndTag {
                expected: doc[id].name().to_string(),
                found: name.to_string(),
            });
        }
        finalize(doc, id);
        Ok(())
    }

    /// Depth of currently open elements.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn finish(self) -> Result<Document> {
        if let (Some(doc), Some(innermost)) = (&self.document, self.stack.last()) {
            return Err(GpxError::Truncated {
                open: self.stack.len(),
                innermost: doc[*innermost].name().to_string(),
            });
        }
        self.document.ok_or(GpxError::MissingRoot)
    }
}

fn finalize(doc: &mut Document, id: NodeId) {
    let element = doc.get_mut(id);
    match element.kind {
        ElementKind::Leaf(kind) => match decode(kind, &element.text) {
            Ok(value) => {
                element.value = Some(value);
                element.text = String::new();
            }
            Err(e) => {
                tracing::warn!(element = %element.name, error = %e, "leaf value left absent");
            }
        },
        ElementKind::Opaque if element.children.is_empty() => {
            if element.text.trim().is_empty() {
                element.text = String::new();
            }
        }
        ElementKind::Opaque => {
            // Mixed content: leading text becomes the run before the first child.
            let leading = std::mem::take(&mut element.text);
            let runs = std::mem::take(&mut element.text_runs);
            element.text_runs = std::iter::once((0, leading))
                .chain(runs)
                .map(|(at, text)| (at, text.trim().to_string()))
                .filter(|(_, text)| !text.is_empty())
                .collect();
        }
        _ => {}
    }
}

/// Parse a complete document from a string.
pub fn parse_str(xml: &str) -> Result<Document> {
    parse_reader(xml.as_bytes())
}

/// Parse a complete document from UTF-8 bytes.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document> {
    parse_reader(bytes)
}

/// Parse a complete document from a buffered byte stream.
pub fn parse_reader<R: BufRead>(source: R) -> Result<Document> {
    let mut reader = Reader::from_reader(source);
    let mut builder = TreeBuilder::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => builder.start_element(element_name(&e)?, read_attributes(&e)?)?,
            Event::Empty(e) => {
                let name = element_name(&e)?;
                builder.start_element(name, read_attributes(&e)?)?;
                builder.end_element(name)?;
            }
            Event::End(e) => {
                let name = e.name();
                builder.end_element(std::str::from_utf8(name.as_ref())?)?;
            }
            Event::Text(e) => builder.characters(std::str::from_utf8(e.as_ref())?),
            Event::CData(e) => builder.characters(std::str::from_utf8(e.as_ref())?),
            Event::GeneralRef(e) => {
                // Character references (&#60; &#x3C;) and the predefined entities
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    builder.characters(ch.encode_utf8(&mut [0; 4]));
                } else {
                    let entity = match std::str::from_utf8(e.as_ref())? {
                        "amp" => "&",
                        "lt" => "<",
                        "gt" => ">",
                        "quot" => "\"",
                        "apos" => "'",
                        _ => "",
                    };
                    builder.characters(entity);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let document = builder.finish()?;
    tracing::debug!(elements = document.len(), "parsed document");
    Ok(document)
}

fn element_name<'a>(start: &'a BytesStart<'_>) -> Result<&'a str> {
    Ok(std::str::from_utf8(start.name().0)?)
}

fn read_attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr_result in start.attributes() {
        let attr = attr_result.map_err(|e| GpxError::XmlParse(e.into()))?;
        let key = std::str::from_utf8(attr.key.0)?;
        let raw = std::str::from_utf8(&attr.value)?;
        let value = quick_xml::escape::unescape(raw).map_err(|_| GpxError::InvalidAttribute {
            element: String::from_utf8_lossy(start.name().0).into_owned(),
            attribute: key.to_string(),
            value: raw.to_string(),
        })?;
        attributes.push((key.to_string(), value.into_owned()));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LeafKind, LeafValue};

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_events_build_typed_tree() {
        let mut b = TreeBuilder::new();
        b.start_element("gpx", attrs(&[("version", "1.1")])).unwrap();
        b.start_element("trk", vec![]).unwrap();
        b.start_element("trkseg", vec![]).unwrap();
        b.start_element("trkpt", attrs(&[("lat", "1.5"), ("lon", "2.5")]))
            .unwrap();
        b.start_element("ele", vec![]).unwrap();
        b.characters("12");
        b.characters(".");
        b.characters("5");
        b.end_element("ele").unwrap();
        b.end_element("trkpt").unwrap();
        b.end_element("trkseg").unwrap();
        b.end_element("trk").unwrap();
        b.end_element("gpx").unwrap();
        let doc = b.finish().unwrap();

        let root = doc.root();
        assert_eq!(doc[root].kind(), ElementKind::Gpx);
        assert_eq!(doc[root].attribute("version"), Some("1.1"));
        let trk = doc[root].children()[0];
        let seg = doc[trk].children()[0];
        let pt = doc[seg].children()[0];
        assert_eq!(doc[seg].kind(), ElementKind::TrackSegment);
        assert_eq!(doc[pt].kind(), ElementKind::Waypoint);
        assert_eq!(doc[pt].parent(), Some(seg));
        let ele = doc[pt].children()[0];
        assert_eq!(doc[ele].value(), Some(&LeafValue::Decimal(12.5)));
    }

    #[test]
    fn test_mismatched_end_is_fatal() {
        let mut b = TreeBuilder::new();
        b.start_element("gpx", vec![]).unwrap();
        b.start_element("trk", vec![]).unwrap();
        let err = b.end_element("gpx").unwrap_err();
        assert!(matches!(
            err,
            GpxError::MismatchedEndTag { ref expected, ref found } if expected == "trk" && found == "gpx"
        ));
    }

    #[test]
    fn test_end_with_empty_stack_is_fatal() {
        let mut b = TreeBuilder::new();
        assert!(matches!(
            b.end_element("gpx"),
            Err(GpxError::UnmatchedEndTag(_))
        ));

        b.start_element("gpx", vec![]).unwrap();
        b.end_element("gpx").unwrap();
        assert!(matches!(
            b.end_element("gpx"),
            Err(GpxError::UnmatchedEndTag(_))
        ));
    }

    #[test]
    fn test_second_root_is_fatal() {
        let mut b = TreeBuilder::new();
        b.start_element("gpx", vec![]).unwrap();
        b.end_element("gpx").unwrap();
        assert!(matches!(
            b.start_element("gpx", vec![]),
            Err(GpxError::MultipleRoots(_))
        ));
    }

    #[test]
    fn test_unclosed_elements_are_truncation() {
        let mut b = TreeBuilder::new();
        b.start_element("gpx", vec![]).unwrap();
        b.start_element("trk", vec![]).unwrap();
        assert_eq!(b.depth(), 2);
        let err = b.finish().unwrap_err();
        assert!(matches!(err, GpxError::Truncated { open: 2, ref innermost } if innermost == "trk"));

        assert!(matches!(TreeBuilder::new().finish(), Err(GpxError::MissingRoot)));
    }

    #[test]
    fn test_leaf_with_child_becomes_opaque() {
        let mut b = TreeBuilder::new();
        b.start_element("gpx", vec![]).unwrap();
        b.start_element("time", vec![]).unwrap();
        b.start_element("b", vec![]).unwrap();
        b.characters("x");
        b.end_element("b").unwrap();
        b.end_element("time").unwrap();
        b.end_element("gpx").unwrap();
        let doc = b.finish().unwrap();

        let time = doc[doc.root()].children()[0];
        assert_eq!(doc[time].kind(), ElementKind::Opaque);
        assert_eq!(doc[time].children().len(), 1);
    }

    #[test]
    fn test_parse_str_entities_and_cdata() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="A &amp; B">
  <metadata>
    <name><![CDATA[Test & Name]]></name>
    <desc>Caf&#233; &lt;3</desc>
  </metadata>
</gpx>"#;
        let doc = parse_str(xml).unwrap();
        let root = doc.root();
        assert_eq!(doc[root].attribute("creator"), Some("A & B"));
        let metadata = doc[root].children()[0];
        let name = doc[metadata].children()[0];
        let desc = doc[metadata].children()[1];
        assert_eq!(
            doc[name].value().and_then(LeafValue::as_str),
            Some("Test & Name")
        );
        assert_eq!(doc[desc].value().and_then(LeafValue::as_str), Some("Café <3"));
    }

    #[test]
    fn test_malformed_leaf_is_absent_not_fatal() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1.0" lon="2.0"><ele>high</ele></trkpt></trkseg></trk></gpx>"#;
        let doc = parse_str(xml).unwrap();
        let invalid: Vec<_> = doc.invalid_leaves().collect();
        assert_eq!(invalid.len(), 1);
        let ele = invalid[0];
        assert_eq!(doc[ele].kind(), ElementKind::Leaf(LeafKind::Decimal));
        assert!(doc[ele].value().is_none());
        assert_eq!(doc[ele].text(), "high");
    }

    #[test]
    fn test_unknown_element_is_opaque() {
        let xml = r#"<gpx><trk><trkseg><foo bar="1"/></trkseg></trk></gpx>"#;
        let doc = parse_str(xml).unwrap();
        let foo = doc
            .descendants(doc.root())
            .find(|id| doc[*id].name() == "foo")
            .unwrap();
        assert_eq!(doc[foo].kind(), ElementKind::Opaque);
        assert_eq!(doc[foo].attribute("bar"), Some("1"));
    }

    #[test]
    fn test_mixed_content_keeps_text_runs() {
        let xml = "<gpx><extensions><note>hello <b>bold</b> world<i/>!</note></extensions></gpx>";
        let doc = parse_str(xml).unwrap();
        let note = doc
            .descendants(doc.root())
            .find(|id| doc[*id].name() == "note")
            .unwrap();
        assert_eq!(doc[note].kind(), ElementKind::Opaque);
        assert_eq!(doc[note].children().len(), 2);
        assert!(doc[note].text().is_empty());
        assert_eq!(
            doc[note].text_runs(),
            &[
                (0, "hello".to_string()),
                (1, "world".to_string()),
                (2, "!".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_errors_surface() {
        assert!(parse_str("<gpx><trk></gpx>").is_err());
        assert!(parse_str("<gpx><trk>").is_err());
        assert!(parse_str("").is_err());
    }

    #[test]
    fn test_whitespace_between_composites_is_dropped() {
        let doc = parse_str("<gpx>\n  <trk>\n  </trk>\n</gpx>").unwrap();
        let root = doc.root();
        assert!(doc[root].text().is_empty());
        assert_eq!(doc[root].children().len(), 1);
    }
}
