//! Append-only document output.
//!
//! A [`StreamWriter`] keeps the stack of elements whose start tag has been
//! written but whose end tag has not. Children appended under the innermost
//! open element are rendered whole, so earlier output is never revisited.

use std::io::Write;

use crate::error::{GpxError, Result};
use crate::node::{Document, NodeId};
use crate::serializer::{RenderOptions, Serializer, XML_DECLARATION};

#[derive(Debug)]
pub struct StreamWriter<W: Write> {
    out: W,
    serializer: Serializer,
    open: Vec<NodeId>,
    scratch: Vec<u8>,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(out: W, options: RenderOptions) -> Self {
        Self {
            out,
            serializer: Serializer::new(options),
            open: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn write_declaration(&mut self) -> Result<()> {
        if !self.open.is_empty() {
            return Err(GpxError::Stream("declaration after the root start tag"));
        }
        self.out.write_all(XML_DECLARATION.as_bytes())?;
        Ok(())
    }

    /// Write the start tag of `id` and make it the innermost open element.
    pub fn open_tag(&mut self, doc: &Document, id: NodeId) -> Result<()> {
        self.check_parent(doc, id)?;
        self.scratch.clear();
        self.serializer
            .open_tag(doc, id, self.open.len(), &mut self.scratch)?;
        self.out.write_all(&self.scratch)?;
        self.open.push(id);
        Ok(())
    }

    /// Write the complete subtree of `id` under the innermost open element.
    pub fn write_child(&mut self, doc: &Document, id: NodeId) -> Result<()> {
        if self.open.is_empty() {
            return Err(GpxError::Stream("no open element to append to"));
        }
        self.check_parent(doc, id)?;
        self.scratch.clear();
        self.serializer
            .render(doc, id, self.open.len(), &mut self.scratch)?;
        self.out.write_all(&self.scratch)?;
        Ok(())
    }

    /// Write the end tag of the innermost open element and return it.
    pub fn close_tag(&mut self, doc: &Document) -> Result<NodeId> {
        let Some(id) = self.open.last().copied() else {
            return Err(GpxError::Stream("no open element to close"));
        };
        self.scratch.clear();
        self.serializer
            .close_tag(doc, id, self.open.len() - 1, &mut self.scratch)?;
        self.out.write_all(&self.scratch)?;
        self.open.pop();
        Ok(id)
    }

    pub fn close_all(&mut self, doc: &Document) -> Result<()> {
        while !self.open.is_empty() {
            self.close_tag(doc)?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Open elements, outermost first.
    pub fn open_elements(&self) -> &[NodeId] {
        &self.open
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn check_parent(&self, doc: &Document, id: NodeId) -> Result<()> {
        match self.open.last() {
            Some(top) if doc[id].parent() != Some(*top) => Err(GpxError::Stream(
                "element is not a child of the innermost open element",
            )),
            _ => Ok(()),
        }
    }
}
